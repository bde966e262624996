//! Decodificação dos valores brutos do SMC.
//!
//! Cada chave do SMC devolve até 32 bytes acompanhados de um tipo FourCC
//! (`flt `, `sp78`, `ioft`…). As funções aqui são puras e totais: qualquer
//! combinação não reconhecida de tipo/tamanho vira `0.0`, nunca um erro.

use std::fmt;

/// Tamanho máximo do buffer de dados de uma chave SMC.
pub const MAX_KEY_BYTES: usize = 32;

// ──────────────────────────────────────────────
// SensorKey
// ──────────────────────────────────────────────

/// Identificador de 4 caracteres de um sensor (ex: `Tp01`, `F0Ac`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorKey([u8; 4]);

impl SensorKey {
    /// Cria a chave a partir de 4 bytes ASCII.
    pub const fn new(code: [u8; 4]) -> Self {
        Self(code)
    }

    /// Chave da ventoinha `slot` com o sufixo dado (`Ac`, `Mn`, `Mx`).
    ///
    /// Slots acima de 9 não existem no SMC; o dígito é truncado.
    pub fn fan(slot: usize, suffix: &[u8; 2]) -> Self {
        let digit = b'0' + (slot % 10) as u8;
        Self([b'F', digit, suffix[0], suffix[1]])
    }

    /// Representação big-endian usada pelo protocolo do SMC.
    pub const fn fourcc(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub const fn bytes(self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// DataType
// ──────────────────────────────────────────────

/// Codificação numérica reportada pelo SMC para uma chave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// `flt ` – IEEE-754 32 bits
    Float32,
    /// `sp78` – ponto fixo com sinal 7.8
    Fixed7p8,
    /// `ioft` – IEEE-754 64 bits
    Double64,
    /// `ui8 `
    UInt8,
    /// `ui16`
    UInt16,
    /// Qualquer outro FourCC (decodificado apenas pelo tamanho)
    Other(u32),
}

const FOURCC_FLT: u32 = 0x666c_7420;
const FOURCC_SP78: u32 = 0x7370_3738;
const FOURCC_IOFT: u32 = 0x696f_6674;
const FOURCC_UI8: u32 = 0x7569_3820;
const FOURCC_UI16: u32 = 0x7569_3136;

impl DataType {
    pub fn from_fourcc(code: u32) -> Self {
        match code {
            FOURCC_FLT => Self::Float32,
            FOURCC_SP78 => Self::Fixed7p8,
            FOURCC_IOFT => Self::Double64,
            FOURCC_UI8 => Self::UInt8,
            FOURCC_UI16 => Self::UInt16,
            other => Self::Other(other),
        }
    }

    pub fn fourcc(self) -> u32 {
        match self {
            Self::Float32 => FOURCC_FLT,
            Self::Fixed7p8 => FOURCC_SP78,
            Self::Double64 => FOURCC_IOFT,
            Self::UInt8 => FOURCC_UI8,
            Self::UInt16 => FOURCC_UI16,
            Self::Other(code) => code,
        }
    }
}

// ──────────────────────────────────────────────
// Metadados e amostras
// ──────────────────────────────────────────────

/// Metadados de uma chave (resposta do comando "key info").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo {
    pub data_size: u32,
    pub data_type: DataType,
    pub attributes: u8,
}

/// Buffer bruto de uma leitura. Consumido imediatamente pelo [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub bytes: [u8; MAX_KEY_BYTES],
}

impl RawSample {
    /// Copia até 32 bytes de `data` para um buffer zerado.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut bytes = [0u8; MAX_KEY_BYTES];
        let n = data.len().min(MAX_KEY_BYTES);
        bytes[..n].copy_from_slice(&data[..n]);
        Self { bytes }
    }
}

// ──────────────────────────────────────────────
// Decoder
// ──────────────────────────────────────────────

/// Converte os bytes de uma chave em valor físico.
///
/// `length` é o tamanho declarado nos metadados, limitado ao tamanho de `bytes`.
pub fn decode(bytes: &[u8], length: usize, tag: DataType) -> f32 {
    let length = length.min(bytes.len());
    if length == 0 {
        return 0.0;
    }

    match tag {
        DataType::Float32 if length >= 4 => {
            return f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        DataType::Fixed7p8 if length >= 2 => {
            return i16::from_be_bytes([bytes[0], bytes[1]]) as f32 / 256.0;
        }
        DataType::Double64 if length >= 8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            return f64::from_ne_bytes(raw) as f32;
        }
        _ => {}
    }

    match length {
        1 => bytes[0] as f32,
        2 => u16::from_be_bytes([bytes[0], bytes[1]]) as f32,
        _ => 0.0,
    }
}

/// Atalho para decodificar uma [`RawSample`] com seus metadados.
pub fn decode_sample(sample: &RawSample, info: &KeyInfo) -> f32 {
    decode(&sample.bytes, info.data_size as usize, info.data_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_zero() {
        for tag in [
            DataType::Float32,
            DataType::Fixed7p8,
            DataType::Double64,
            DataType::UInt8,
            DataType::Other(0),
        ] {
            assert_eq!(decode(&[], 0, tag), 0.0);
            assert_eq!(decode(&[0x42, 0x10, 0, 0], 0, tag), 0.0);
        }
    }

    #[test]
    fn float32_native_bytes() {
        let bytes = 98.6_f32.to_ne_bytes();
        let v = decode(&bytes, 4, DataType::Float32);
        assert!((v - 98.6).abs() < 1e-4);
    }

    #[test]
    fn fixed_7p8_big_endian() {
        assert_eq!(decode(&[0x19, 0x00], 2, DataType::Fixed7p8), 25.0);
        // Complemento de dois: 0xFF80 = -128 → -0.5
        assert_eq!(decode(&[0xFF, 0x80], 2, DataType::Fixed7p8), -0.5);
    }

    #[test]
    fn double64_narrows() {
        let bytes = 41.25_f64.to_ne_bytes();
        assert_eq!(decode(&bytes, 8, DataType::Double64), 41.25);
    }

    #[test]
    fn size_based_fallbacks() {
        assert_eq!(decode(&[200], 1, DataType::Other(0)), 200.0);
        assert_eq!(decode(&[0x0A, 0x8C], 2, DataType::UInt16), 2700.0);
        // `flt ` com tamanho 1 cai no caminho ui8
        assert_eq!(decode(&[7], 1, DataType::Float32), 7.0);
        assert_eq!(decode(&[1, 2, 3], 3, DataType::Other(0)), 0.0);
    }

    #[test]
    fn declared_length_is_clamped_to_buffer() {
        // Só 1 byte disponível: sp78 não se aplica, vira ui8 (0x19 = 25)
        assert_eq!(decode(&[0x19], 2, DataType::Fixed7p8), 25.0);
    }

    #[test]
    fn fourcc_roundtrip() {
        let key = SensorKey::new(*b"Tp01");
        assert_eq!(key.fourcc(), 0x5470_3031);
        assert_eq!(key.to_string(), "Tp01");
        assert_eq!(DataType::from_fourcc(0x7370_3738), DataType::Fixed7p8);
        assert_eq!(SensorKey::fan(1, b"Ac").to_string(), "F1Ac");
    }
}
