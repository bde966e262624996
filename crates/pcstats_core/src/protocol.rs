//! Protocolo do display: JSON compacto em frame com prefixo de tamanho.
//!
//! ```text
//! ┌──────────────┬─────────────────┬──────────────┐
//! │ Magic "pcs"  │ Tamanho (u16 BE)│ JSON (N)     │
//! └──────────────┴─────────────────┴──────────────┘
//! ```
//!
//! O JSON é montado à mão para manter a ordem dos campos e uma casa decimal
//! em todos os floats, como o firmware do display espera.

use crate::types::StatsSnapshot;
use std::fmt::Write as _;

/// Prefixo de todo frame.
pub const MAGIC: [u8; 3] = *b"pcs";

/// Magic + tamanho.
pub const HEADER_SIZE: usize = 5;

/// Maior payload representável no campo de tamanho.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Payload de {0} bytes não cabe no campo de tamanho (máximo {MAX_PAYLOAD})")]
    PayloadTooLarge(usize),

    #[error("Frame muito curto ({0} bytes, mínimo {HEADER_SIZE})")]
    TooShort(usize),

    #[error("Magic inválido: {0:02X?} (esperado \"pcs\")")]
    InvalidMagic([u8; 3]),

    #[error("Frame truncado: header declara {expected} bytes, recebidos {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Payload não é UTF-8 válido")]
    Utf8,

    #[error("Erro de deserialização: {0}")]
    Json(String),
}

/// Float com uma casa decimal; não finitos viram `0.0` para manter o JSON válido.
struct Fixed1(f32);

impl std::fmt::Display for Fixed1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = if self.0.is_finite() { self.0 } else { 0.0 };
        write!(f, "{v:.1}")
    }
}

/// Renderiza o snapshot no JSON do dispositivo.
pub fn render_payload(s: &StatsSnapshot) -> String {
    let mut out = String::with_capacity(512);
    // Escrever em String não falha.
    let _ = write!(
        out,
        concat!(
            "{{",
            "\"board\":{{\"temp\":{},\"rpm\":{},\"tick\":{}}},",
            "\"cpu\":{{\"temp\":{},\"tempMax\":{},\"load\":{},\"consume\":{},",
            "\"tjMax\":{},\"core1DistanceToTjMax\":{},\"core1Temp\":{}}},",
            "\"gpu\":{{\"temp\":{},\"tempMax\":{},\"load\":{},\"consume\":{},",
            "\"rpm\":{},\"memUsed\":{},\"memTotal\":{},\"freq\":{}}},",
            "\"storage\":{{\"temp\":{},\"read\":{},\"write\":{},\"percent\":{}}},",
            "\"memory\":{{\"used\":{},\"avail\":{},\"percent\":{}}},",
            "\"network\":{{\"up\":{},\"down\":{}}},",
            "\"cmd\":{},",
            "\"time\":{}",
            "}}"
        ),
        Fixed1(s.board.temp),
        Fixed1(s.board.rpm),
        s.board.tick,
        Fixed1(s.cpu.temp),
        Fixed1(s.cpu.temp_max),
        Fixed1(s.cpu.load),
        Fixed1(s.cpu.consume),
        s.cpu.tj_max,
        Fixed1(s.cpu.core1_distance_to_tj_max),
        Fixed1(s.cpu.core1_temp),
        Fixed1(s.gpu.temp),
        Fixed1(s.gpu.temp_max),
        Fixed1(s.gpu.load),
        Fixed1(s.gpu.consume),
        Fixed1(s.gpu.rpm),
        Fixed1(s.gpu.mem_used),
        Fixed1(s.gpu.mem_total),
        Fixed1(s.gpu.freq),
        Fixed1(s.storage.temp),
        Fixed1(s.storage.read),
        Fixed1(s.storage.write),
        Fixed1(s.storage.percent),
        Fixed1(s.memory.used),
        Fixed1(s.memory.avail),
        Fixed1(s.memory.percent),
        Fixed1(s.network.up),
        Fixed1(s.network.down),
        s.cmd,
        s.time,
    );
    out
}

/// Envolve `payload` no frame `pcs` + tamanho big-endian.
///
/// Falha se o payload não couber em 16 bits; nunca trunca.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u16::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Codifica um [`StatsSnapshot`] para o display.
pub fn encode(snapshot: &StatsSnapshot) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(render_payload(snapshot).as_bytes())
}

/// Separa o primeiro frame de `data`.
///
/// Retorna `(payload, resto)`; o resto permite ler frames consecutivos de um stream.
pub fn decode_frame(data: &[u8]) -> Result<(&[u8], &[u8]), ProtocolError> {
    if data.len() < HEADER_SIZE {
        return Err(ProtocolError::TooShort(data.len()));
    }

    let magic = [data[0], data[1], data[2]];
    if magic != MAGIC {
        return Err(ProtocolError::InvalidMagic(magic));
    }

    let expected = u16::from_be_bytes([data[3], data[4]]) as usize;
    let body = &data[HEADER_SIZE..];
    if body.len() < expected {
        return Err(ProtocolError::Truncated {
            expected,
            actual: body.len(),
        });
    }
    Ok(body.split_at(expected))
}

/// Decodifica um frame completo em [`StatsSnapshot`].
pub fn decode_snapshot(data: &[u8]) -> Result<StatsSnapshot, ProtocolError> {
    let (payload, _) = decode_frame(data)?;
    let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::Utf8)?;
    serde_json::from_str(text).map_err(|e| ProtocolError::Json(e.to_string()))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn sample_snapshot() -> StatsSnapshot {
        let mut s = StatsSnapshot::default();
        s.board = BoardStats {
            temp: 36.04,
            rpm: 1850.0,
            tick: 125,
        };
        s.cpu.temp = 52.36;
        s.cpu.core1_temp = 52.36;
        s.cpu.core1_distance_to_tj_max = 47.64;
        s.cpu.load = 17.5;
        s.cpu.consume = 4.21;
        s.gpu.temp = 44.0;
        s.gpu.freq = 612.0;
        s.storage.percent = 63.2;
        s.memory = MemoryStats {
            used: 11.3,
            avail: 4.7,
            percent: 70.6,
        };
        s.network = NetworkStats { up: 0.4, down: 12.9 };
        s.time = 1_717_232_400;
        s
    }

    #[test]
    fn payload_has_device_field_order() {
        let json = render_payload(&sample_snapshot());
        assert!(json.starts_with("{\"board\":{\"temp\":36.0,\"rpm\":1850.0,\"tick\":125},\"cpu\":{"));
        assert!(json.contains("\"tjMax\":100,\"core1DistanceToTjMax\":47.6,\"core1Temp\":52.4"));
        assert!(json.ends_with(",\"cmd\":1230,\"time\":1717232400}"));
    }

    #[test]
    fn payload_is_valid_json_with_one_decimal() {
        let json = render_payload(&sample_snapshot());
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["gpu"]["memTotal"], serde_json::json!(0.0));
        assert_eq!(v["memory"]["avail"], serde_json::json!(4.7));
        assert_eq!(v["network"]["down"], serde_json::json!(12.9));
        assert_eq!(v["board"]["tick"], serde_json::json!(125));
    }

    #[test]
    fn non_finite_values_render_as_zero() {
        let mut s = StatsSnapshot::default();
        s.cpu.consume = f32::NAN;
        s.network.down = f32::INFINITY;
        let json = render_payload(&s);
        assert!(json.contains("\"consume\":0.0"));
        assert!(json.contains("\"down\":0.0"));
        assert!(serde_json::from_str::<serde_json::Value>(&json).is_ok());
    }

    #[test]
    fn frame_length_is_big_endian() {
        let payload = vec![b'x'; 300];
        let frame = encode_frame(&payload).unwrap();
        assert_eq!(&frame[..3], b"pcs");
        assert_eq!(u16::from_be_bytes([frame[3], frame[4]]), 300);

        let (body, rest) = decode_frame(&frame).unwrap();
        assert_eq!(body, payload.as_slice());
        assert!(rest.is_empty());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            encode_frame(&payload),
            Err(ProtocolError::PayloadTooLarge(65536))
        ));
        assert!(encode_frame(&payload[..MAX_PAYLOAD]).is_ok());
    }

    #[test]
    fn consecutive_frames_are_split() {
        let mut stream = encode_frame(b"{}").unwrap();
        stream.extend(encode_frame(b"[1]").unwrap());
        let (first, rest) = decode_frame(&stream).unwrap();
        assert_eq!(first, b"{}");
        let (second, rest) = decode_frame(rest).unwrap();
        assert_eq!(second, b"[1]");
        assert!(rest.is_empty());
    }

    #[test]
    fn rejects_invalid_magic() {
        let mut frame = encode_frame(b"{}").unwrap();
        frame[0] = b'x';
        assert!(matches!(
            decode_frame(&frame),
            Err(ProtocolError::InvalidMagic(m)) if &m == b"xcs"
        ));
    }

    #[test]
    fn rejects_short_and_truncated_frames() {
        assert!(matches!(decode_frame(b"pc"), Err(ProtocolError::TooShort(2))));
        let frame = encode_frame(b"{\"a\":1}").unwrap();
        assert!(matches!(
            decode_frame(&frame[..frame.len() - 2]),
            Err(ProtocolError::Truncated {
                expected: 7,
                actual: 5
            })
        ));
    }

    #[test]
    fn snapshot_survives_the_wire() {
        let original = sample_snapshot();
        let decoded = decode_snapshot(&encode(&original).unwrap()).unwrap();
        assert_eq!(decoded.cmd, CMD_PC_STATUS);
        assert_eq!(decoded.time, original.time);
        assert_eq!(decoded.board.tick, 125);
        assert_eq!(decoded.cpu.core1_temp, 52.4);
        assert_eq!(decoded.memory.used, 11.3);
    }
}
