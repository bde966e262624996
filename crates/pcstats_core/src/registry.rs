//! Registro de chaves do SMC com cache por domínio.
//!
//! Cada domínio (CPU, GPU, placa) tem uma lista fixa de chaves candidatas.
//! Na primeira leitura do domínio as candidatas são sondadas uma única vez;
//! só as que o provedor reconhece ficam no cache, junto com seus metadados.
//! Leituras seguintes custam uma chamada ao provedor por chave em vez de duas.

use crate::decode::{KeyInfo, MAX_KEY_BYTES, RawSample, SensorKey, decode_sample};
use std::cell::OnceCell;
use tracing::debug;

/// Limite de chaves retidas por domínio.
pub const MAX_CACHED_KEYS: usize = 32;

/// Número de slots de ventoinha consultados.
pub const MAX_FANS: usize = 4;

// ──────────────────────────────────────────────
// Provedor
// ──────────────────────────────────────────────

/// Erros do provedor de sensores.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provedor de sensores indisponível: {0}")]
    Unavailable(String),

    #[error("Chave {0} não encontrada")]
    KeyNotFound(SensorKey),

    #[error("Chamada ao provedor falhou para {key} (código {code})")]
    Call { key: SensorKey, code: i32 },

    #[error("Chave {key} declara {size} bytes (máximo {MAX_KEY_BYTES})")]
    Oversized { key: SensorKey, size: u32 },
}

/// Interface endereçável por chave (estilo SMC).
///
/// A conexão é aberta pelo construtor da implementação; uma falha ali é
/// reportada como [`ProviderError::Unavailable`] e o registro fica sem provedor.
pub trait SensorProvider {
    /// Consulta tamanho e tipo de uma chave.
    fn key_info(&self, key: SensorKey) -> Result<KeyInfo, ProviderError>;

    /// Lê os bytes de uma chave com metadados já conhecidos.
    fn read_bytes(&self, key: SensorKey, info: &KeyInfo) -> Result<RawSample, ProviderError>;
}

// ──────────────────────────────────────────────
// Domínios e candidatas
// ──────────────────────────────────────────────

/// Domínio térmico.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorDomain {
    Cpu,
    Gpu,
    Board,
}

const CPU_KEYS: &[SensorKey] = &[
    SensorKey::new(*b"Tp01"),
    SensorKey::new(*b"Tp02"),
    SensorKey::new(*b"Tp03"),
    SensorKey::new(*b"Tp04"),
    SensorKey::new(*b"Tp05"),
    SensorKey::new(*b"Tp06"),
    SensorKey::new(*b"Tp07"),
    SensorKey::new(*b"Tp08"),
    SensorKey::new(*b"Tp09"),
    SensorKey::new(*b"Tp0A"),
    SensorKey::new(*b"Tp0B"),
    SensorKey::new(*b"Tp0C"),
    SensorKey::new(*b"Tp0D"),
    SensorKey::new(*b"Tp0E"),
    SensorKey::new(*b"Tp0F"),
    SensorKey::new(*b"Tp0G"),
    SensorKey::new(*b"Te01"),
    SensorKey::new(*b"Te02"),
    SensorKey::new(*b"Te03"),
    SensorKey::new(*b"Te04"),
    SensorKey::new(*b"Te05"),
    SensorKey::new(*b"Te06"),
    SensorKey::new(*b"Te07"),
    SensorKey::new(*b"Te08"),
    SensorKey::new(*b"Tc0c"),
    SensorKey::new(*b"Tc1c"),
    SensorKey::new(*b"Tc2c"),
    SensorKey::new(*b"Tc3c"),
];

const GPU_KEYS: &[SensorKey] = &[
    SensorKey::new(*b"Tg0f"),
    SensorKey::new(*b"Tg0j"),
    SensorKey::new(*b"Tg0D"),
    SensorKey::new(*b"Tg0d"),
    SensorKey::new(*b"Tg05"),
    SensorKey::new(*b"Tg0P"),
    SensorKey::new(*b"Tg0p"),
];

const BOARD_KEYS: &[SensorKey] = &[
    // PCH (Platform Controller Hub)
    SensorKey::new(*b"Tm0P"),
    SensorKey::new(*b"Tm1P"),
    SensorKey::new(*b"Tm2P"),
    // Sensores de sistema/gabinete
    SensorKey::new(*b"Ts0P"),
    SensorKey::new(*b"Ts1P"),
    SensorKey::new(*b"Ts2P"),
    SensorKey::new(*b"TM0P"),
    SensorKey::new(*b"TM1P"),
    // Módulo wireless
    SensorKey::new(*b"Tw0P"),
];

impl SensorDomain {
    /// Lista fixa de chaves sondadas para o domínio.
    pub fn candidates(self) -> &'static [SensorKey] {
        match self {
            Self::Cpu => CPU_KEYS,
            Self::Gpu => GPU_KEYS,
            Self::Board => BOARD_KEYS,
        }
    }
}

// ──────────────────────────────────────────────
// Cache
// ──────────────────────────────────────────────

/// Chave reconhecida pelo provedor, com metadados guardados.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedKeyInfo {
    pub key: SensorKey,
    pub info: KeyInfo,
}

/// Sonda `candidates` na ordem dada e retém as chaves com tamanho não nulo.
pub fn probe_keys(provider: &dyn SensorProvider, candidates: &[SensorKey]) -> Vec<CachedKeyInfo> {
    let mut cached = Vec::new();
    for &key in candidates {
        if cached.len() >= MAX_CACHED_KEYS {
            break;
        }
        match provider.key_info(key) {
            Ok(info) if info.data_size > 0 => cached.push(CachedKeyInfo { key, info }),
            Ok(_) => {}
            Err(e) => debug!("Sonda {key}: {e}"),
        }
    }
    cached
}

/// Registro com cache preguiçoso (inicializado uma vez) por domínio.
pub struct KeyRegistry {
    provider: Option<Box<dyn SensorProvider>>,
    cpu: OnceCell<Vec<CachedKeyInfo>>,
    gpu: OnceCell<Vec<CachedKeyInfo>>,
    board: OnceCell<Vec<CachedKeyInfo>>,
}

impl KeyRegistry {
    pub fn new(provider: Option<Box<dyn SensorProvider>>) -> Self {
        Self {
            provider,
            cpu: OnceCell::new(),
            gpu: OnceCell::new(),
            board: OnceCell::new(),
        }
    }

    /// Registro sem provedor: todos os domínios ficam vazios.
    pub fn unavailable() -> Self {
        Self::new(None)
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    /// Chaves válidas do domínio. Sonda apenas na primeira chamada.
    pub fn probe_domain(&self, domain: SensorDomain) -> &[CachedKeyInfo] {
        let cell = match domain {
            SensorDomain::Cpu => &self.cpu,
            SensorDomain::Gpu => &self.gpu,
            SensorDomain::Board => &self.board,
        };
        cell.get_or_init(|| match &self.provider {
            Some(provider) => {
                let keys = probe_keys(provider.as_ref(), domain.candidates());
                debug!("SMC {domain:?}: {} chaves válidas", keys.len());
                keys
            }
            None => Vec::new(),
        })
    }

    /// Lê uma chave do cache (uma chamada ao provedor). Falhas viram `0.0`.
    pub fn read_cached(&self, cached: &CachedKeyInfo) -> f32 {
        let Some(provider) = &self.provider else {
            return 0.0;
        };
        match provider.read_bytes(cached.key, &cached.info) {
            Ok(sample) => decode_sample(&sample, &cached.info),
            Err(e) => {
                debug!("Leitura {}: {e}", cached.key);
                0.0
            }
        }
    }

    /// Leitura sem cache: metadados e valor (duas chamadas).
    pub fn read_key(&self, key: SensorKey) -> f32 {
        let Some(provider) = &self.provider else {
            return 0.0;
        };
        let info = match provider.key_info(key) {
            Ok(info) => info,
            Err(_) => return 0.0,
        };
        if info.data_size as usize > MAX_KEY_BYTES {
            return 0.0;
        }
        match provider.read_bytes(key, &info) {
            Ok(sample) => decode_sample(&sample, &info),
            Err(_) => 0.0,
        }
    }

    /// Lê RPM atual, mínimo e máximo das ventoinhas.
    ///
    /// Para no primeiro slot sem leitura positiva.
    pub fn fan_info(&self) -> FanInfo {
        let mut fans = FanInfo::default();
        if self.provider.is_none() {
            return fans;
        }

        for slot in 0..MAX_FANS {
            let rpm = self.read_key(SensorKey::fan(slot, b"Ac"));
            if rpm <= 0.0 {
                break;
            }
            fans.rpm[slot] = rpm;
            fans.min_rpm[slot] = self.read_key(SensorKey::fan(slot, b"Mn"));
            fans.max_rpm[slot] = self.read_key(SensorKey::fan(slot, b"Mx"));
            fans.count = slot + 1;
        }
        fans
    }
}

// ──────────────────────────────────────────────
// Ventoinhas
// ──────────────────────────────────────────────

/// Leituras das ventoinhas do SMC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanInfo {
    pub count: usize,
    pub rpm: [f32; MAX_FANS],
    pub min_rpm: [f32; MAX_FANS],
    pub max_rpm: [f32; MAX_FANS],
}

impl FanInfo {
    /// RPM do slot `index` se ele estiver populado.
    ///
    /// Convenção posicional: slot 0 → placa, slot 1 → GPU. O hardware não
    /// informa a qual domínio cada ventoinha pertence.
    pub fn rpm_at(&self, index: usize) -> f32 {
        if index < self.count { self.rpm[index] } else { 0.0 }
    }
}
