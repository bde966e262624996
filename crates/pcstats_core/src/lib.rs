//! # PC Stats Core
//!
//! Engine de amostragem de telemetria de hardware para o display externo:
//! descobre os sensores da máquina, decodifica as leituras brutas, integra
//! contadores cumulativos em taxas e monta um snapshot por tick.
//!
//! ## Módulos
//! - [`decode`] – Conversão de bytes + tipo em valor físico
//! - [`registry`] – Chaves do SMC com cache por domínio
//! - [`thermal`] – Média de temperaturas com fallback HID
//! - [`power`] – Potência/frequência por delta de contadores (IOReport)
//! - [`counters`] – CPU, memória, rede e disco do SO
//! - [`engine`] – Montagem do snapshot por tick
//! - [`types`] – Snapshot e seus grupos
//! - [`protocol`] – JSON do display e frame `pcs`
//! - [`config`] – Configuração unificada via TOML
//! - [`platform`] – Provedores nativos

pub mod config;
pub mod counters;
pub mod decode;
pub mod engine;
pub mod platform;
pub mod power;
pub mod protocol;
pub mod registry;
pub mod thermal;
pub mod types;

// Re-exports convenientes
pub use config::{AppConfig, SenderConfig, SinkKind, TelemetryConfig};
pub use engine::{InitReport, ProviderStatus, TelemetryEngine};
pub use protocol::{ProtocolError, decode_frame, decode_snapshot, encode};
pub use types::StatsSnapshot;
