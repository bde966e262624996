//! Seleção dos provedores nativos.
//!
//! No macOS: SMC, sensores HID e IOReport. Nas demais plataformas os
//! provedores de hardware ficam indisponíveis e o engine entrega zeros nesses
//! campos; os contadores do SO continuam valendo.

#[cfg(target_os = "macos")]
pub mod macos;

use crate::counters::SysinfoCounters;
use crate::engine::{InitReport, ProviderStatus, TelemetryEngine};
use crate::power::{ChannelReading, CounterTelemetry, DeltaSampler};
use crate::registry::{KeyRegistry, ProviderError, SensorProvider};
use crate::thermal::{TemperatureAggregator, ThermalFallback};

#[cfg(target_os = "macos")]
pub type NativeCounters = macos::IoReport;

#[cfg(not(target_os = "macos"))]
pub type NativeCounters = Unsupported;

/// Provedor de contadores para plataformas sem telemetria de energia.
#[derive(Debug, Default)]
pub struct Unsupported;

impl CounterTelemetry for Unsupported {
    type Channels = ();
    type Subscription = ();
    type Sample = ();

    fn channels_in_group(&self, _group: &str, _subgroup: Option<&str>) -> Option<()> {
        None
    }

    fn merge(&self, _base: (), _extra: ()) {}

    fn subscribe(&self, _channels: &()) -> Option<()> {
        None
    }

    fn sample(&self, _subscription: &(), _channels: &()) -> Option<()> {
        None
    }

    fn delta(&self, _previous: &(), _current: &()) -> Vec<ChannelReading> {
        Vec::new()
    }

    fn frequency_table_blob(&self) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(target_os = "macos")]
fn open_sensor_provider() -> Result<Box<dyn SensorProvider>, ProviderError> {
    Ok(Box::new(macos::SmcConnection::open()?))
}

#[cfg(not(target_os = "macos"))]
fn open_sensor_provider() -> Result<Box<dyn SensorProvider>, ProviderError> {
    Err(ProviderError::Unavailable(format!(
        "SMC não existe em {}",
        std::env::consts::OS
    )))
}

#[cfg(target_os = "macos")]
fn thermal_fallback() -> Option<Box<dyn ThermalFallback>> {
    Some(Box::new(macos::HidThermal))
}

#[cfg(not(target_os = "macos"))]
fn thermal_fallback() -> Option<Box<dyn ThermalFallback>> {
    None
}

#[cfg(target_os = "macos")]
fn counter_provider() -> (NativeCounters, ProviderStatus) {
    let provider = macos::IoReport::load();
    let status = match provider.unavailable_reason() {
        None => ProviderStatus::Available,
        Some(reason) => ProviderStatus::Unavailable(reason.to_string()),
    };
    (provider, status)
}

#[cfg(not(target_os = "macos"))]
fn counter_provider() -> (NativeCounters, ProviderStatus) {
    let status = ProviderStatus::Unavailable(format!("IOReport não existe em {}", std::env::consts::OS));
    (Unsupported, status)
}

/// Constrói o engine com os provedores da plataforma atual.
///
/// Falhas de abertura não são fatais: o domínio afetado fica zerado para o
/// resto do processo e o motivo vai no [`InitReport`].
pub fn native(disk_mount: &str) -> (TelemetryEngine<NativeCounters>, InitReport) {
    let (provider, sensors) = match open_sensor_provider() {
        Ok(provider) => (Some(provider), ProviderStatus::Available),
        Err(e) => (None, ProviderStatus::Unavailable(e.to_string())),
    };

    let fallback = thermal_fallback();
    let thermal_fallback = if fallback.is_some() {
        ProviderStatus::Available
    } else {
        ProviderStatus::Unavailable("sem sensores HID nesta plataforma".into())
    };

    let (counters, counters_status) = counter_provider();

    let engine = TelemetryEngine::new(
        TemperatureAggregator::new(KeyRegistry::new(provider), fallback),
        DeltaSampler::new(counters),
        Box::new(SysinfoCounters::new()),
        disk_mount,
    );
    let report = InitReport {
        sensors,
        thermal_fallback,
        counters: counters_status,
    };
    (engine, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::SamplerError;

    #[test]
    fn unsupported_counters_never_initialize() {
        let mut sampler = DeltaSampler::new(Unsupported);
        assert!(matches!(sampler.initialize(), Err(SamplerError::NoChannels)));
        assert!(sampler.frequency_table().is_empty());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn native_engine_degrades_off_macos() {
        let (mut engine, report) = native("/");
        assert!(!report.sensors.is_available());
        assert!(!report.counters.is_available());
        assert!(engine.enable_telemetry().is_err());

        let s = engine.collect();
        assert_eq!(s.cpu.temp, 0.0);
        assert_eq!(s.gpu.consume, 0.0);
        assert_eq!(s.cmd, 1230);
    }
}
