//! Montador do snapshot: o único ponto de entrada por tick.
//!
//! [`TelemetryEngine`] é dono de todo o estado mutável da coleta (caches de
//! chaves, assinatura de contadores, amostra anterior, baselines de CPU e
//! rede). Não há estado global; quem dirige o tick recebe o engine por posse.

use crate::counters::{CpuLoadMeter, NetworkMeter, OsCounters};
use crate::power::{CounterTelemetry, DeltaSampler, PowerSample, SamplerError};
use crate::thermal::{DomainTemperatures, TemperatureAggregator};
use crate::types::{
    BoardStats, CMD_PC_STATUS, CpuStats, GpuStats, MemoryStats, NetworkStats, StatsSnapshot,
    StorageStats, TEMP_MAX, TJ_MAX,
};
use chrono::{DateTime, FixedOffset, Local};
use std::time::Instant;
use tracing::debug;

/// Deslocamento fixo aplicado ao timestamp do display (s).
const DEVICE_TIME_SHIFT_SECS: i64 = 3600;

/// Timestamp esperado pelo display.
///
/// O display não conhece fuso: recebe a hora local num campo "UTC".
/// Valor = instante Unix + deslocamento local − 3600.
pub fn device_timestamp(local: DateTime<FixedOffset>) -> i64 {
    local.timestamp() + i64::from(local.offset().local_minus_utc()) - DEVICE_TIME_SHIFT_SECS
}

// ──────────────────────────────────────────────
// Relatório de inicialização
// ──────────────────────────────────────────────

/// Disponibilidade de um provedor, apurada uma única vez na construção.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Available,
    Unavailable(String),
}

impl ProviderStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Estado dos provedores nativos, para o chamador registrar no log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub sensors: ProviderStatus,
    pub thermal_fallback: ProviderStatus,
    pub counters: ProviderStatus,
}

// ──────────────────────────────────────────────
// Engine
// ──────────────────────────────────────────────

/// Engine de coleta.
pub struct TelemetryEngine<C: CounterTelemetry> {
    temperatures: TemperatureAggregator,
    sampler: DeltaSampler<C>,
    os: Box<dyn OsCounters>,
    cpu_load: CpuLoadMeter,
    network: NetworkMeter,
    started: Instant,
    telemetry_enabled: bool,
    disk_mount: String,
    /// Últimos valores conhecidos; mantidos quando um tick não produz taxa
    power: PowerSample,
}

impl<C: CounterTelemetry> TelemetryEngine<C> {
    /// Monta o engine e grava os baselines de CPU e rede.
    pub fn new(
        temperatures: TemperatureAggregator,
        sampler: DeltaSampler<C>,
        os: Box<dyn OsCounters>,
        disk_mount: impl Into<String>,
    ) -> Self {
        let started = Instant::now();
        let mut engine = Self {
            temperatures,
            sampler,
            os,
            cpu_load: CpuLoadMeter::default(),
            network: NetworkMeter::default(),
            started,
            telemetry_enabled: false,
            disk_mount: disk_mount.into(),
            power: PowerSample::default(),
        };
        engine.prime(started);
        engine
    }

    fn prime(&mut self, now: Instant) {
        if let Some(ticks) = self.os.cpu_ticks() {
            self.cpu_load.update(ticks);
        }
        let bytes = self.os.network_bytes();
        self.network.update(bytes, now);
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry_enabled
    }

    /// Liga temperaturas e potência/frequência.
    ///
    /// As temperaturas ficam ligadas mesmo se o amostrador falhar; o erro é
    /// devolvido para o chamador decidir se segue sem potência.
    pub fn enable_telemetry(&mut self) -> Result<(), SamplerError> {
        self.telemetry_enabled = true;
        self.sampler.initialize()?;
        // Baseline: a primeira taxa sai no próximo tick.
        self.sampler.sample();
        Ok(())
    }

    /// Coleta um snapshot agora.
    pub fn collect(&mut self) -> StatsSnapshot {
        self.collect_at(Instant::now(), Local::now().fixed_offset())
    }

    /// Coleta um snapshot tratando `now`/`local` como o instante do tick.
    pub fn collect_at(&mut self, now: Instant, local: DateTime<FixedOffset>) -> StatsSnapshot {
        let temps = if self.telemetry_enabled {
            if let Some(power) = self.sampler.sample_at(now) {
                self.power = power;
            }
            self.temperatures.read_all()
        } else {
            DomainTemperatures::default()
        };
        let power = self.power;

        let fans = self.temperatures.registry().fan_info();

        let load = match self.os.cpu_ticks() {
            Some(ticks) => self.cpu_load.update(ticks),
            None => self.os.cpu_usage_hint(),
        };
        let memory = self.os.memory();
        let disk = self.os.disk_usage_percent(&self.disk_mount);
        let bytes = self.os.network_bytes();
        let (up, down) = self.network.update(bytes, now);

        let uptime = now.saturating_duration_since(self.started).as_secs();
        let tick = i32::try_from(uptime).unwrap_or(i32::MAX);

        debug!(
            "Tick: CPU {load:.1}% {:.1}°C {:.2}W | GPU {:.1}% {:.1}°C {:.0}MHz",
            temps.cpu, power.cpu_watts, power.gpu_load, temps.gpu, power.gpu_freq_mhz
        );

        StatsSnapshot {
            board: BoardStats {
                temp: temps.board,
                rpm: fans.rpm_at(0),
                tick,
            },
            cpu: CpuStats {
                temp: temps.cpu,
                temp_max: TEMP_MAX,
                load,
                consume: power.cpu_watts,
                tj_max: TJ_MAX,
                core1_distance_to_tj_max: TJ_MAX as f32 - temps.cpu,
                core1_temp: temps.cpu,
            },
            gpu: GpuStats {
                temp: temps.gpu,
                temp_max: TEMP_MAX,
                load: power.gpu_load,
                consume: power.gpu_watts,
                rpm: fans.rpm_at(1),
                mem_used: 0.0,
                mem_total: 0.0,
                freq: power.gpu_freq_mhz,
            },
            storage: StorageStats {
                temp: 0.0,
                read: 0.0,
                write: 0.0,
                percent: disk,
            },
            memory: MemoryStats {
                used: memory.used_gb,
                avail: memory.avail_gb,
                percent: memory.percent,
            },
            network: NetworkStats { up, down },
            cmd: CMD_PC_STATUS,
            time: device_timestamp(local),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::tests::MockOs;
    use crate::counters::{CpuTicks, MemoryReading, NetworkBytes};
    use crate::power::tests::{MockCounters, energy};
    use crate::registry::KeyRegistry;
    use crate::registry::tests::MockSmc;
    use crate::thermal::tests::MockHid;
    use chrono::TimeZone;
    use std::time::Duration;

    fn local(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    fn os() -> MockOs {
        MockOs {
            ticks: vec![
                CpuTicks { total: 1000, idle: 900 },
                CpuTicks { total: 1400, idle: 1000 },
            ],
            memory: MemoryReading {
                used_gb: 10.0,
                avail_gb: 6.0,
                percent: 62.5,
            },
            network: vec![
                NetworkBytes::default(),
                NetworkBytes {
                    received: 2_500_000,
                    transmitted: 125_000,
                },
            ],
            disk: 41.0,
        }
    }

    fn smc() -> MockSmc {
        MockSmc::default()
            .with_sp78(b"Tp01", 50.0)
            .with_sp78(b"Tg0f", 40.0)
            .with_sp78(b"Ts0P", 30.0)
            .with_flt(b"F0Ac", 1500.0)
            .with_flt(b"F1Ac", 2100.0)
    }

    fn engine(smc: MockSmc, counters: MockCounters) -> TelemetryEngine<MockCounters> {
        TelemetryEngine::new(
            TemperatureAggregator::new(KeyRegistry::new(Some(Box::new(smc))), None),
            DeltaSampler::new(counters),
            Box::new(os()),
            "/",
        )
    }

    #[test]
    fn timestamp_reproduces_device_convention() {
        let ts = device_timestamp(local("2024-06-01T10:00:00-05:00"));
        let as_utc = chrono::Utc
            .with_ymd_and_hms(2024, 6, 1, 10, 0, 0)
            .unwrap()
            .timestamp();
        assert_eq!(ts, as_utc - 3600);

        let ts = device_timestamp(local("2024-06-01T10:00:00+00:00"));
        assert_eq!(ts, as_utc - 3600);
    }

    #[test]
    fn snapshot_without_telemetry() {
        let mut engine = engine(smc(), MockCounters::available());
        let t0 = engine.started;
        let s = engine.collect_at(t0 + Duration::from_secs(2), local("2024-06-01T10:00:00+00:00"));

        // Sem opt-in: nada de temperatura nem potência
        assert_eq!(s.cpu.temp, 0.0);
        assert_eq!(s.board.temp, 0.0);
        assert_eq!(s.cpu.consume, 0.0);
        assert_eq!(s.cpu.core1_distance_to_tj_max, 100.0);

        // Ventoinhas e contadores do SO sempre
        assert_eq!(s.board.rpm, 1500.0);
        assert_eq!(s.gpu.rpm, 2100.0);
        assert_eq!(s.cpu.load, 75.0);
        assert_eq!(s.memory.used, 10.0);
        assert_eq!(s.storage.percent, 41.0);
        assert_eq!(s.board.tick, 2);
        assert_eq!(s.cmd, 1230);

        // 2.5 MB em 2 s = 10 Mb/s
        assert!((s.network.down - 10.0).abs() < 1e-4);
        assert!((s.network.up - 0.5).abs() < 1e-4);
    }

    #[test]
    fn telemetry_fills_temperatures_and_power() {
        let counters = MockCounters::available();
        counters.push(vec![energy("CPU Energy", "mJ", 0)]);
        counters.push(vec![energy("CPU Energy", "mJ", 4_000)]);
        let mut engine = engine(smc(), counters);
        engine.enable_telemetry().unwrap();
        assert!(engine.telemetry_enabled());

        let later = Instant::now() + Duration::from_secs(1);
        let s = engine.collect_at(later, local("2024-06-01T10:00:00+00:00"));
        assert_eq!(s.cpu.temp, 50.0);
        assert_eq!(s.cpu.core1_temp, 50.0);
        assert_eq!(s.cpu.core1_distance_to_tj_max, 50.0);
        assert_eq!(s.gpu.temp, 40.0);
        assert_eq!(s.board.temp, 30.0);
        // ~4 J em ~1 s
        assert!(s.cpu.consume > 3.5 && s.cpu.consume <= 4.0);
    }

    #[test]
    fn last_power_is_kept_when_tick_has_no_sample() {
        let counters = MockCounters::available();
        counters.push(vec![energy("GPU Energy", "mJ", 0)]);
        counters.push(vec![energy("GPU Energy", "mJ", 2_000)]);
        let mut engine = engine(smc(), counters);
        engine.enable_telemetry().unwrap();

        let t = Instant::now() + Duration::from_secs(1);
        let first = engine.collect_at(t, local("2024-06-01T10:00:00+00:00"));
        let second = engine.collect_at(t + Duration::from_secs(1), local("2024-06-01T10:00:01+00:00"));
        assert!(first.gpu.consume > 0.0);
        assert_eq!(second.gpu.consume, first.gpu.consume);
    }

    #[test]
    fn sampler_failure_keeps_temperatures() {
        let mut engine = engine(smc(), MockCounters::default());
        assert!(matches!(engine.enable_telemetry(), Err(SamplerError::NoChannels)));

        let s = engine.collect_at(Instant::now(), local("2024-06-01T10:00:00+00:00"));
        assert_eq!(s.cpu.temp, 50.0);
        assert_eq!(s.cpu.consume, 0.0);
        assert_eq!(s.gpu.freq, 0.0);
    }

    #[test]
    fn hid_fallback_reaches_snapshot() {
        let mut engine = TelemetryEngine::new(
            TemperatureAggregator::new(
                KeyRegistry::unavailable(),
                Some(Box::new(MockHid(vec![("pACC MTR Temp Sensor0", 61.0)]))),
            ),
            DeltaSampler::new(MockCounters::default()),
            Box::new(MockOs::default()),
            "/",
        );
        let _ = engine.enable_telemetry();
        let s = engine.collect_at(Instant::now(), local("2024-06-01T10:00:00+00:00"));
        assert_eq!(s.cpu.temp, 61.0);
        assert_eq!(s.gpu.temp, 0.0);
        assert_eq!(s.board.rpm, 0.0);
        // Sem ticks de CPU: usa a leitura da própria fonte
        assert_eq!(s.cpu.load, 12.5);
    }
}
