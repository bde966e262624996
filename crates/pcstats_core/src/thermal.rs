//! Agregação de temperaturas por domínio.
//!
//! Caminho primário: chaves do SMC em cache ([`KeyRegistry`]). Caminho
//! secundário: sensores térmicos HID, usados quando o SMC não expõe nenhuma
//! chave térmica de CPU nem de GPU (gerações mais antigas do Apple Silicon).

use crate::registry::{KeyRegistry, SensorDomain};
use tracing::debug;

/// Faixa plausível (exclusiva) de uma leitura.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibleRange {
    pub min: f32,
    pub max: f32,
}

impl PlausibleRange {
    pub fn admits(&self, value: f32) -> bool {
        value > self.min && value < self.max
    }
}

/// CPU e GPU.
pub const CORE_RANGE: PlausibleRange = PlausibleRange { min: 10.0, max: 130.0 };

/// Sensores da placa trabalham mais frios; uma faixa larga admitiria ruído.
pub const BOARD_RANGE: PlausibleRange = PlausibleRange { min: 10.0, max: 100.0 };

impl SensorDomain {
    pub fn plausible_range(self) -> PlausibleRange {
        match self {
            SensorDomain::Cpu | SensorDomain::Gpu => CORE_RANGE,
            SensorDomain::Board => BOARD_RANGE,
        }
    }
}

/// Média aritmética das leituras admitidas; `0.0` se nenhuma for admitida.
pub fn average_plausible(readings: impl IntoIterator<Item = f32>, range: PlausibleRange) -> f32 {
    let (sum, count) = readings
        .into_iter()
        .filter(|t| range.admits(*t))
        .fold((0.0_f32, 0_u32), |(s, c), t| (s + t, c + 1));
    if count > 0 { sum / count as f32 } else { 0.0 }
}

// ──────────────────────────────────────────────
// Provedor secundário (HID)
// ──────────────────────────────────────────────

/// Leitura de um sensor térmico identificado pelo nome do produto.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedReading {
    pub name: String,
    pub celsius: f32,
}

/// Interface de eventos térmicos (HID) usada apenas como fallback.
pub trait ThermalFallback {
    fn read_sensors(&self) -> Vec<NamedReading>;
}

/// Classifica e calcula a média CPU/GPU das leituras HID.
///
/// - CPU: `ACC MTR Temp` (pACC/eACC) ou `CPU` no nome
/// - GPU: `GPU MTR Temp` ou `GPU` no nome
pub fn classify_hid(readings: &[NamedReading]) -> (f32, f32) {
    let mut cpu = Vec::new();
    let mut gpu = Vec::new();

    for r in readings {
        if !(10.0..=130.0).contains(&r.celsius) {
            continue;
        }
        if r.name.contains("ACC MTR Temp") || r.name.contains("CPU") {
            cpu.push(r.celsius);
        } else if r.name.contains("GPU MTR Temp") || r.name.contains("GPU") {
            gpu.push(r.celsius);
        }
    }

    (mean(&cpu), mean(&gpu))
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

// ──────────────────────────────────────────────
// Agregador
// ──────────────────────────────────────────────

/// Temperaturas de um tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DomainTemperatures {
    pub cpu: f32,
    pub gpu: f32,
    pub board: f32,
}

/// Agrega temperaturas a partir do registro e do fallback HID.
pub struct TemperatureAggregator {
    registry: KeyRegistry,
    fallback: Option<Box<dyn ThermalFallback>>,
}

impl TemperatureAggregator {
    pub fn new(registry: KeyRegistry, fallback: Option<Box<dyn ThermalFallback>>) -> Self {
        Self { registry, fallback }
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Lê todas as chaves em cache do domínio e devolve a média plausível.
    pub fn read_domain_temperature(&self, domain: SensorDomain) -> f32 {
        let keys = self.registry.probe_domain(domain);
        average_plausible(
            keys.iter().map(|k| self.registry.read_cached(k)),
            domain.plausible_range(),
        )
    }

    /// CPU e GPU com fallback: o HID só é consultado se **ambos** vierem 0.0.
    pub fn read_cpu_gpu(&self) -> (f32, f32) {
        let cpu = self.read_domain_temperature(SensorDomain::Cpu);
        let gpu = self.read_domain_temperature(SensorDomain::Gpu);
        if cpu != 0.0 || gpu != 0.0 {
            return (cpu, gpu);
        }

        match &self.fallback {
            Some(hid) => {
                let (cpu, gpu) = classify_hid(&hid.read_sensors());
                debug!("HID fallback: CPU {cpu:.1}°C GPU {gpu:.1}°C");
                (cpu, gpu)
            }
            None => (0.0, 0.0),
        }
    }

    /// Leitura completa do tick (CPU, GPU, placa).
    pub fn read_all(&self) -> DomainTemperatures {
        let (cpu, gpu) = self.read_cpu_gpu();
        DomainTemperatures {
            cpu,
            gpu,
            board: self.read_domain_temperature(SensorDomain::Board),
        }
    }
}
