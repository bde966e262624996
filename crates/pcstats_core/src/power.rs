//! Potência e frequência por delta de contadores (IOReport).
//!
//! O IOReport expõe contadores cumulativos: energia por canal e residência
//! por estado de performance. Uma taxa só existe entre duas amostras, então o
//! amostrador guarda a amostra anterior e o instante em que foi tirada.
//!
//! ```text
//! Uninitialized ──initialize()──▶ Active { previous: None }
//!                                   │ sample()  → baseline, sem taxa
//!                                   ▼
//!                                 Active { previous: Some(..) }
//!                                   │ sample()  → delta / elapsed
//! ```

use std::cell::OnceCell;
use std::time::{Duration, Instant};
use tracing::debug;

/// Grupo de canais de energia.
pub const ENERGY_GROUP: &str = "Energy Model";
/// Grupo e subgrupo dos estados de performance da GPU.
pub const GPU_STATS_GROUP: &str = "GPU Stats";
pub const GPU_PERF_SUBGROUP: &str = "GPU Performance States";
/// Canal de residência da GPU.
pub const GPU_RESIDENCY_CHANNEL: &str = "GPUPH";

/// Intervalo mínimo usado no divisor das taxas.
pub const MIN_ELAPSED: Duration = Duration::from_millis(10);

/// Máximo de entradas na tabela de frequências da GPU.
pub const MAX_GPU_FREQS: usize = 32;

const IDLE_STATES: [&str; 3] = ["IDLE", "OFF", "DOWN"];

// ──────────────────────────────────────────────
// Provedor de contadores
// ──────────────────────────────────────────────

/// Residência acumulada de um estado de performance.
#[derive(Debug, Clone, PartialEq)]
pub struct StateResidency {
    pub name: Option<String>,
    pub residency: i64,
}

/// Um canal do delta entre duas amostras.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelReading {
    pub group: String,
    pub subgroup: String,
    pub name: String,
    pub unit: String,
    /// Valor inteiro simples (energia acumulada no intervalo)
    pub value: i64,
    /// Estados, para canais de residência
    pub states: Vec<StateResidency>,
}

/// Provedor de telemetria por contadores.
///
/// Os tipos associados são opacos para o amostrador; apenas o resultado de
/// [`delta`](CounterTelemetry::delta) é inspecionado.
pub trait CounterTelemetry {
    type Channels;
    type Subscription;
    type Sample;

    /// Canais de um grupo (e subgrupo opcional). `None` se o grupo não existe.
    fn channels_in_group(&self, group: &str, subgroup: Option<&str>) -> Option<Self::Channels>;

    /// Une `extra` em `base`.
    fn merge(&self, base: Self::Channels, extra: Self::Channels) -> Self::Channels;

    fn subscribe(&self, channels: &Self::Channels) -> Option<Self::Subscription>;

    fn sample(&self, subscription: &Self::Subscription, channels: &Self::Channels)
    -> Option<Self::Sample>;

    fn delta(&self, previous: &Self::Sample, current: &Self::Sample) -> Vec<ChannelReading>;

    /// Blob de configuração da plataforma com pares (frequência, tensão).
    fn frequency_table_blob(&self) -> Option<Vec<u8>>;
}

/// Erros de inicialização do amostrador.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("Nenhum grupo de canais disponível ({ENERGY_GROUP} / {GPU_STATS_GROUP})")]
    NoChannels,

    #[error("Falha ao criar a assinatura de contadores")]
    Subscription,
}

// ──────────────────────────────────────────────
// Conversões
// ──────────────────────────────────────────────

/// Energia acumulada no intervalo → potência média (W).
///
/// Unidades aceitas: `nJ`, `uJ`, `mJ`. Qualquer outra resulta em 0.
pub fn energy_to_watts(energy: i64, unit: &str, elapsed: Duration) -> f32 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    let per_sec = energy as f64 / secs;
    let watts = match unit {
        "nJ" => per_sec / 1e9,
        "uJ" => per_sec / 1e6,
        "mJ" => per_sec / 1e3,
        _ => 0.0,
    };
    watts as f32
}

/// Frequência média ponderada (MHz) e carga (%) a partir das residências.
///
/// Estados iniciais `IDLE`/`OFF`/`DOWN` são pulados para achar o offset do
/// primeiro estado ativo; `table[i]` é a frequência do estado `offset + i`.
/// Sem tabela a frequência é 0, mas a carga continua válida.
pub fn residency_frequency(states: &[StateResidency], table: &[u32]) -> (f32, f32) {
    if states.is_empty() {
        return (0.0, 0.0);
    }

    let offset = states
        .iter()
        .position(|s| s.name.as_deref().is_some_and(|n| !IDLE_STATES.contains(&n)))
        .unwrap_or(0);

    let mut total: i64 = 0;
    let mut active: i64 = 0;
    let mut weighted = 0.0_f64;

    for (i, state) in states.iter().enumerate() {
        total += state.residency;
        if i >= offset {
            active += state.residency;
            if let Some(&mhz) = table.get(i - offset) {
                weighted += state.residency as f64 * mhz as f64;
            }
        }
    }

    if active <= 0 || total <= 0 {
        return (0.0, 0.0);
    }

    let freq = if table.is_empty() {
        0.0
    } else {
        (weighted / active as f64) as f32
    };
    let load = (active as f64 / total as f64 * 100.0) as f32;
    (freq, load)
}

/// Extrai as frequências (MHz) do blob `voltage-states`.
///
/// Registros de 8 bytes: `u32` LE em Hz seguido de `u32` LE de tensão.
pub fn parse_frequency_table(blob: &[u8]) -> Vec<u32> {
    blob.chunks_exact(8)
        .map(|rec| u32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]) / 1_000_000)
        .filter(|&mhz| mhz > 0)
        .take(MAX_GPU_FREQS)
        .collect()
}

// ──────────────────────────────────────────────
// Amostrador
// ──────────────────────────────────────────────

/// Valores derivados de um delta.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerSample {
    pub cpu_watts: f32,
    pub gpu_watts: f32,
    pub gpu_freq_mhz: f32,
    pub gpu_load: f32,
}

/// Resume os canais de um delta em [`PowerSample`].
///
/// CPU soma todos os canais `*CPU Energy` (um por die em topologias
/// multi-die); GPU usa apenas `GPU Energy`.
pub fn summarize(readings: &[ChannelReading], elapsed: Duration, table: &[u32]) -> PowerSample {
    let mut out = PowerSample::default();

    for ch in readings {
        if ch.group == ENERGY_GROUP {
            if ch.name.contains("CPU Energy") {
                out.cpu_watts += energy_to_watts(ch.value, &ch.unit, elapsed);
            } else if ch.name == "GPU Energy" {
                out.gpu_watts += energy_to_watts(ch.value, &ch.unit, elapsed);
            }
        } else if ch.group == GPU_STATS_GROUP && ch.name == GPU_RESIDENCY_CHANNEL {
            let (freq, load) = residency_frequency(&ch.states, table);
            out.gpu_freq_mhz = freq;
            out.gpu_load = load;
        }
    }
    out
}

struct PreviousSample<S> {
    sample: S,
    taken_at: Instant,
}

struct Active<C: CounterTelemetry> {
    channels: C::Channels,
    subscription: C::Subscription,
    previous: Option<PreviousSample<C::Sample>>,
}

enum SamplerState<C: CounterTelemetry> {
    Uninitialized,
    Active(Active<C>),
}

/// Amostrador de potência/frequência. Dono exclusivo da assinatura.
pub struct DeltaSampler<C: CounterTelemetry> {
    provider: C,
    state: SamplerState<C>,
    freq_table: OnceCell<Vec<u32>>,
}

impl<C: CounterTelemetry> DeltaSampler<C> {
    pub fn new(provider: C) -> Self {
        Self {
            provider,
            state: SamplerState::Uninitialized,
            freq_table: OnceCell::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SamplerState::Active(_))
    }

    /// Abre os grupos de energia e de residência da GPU e cria a assinatura.
    ///
    /// Basta um dos grupos existir. Chamadas após o sucesso não fazem nada.
    pub fn initialize(&mut self) -> Result<(), SamplerError> {
        if self.is_active() {
            return Ok(());
        }

        let energy = self.provider.channels_in_group(ENERGY_GROUP, None);
        let gpu = self
            .provider
            .channels_in_group(GPU_STATS_GROUP, Some(GPU_PERF_SUBGROUP));

        let channels = match (energy, gpu) {
            (Some(energy), Some(gpu)) => self.provider.merge(energy, gpu),
            (Some(energy), None) => energy,
            (None, Some(gpu)) => gpu,
            (None, None) => return Err(SamplerError::NoChannels),
        };

        let subscription = self
            .provider
            .subscribe(&channels)
            .ok_or(SamplerError::Subscription)?;

        let table = self.frequency_table();
        debug!("Tabela de frequências da GPU: {} estados", table.len());

        self.state = SamplerState::Active(Active {
            channels,
            subscription,
            previous: None,
        });
        Ok(())
    }

    /// Frequências da GPU (MHz), carregadas na primeira chamada.
    pub fn frequency_table(&self) -> &[u32] {
        self.freq_table.get_or_init(|| {
            self.provider
                .frequency_table_blob()
                .map(|blob| parse_frequency_table(&blob))
                .unwrap_or_default()
        })
    }

    /// Tira uma nova amostra agora.
    pub fn sample(&mut self) -> Option<PowerSample> {
        self.sample_at(Instant::now())
    }

    /// Tira uma nova amostra tratada como ocorrida em `now`.
    ///
    /// Retorna `None` sem amostra anterior (baseline) ou se o provedor não
    /// entregar amostra. A nova amostra sempre substitui a anterior.
    pub fn sample_at(&mut self, now: Instant) -> Option<PowerSample> {
        let Self {
            provider,
            state,
            freq_table,
        } = self;
        let SamplerState::Active(active) = state else {
            return None;
        };

        let current = provider.sample(&active.subscription, &active.channels)?;

        let result = active.previous.as_ref().map(|prev| {
            let elapsed = now.saturating_duration_since(prev.taken_at).max(MIN_ELAPSED);
            let readings = provider.delta(&prev.sample, &current);
            let table = freq_table.get().map(Vec::as_slice).unwrap_or(&[]);
            summarize(&readings, elapsed, table)
        });

        active.previous = Some(PreviousSample {
            sample: current,
            taken_at: now,
        });
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// IOReport em memória: cada `sample()` consome a próxima lista de canais
    /// cumulativos; `delta()` subtrai campo a campo.
    #[derive(Default)]
    pub(crate) struct MockCounters {
        pub energy: bool,
        pub gpu: bool,
        pub refuse_subscription: bool,
        pub blob: Option<Vec<u8>>,
        pub samples: RefCell<VecDeque<Vec<ChannelReading>>>,
    }

    impl MockCounters {
        pub fn available() -> Self {
            Self {
                energy: true,
                gpu: true,
                ..Default::default()
            }
        }

        pub fn push(&self, sample: Vec<ChannelReading>) {
            self.samples.borrow_mut().push_back(sample);
        }
    }

    impl CounterTelemetry for MockCounters {
        type Channels = Vec<&'static str>;
        type Subscription = ();
        type Sample = Vec<ChannelReading>;

        fn channels_in_group(&self, group: &str, _subgroup: Option<&str>) -> Option<Self::Channels> {
            match group {
                ENERGY_GROUP if self.energy => Some(vec![ENERGY_GROUP]),
                GPU_STATS_GROUP if self.gpu => Some(vec![GPU_STATS_GROUP]),
                _ => None,
            }
        }

        fn merge(&self, mut base: Self::Channels, extra: Self::Channels) -> Self::Channels {
            base.extend(extra);
            base
        }

        fn subscribe(&self, _channels: &Self::Channels) -> Option<()> {
            (!self.refuse_subscription).then_some(())
        }

        fn sample(&self, _sub: &(), _channels: &Self::Channels) -> Option<Self::Sample> {
            self.samples.borrow_mut().pop_front()
        }

        fn delta(&self, previous: &Self::Sample, current: &Self::Sample) -> Vec<ChannelReading> {
            current
                .iter()
                .zip(previous)
                .map(|(cur, prev)| ChannelReading {
                    value: cur.value - prev.value,
                    states: cur
                        .states
                        .iter()
                        .zip(&prev.states)
                        .map(|(c, p)| StateResidency {
                            name: c.name.clone(),
                            residency: c.residency - p.residency,
                        })
                        .collect(),
                    ..cur.clone()
                })
                .collect()
        }

        fn frequency_table_blob(&self) -> Option<Vec<u8>> {
            self.blob.clone()
        }
    }

    pub(crate) fn energy(name: &str, unit: &str, value: i64) -> ChannelReading {
        ChannelReading {
            group: ENERGY_GROUP.into(),
            name: name.into(),
            unit: unit.into(),
            value,
            ..Default::default()
        }
    }

    fn residency(values: &[(&str, i64)]) -> ChannelReading {
        ChannelReading {
            group: GPU_STATS_GROUP.into(),
            subgroup: GPU_PERF_SUBGROUP.into(),
            name: GPU_RESIDENCY_CHANNEL.into(),
            states: values
                .iter()
                .map(|(n, r)| StateResidency {
                    name: Some((*n).into()),
                    residency: *r,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn blob(freqs_hz: &[u32]) -> Vec<u8> {
        freqs_hz
            .iter()
            .flat_map(|f| f.to_le_bytes().into_iter().chain(800_000u32.to_le_bytes()))
            .collect()
    }

    #[test]
    fn initialize_fails_without_any_group() {
        let mut sampler = DeltaSampler::new(MockCounters::default());
        assert!(matches!(sampler.initialize(), Err(SamplerError::NoChannels)));
        assert!(!sampler.is_active());
        assert_eq!(sampler.sample(), None);
    }

    #[test]
    fn partial_groups_are_accepted() {
        let mut sampler = DeltaSampler::new(MockCounters {
            gpu: true,
            ..Default::default()
        });
        assert!(sampler.initialize().is_ok());
        assert!(sampler.is_active());
    }

    #[test]
    fn subscription_failure_leaves_uninitialized() {
        let mut sampler = DeltaSampler::new(MockCounters {
            refuse_subscription: true,
            ..MockCounters::available()
        });
        assert!(matches!(sampler.initialize(), Err(SamplerError::Subscription)));
        assert!(!sampler.is_active());
    }

    #[test]
    fn first_sample_is_baseline_second_yields_power() {
        let provider = MockCounters::available();
        provider.push(vec![energy("CPU Energy", "nJ", 0)]);
        provider.push(vec![energy("CPU Energy", "nJ", 5_000_000)]);
        let mut sampler = DeltaSampler::new(provider);
        sampler.initialize().unwrap();

        let t0 = Instant::now();
        assert_eq!(sampler.sample_at(t0), None);

        let power = sampler.sample_at(t0 + Duration::from_secs(1)).unwrap();
        assert!((power.cpu_watts - 0.005).abs() < 1e-6);
        assert_eq!(power.gpu_watts, 0.0);
    }

    #[test]
    fn elapsed_is_floored_at_ten_ms() {
        let provider = MockCounters::available();
        provider.push(vec![energy("GPU Energy", "mJ", 0)]);
        provider.push(vec![energy("GPU Energy", "mJ", 10)]);
        let mut sampler = DeltaSampler::new(provider);
        sampler.initialize().unwrap();

        let t0 = Instant::now();
        sampler.sample_at(t0);
        let power = sampler.sample_at(t0 + Duration::from_millis(2)).unwrap();
        // 10 mJ / 10 ms = 1 W (com 2 ms seriam 5 W)
        assert!((power.gpu_watts - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cpu_energy_sums_dies() {
        let readings = vec![
            energy("DIE_0_CPU Energy", "uJ", 2_000_000),
            energy("DIE_1_CPU Energy", "uJ", 3_000_000),
            energy("GPU Energy", "uJ", 1_000_000),
            energy("ANE Energy", "uJ", 9_000_000),
        ];
        let p = summarize(&readings, Duration::from_secs(1), &[]);
        assert!((p.cpu_watts - 5.0).abs() < 1e-5);
        assert!((p.gpu_watts - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unknown_unit_is_zero() {
        assert_eq!(energy_to_watts(1000, "J", Duration::from_secs(1)), 0.0);
        assert_eq!(energy_to_watts(1000, "mJ", Duration::ZERO), 0.0);
    }

    #[test]
    fn residency_weighted_frequency() {
        let ch = residency(&[("OFF", 50), ("P1", 30), ("P2", 20)]);
        let (freq, load) = residency_frequency(&ch.states, &[400, 900]);
        // (30×400 + 20×900) / 50 = 600
        assert_eq!(freq, 600.0);
        assert_eq!(load, 50.0);
    }

    #[test]
    fn missing_table_keeps_load() {
        let ch = residency(&[("IDLE", 75), ("P1", 25)]);
        assert_eq!(residency_frequency(&ch.states, &[]), (0.0, 25.0));
    }

    #[test]
    fn all_idle_keeps_offset_zero() {
        let ch = residency(&[("IDLE", 10), ("OFF", 10)]);
        let (_, load) = residency_frequency(&ch.states, &[100]);
        assert_eq!(load, 100.0);
    }

    #[test]
    fn frequency_table_from_blob() {
        let table = parse_frequency_table(&blob(&[0, 396_000_000, 1_398_000_000]));
        assert_eq!(table, vec![396, 1398]);
        // Registro incompleto no final é ignorado
        let mut partial = blob(&[720_000_000]);
        partial.extend_from_slice(&[1, 2, 3]);
        assert_eq!(parse_frequency_table(&partial), vec![720]);
    }

    #[test]
    fn gpu_frequency_through_sampler() {
        let provider = MockCounters {
            blob: Some(blob(&[400_000_000, 900_000_000])),
            ..MockCounters::available()
        };
        provider.push(vec![residency(&[("OFF", 0), ("P1", 0), ("P2", 0)])]);
        provider.push(vec![residency(&[("OFF", 50), ("P1", 30), ("P2", 20)])]);
        let mut sampler = DeltaSampler::new(provider);
        sampler.initialize().unwrap();
        assert_eq!(sampler.frequency_table(), &[400, 900]);

        let t0 = Instant::now();
        sampler.sample_at(t0);
        let p = sampler.sample_at(t0 + Duration::from_millis(500)).unwrap();
        assert_eq!(p.gpu_freq_mhz, 600.0);
        assert_eq!(p.gpu_load, 50.0);
    }
}
