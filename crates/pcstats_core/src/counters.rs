//! Contadores do sistema operacional: CPU, memória, rede e disco.
//!
//! - Ticks de CPU: `/proc/stat` (Linux) ou `host_statistics` (macOS)
//! - `sysinfo` — memória, bytes de rede, espaço em disco
//!
//! Contadores cumulativos (ticks, bytes) viram taxa pelo delta contra a
//! chamada anterior, com o mesmo piso de 10 ms do amostrador de potência.

use crate::power::MIN_ELAPSED;
use std::time::Instant;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};
use tracing::debug;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

// ──────────────────────────────────────────────
// Leituras pontuais
// ──────────────────────────────────────────────

/// Ticks agregados de todas as CPUs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub total: u64,
    pub idle: u64,
}

/// Memória em GiB.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryReading {
    pub used_gb: f32,
    pub avail_gb: f32,
    pub percent: f32,
}

/// Bytes acumulados nas interfaces (sem loopback).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkBytes {
    pub received: u64,
    pub transmitted: u64,
}

/// Fonte das leituras pontuais do SO.
pub trait OsCounters {
    /// Ticks de CPU, ou `None` se a plataforma não os expõe.
    fn cpu_ticks(&mut self) -> Option<CpuTicks>;

    /// Uso de CPU calculado pela própria fonte (usado sem ticks).
    fn cpu_usage_hint(&mut self) -> f32;

    fn memory(&mut self) -> MemoryReading;

    fn network_bytes(&mut self) -> NetworkBytes;

    /// Percentual usado do ponto de montagem.
    fn disk_usage_percent(&mut self, mount: &str) -> f32;
}

// ──────────────────────────────────────────────
// Medidores por delta
// ──────────────────────────────────────────────

/// Carga de CPU pelo delta idle/total entre chamadas.
#[derive(Debug, Default)]
pub struct CpuLoadMeter {
    previous: Option<CpuTicks>,
}

impl CpuLoadMeter {
    /// Atualiza com uma nova leitura e devolve a carga (%).
    ///
    /// A primeira leitura compara contra zero, como um contador desde o boot.
    pub fn update(&mut self, ticks: CpuTicks) -> f32 {
        let prev = self.previous.replace(ticks).unwrap_or_default();
        let total = ticks.total.saturating_sub(prev.total);
        let idle = ticks.idle.saturating_sub(prev.idle);
        if total == 0 {
            return 0.0;
        }
        ((1.0 - idle as f64 / total as f64) * 100.0) as f32
    }
}

/// Vazão de rede em Mb/s pelo delta de bytes.
#[derive(Debug, Default)]
pub struct NetworkMeter {
    previous: Option<(NetworkBytes, Instant)>,
}

impl NetworkMeter {
    /// Retorna `(up, down)` em Mb/s. A primeira chamada só cria o baseline.
    pub fn update(&mut self, bytes: NetworkBytes, now: Instant) -> (f32, f32) {
        let rates = match self.previous {
            Some((prev, at)) => {
                let dt = now.saturating_duration_since(at).max(MIN_ELAPSED).as_secs_f64();
                let up = bytes.transmitted.saturating_sub(prev.transmitted) as f64;
                let down = bytes.received.saturating_sub(prev.received) as f64;
                (to_mbps(up, dt), to_mbps(down, dt))
            }
            None => (0.0, 0.0),
        };
        self.previous = Some((bytes, now));
        rates
    }
}

/// bytes/s → megabits/s (`bytes × 8 / 1_000_000`).
fn to_mbps(bytes: f64, secs: f64) -> f32 {
    (bytes / secs * 8.0 / 1_000_000.0) as f32
}

// ──────────────────────────────────────────────
// Ticks nativos
// ──────────────────────────────────────────────

/// Interpreta a linha agregada `cpu ` do `/proc/stat`.
///
/// total = user + nice + system + idle + iowait + irq + softirq + steal;
/// idle inclui iowait.
pub fn parse_proc_stat(content: &str) -> Option<CpuTicks> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse().unwrap_or(0))
        .collect();
    if fields.len() < 4 {
        return None;
    }
    let total = fields.iter().take(8).sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTicks { total, idle })
}

#[cfg(target_os = "linux")]
fn native_cpu_ticks() -> Option<CpuTicks> {
    std::fs::read_to_string("/proc/stat")
        .ok()
        .and_then(|content| parse_proc_stat(&content))
}

#[cfg(target_os = "macos")]
fn native_cpu_ticks() -> Option<CpuTicks> {
    crate::platform::macos::host_cpu_ticks()
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn native_cpu_ticks() -> Option<CpuTicks> {
    None
}

// ──────────────────────────────────────────────
// Implementação com sysinfo
// ──────────────────────────────────────────────

/// Contadores do SO via `sysinfo` + ticks nativos.
pub struct SysinfoCounters {
    sys: System,
    networks: Networks,
    disks: Disks,
}

impl SysinfoCounters {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            sys,
            networks: Networks::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl OsCounters for SysinfoCounters {
    fn cpu_ticks(&mut self) -> Option<CpuTicks> {
        native_cpu_ticks()
    }

    fn cpu_usage_hint(&mut self) -> f32 {
        self.sys.refresh_cpu_all();
        self.sys.global_cpu_usage()
    }

    fn memory(&mut self) -> MemoryReading {
        self.sys.refresh_memory();
        let total = self.sys.total_memory() as f64;
        let used = self.sys.used_memory() as f64;
        let avail = self.sys.available_memory() as f64;
        MemoryReading {
            used_gb: (used / GIB) as f32,
            avail_gb: (avail / GIB) as f32,
            percent: if total > 0.0 {
                (used / total * 100.0) as f32
            } else {
                0.0
            },
        }
    }

    fn network_bytes(&mut self) -> NetworkBytes {
        self.networks.refresh(true);
        let mut bytes = NetworkBytes::default();
        for (name, data) in self.networks.iter() {
            if is_loopback(name) {
                continue;
            }
            bytes.received += data.total_received();
            bytes.transmitted += data.total_transmitted();
        }
        bytes
    }

    fn disk_usage_percent(&mut self, mount: &str) -> f32 {
        self.disks.refresh(true);
        let Some(disk) = self
            .disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new(mount))
        else {
            debug!("Ponto de montagem {mount} não encontrado");
            return 0.0;
        };
        let total = disk.total_space() as f64;
        let used = total - disk.available_space() as f64;
        if total > 0.0 {
            (used / total * 100.0) as f32
        } else {
            0.0
        }
    }
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name == "Loopback Pseudo-Interface 1"
}
