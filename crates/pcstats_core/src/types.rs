//! Snapshot enviado ao display.
//!
//! Os nomes dos campos seguem o JSON esperado pelo dispositivo (camelCase).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminador fixo do comando "PC status".
pub const CMD_PC_STATUS: u32 = 1230;

/// Limite térmico reportado para CPU e GPU (°C).
pub const TEMP_MAX: f32 = 100.0;
pub const TJ_MAX: i32 = 100;

// ──────────────────────────────────────────────
// Placa
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BoardStats {
    /// Temperatura média dos sensores da placa (°C)
    pub temp: f32,
    /// Primeira ventoinha populada (RPM)
    pub rpm: f32,
    /// Uptime do engine (s)
    pub tick: i32,
}

// ──────────────────────────────────────────────
// CPU
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub temp: f32,
    pub temp_max: f32,
    /// Carga (0–100%)
    pub load: f32,
    /// Potência (W)
    pub consume: f32,
    pub tj_max: i32,
    pub core1_distance_to_tj_max: f32,
    pub core1_temp: f32,
}

// ──────────────────────────────────────────────
// GPU
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GpuStats {
    pub temp: f32,
    pub temp_max: f32,
    /// Residência ativa (0–100%)
    pub load: f32,
    /// Potência (W)
    pub consume: f32,
    /// Segunda ventoinha populada (RPM)
    pub rpm: f32,
    pub mem_used: f32,
    pub mem_total: f32,
    /// Frequência média ponderada (MHz)
    pub freq: f32,
}

// ──────────────────────────────────────────────
// Armazenamento, memória e rede
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageStats {
    pub temp: f32,
    pub read: f32,
    pub write: f32,
    /// Espaço usado do ponto de montagem (%)
    pub percent: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryStats {
    /// GB
    pub used: f32,
    /// GB
    pub avail: f32,
    pub percent: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkStats {
    /// Mb/s
    pub up: f32,
    /// Mb/s
    pub down: f32,
}

// ──────────────────────────────────────────────
// Snapshot
// ──────────────────────────────────────────────

/// Um tick de coleta. Imutável depois de montado.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    pub board: BoardStats,
    pub cpu: CpuStats,
    pub gpu: GpuStats,
    pub storage: StorageStats,
    pub memory: MemoryStats,
    pub network: NetworkStats,
    pub cmd: u32,
    /// Hora local apresentada como se fosse UTC (segundos)
    pub time: i64,
}

impl Default for StatsSnapshot {
    fn default() -> Self {
        Self {
            board: BoardStats::default(),
            cpu: CpuStats {
                temp_max: TEMP_MAX,
                tj_max: TJ_MAX,
                core1_distance_to_tj_max: TJ_MAX as f32,
                ..Default::default()
            },
            gpu: GpuStats {
                temp_max: TEMP_MAX,
                ..Default::default()
            },
            storage: StorageStats::default(),
            memory: MemoryStats::default(),
            network: NetworkStats::default(),
            cmd: CMD_PC_STATUS,
            time: 0,
        }
    }
}

/// Resumo legível para o console.
impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cpu = &self.cpu;
        write!(f, "CPU:     {:.1}%", cpu.load)?;
        if cpu.temp > 0.0 {
            write!(f, "  Temp: {:.1}°C", cpu.temp)?;
        }
        if cpu.consume > 0.0 {
            write!(f, "  Power: {:.1}W", cpu.consume)?;
        }
        writeln!(f)?;

        let gpu = &self.gpu;
        if gpu.temp > 0.0 || gpu.load > 0.0 || gpu.consume > 0.0 {
            write!(f, "GPU:     {:.1}%", gpu.load)?;
            if gpu.temp > 0.0 {
                write!(f, "  Temp: {:.1}°C", gpu.temp)?;
            }
            if gpu.consume > 0.0 {
                write!(f, "  Power: {:.1}W", gpu.consume)?;
            }
            if gpu.freq > 0.0 {
                write!(f, "  Freq: {:.0} MHz", gpu.freq)?;
            }
            if gpu.rpm > 0.0 {
                write!(f, "  Fan: {:.0} RPM", gpu.rpm)?;
            }
            writeln!(f)?;
        }

        let board = &self.board;
        if board.temp > 0.0 || board.rpm > 0.0 {
            write!(f, "Board:  ")?;
            if board.temp > 0.0 {
                write!(f, " Temp: {:.1}°C", board.temp)?;
            }
            if board.rpm > 0.0 {
                write!(f, "  Fan: {:.0} RPM", board.rpm)?;
            }
            writeln!(f)?;
        }

        writeln!(
            f,
            "Memory:  {:.1}% ({:.1} GB used / {:.1} GB free)",
            self.memory.percent, self.memory.used, self.memory.avail
        )?;
        writeln!(f, "Disk:    {:.1}% used", self.storage.percent)?;
        writeln!(
            f,
            "Network: down {:.1} Mb/s  up {:.1} Mb/s",
            self.network.down, self.network.up
        )?;

        let tick = board.tick.max(0);
        writeln!(
            f,
            "Uptime:  {:02}:{:02}:{:02}",
            tick / 3600,
            (tick % 3600) / 60,
            tick % 60
        )?;
        write!(f, "Time:    {}", self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_carries_device_constants() {
        let s = StatsSnapshot::default();
        assert_eq!(s.cmd, 1230);
        assert_eq!(s.cpu.tj_max, 100);
        assert_eq!(s.cpu.temp_max, 100.0);
        assert_eq!(s.gpu.temp_max, 100.0);
    }

    #[test]
    fn summary_hides_absent_sections() {
        let mut s = StatsSnapshot::default();
        s.cpu.load = 12.34;
        s.board.tick = 3_725;
        let text = s.to_string();
        assert!(text.starts_with("CPU:     12.3%\n"));
        assert!(!text.contains("GPU:"));
        assert!(!text.contains("Board:"));
        assert!(text.contains("Uptime:  01:02:05"));
    }

    #[test]
    fn summary_shows_gpu_and_board_when_present() {
        let mut s = StatsSnapshot::default();
        s.cpu.temp = 48.0;
        s.cpu.consume = 3.26;
        s.gpu.load = 40.0;
        s.gpu.freq = 912.4;
        s.board.rpm = 1200.0;
        let text = s.to_string();
        assert!(text.contains("CPU:     0.0%  Temp: 48.0°C  Power: 3.3W"));
        assert!(text.contains("GPU:     40.0%  Freq: 912 MHz"));
        assert!(text.contains("Board:    Fan: 1200 RPM"));
    }
}
