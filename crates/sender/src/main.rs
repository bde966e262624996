//! # PC Stats Sender
//!
//! Coleta métricas de hardware e envia frames `pcs` para o display.
//! Temperaturas, potência e frequência exigem opt-in (`-t` ou
//! `telemetry.enabled = true`).
//!
//! ## Uso
//! ```bash
//! pcstats_sender                         # Sink do config.toml
//! pcstats_sender -t --device /dev/cu.usbmodem1101
//! pcstats_sender --once -t               # Imprime um resumo e sai
//! ```

mod collector;
mod sink;

use clap::Parser;
use pcstats_core::config::AppConfig;
use pcstats_core::engine::{InitReport, ProviderStatus};
use pcstats_core::platform;
use pcstats_core::protocol::{HEADER_SIZE, encode};
use sink::Sink;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pcstats_sender", version, about = "Envia estatísticas do PC para o display")]
struct Cli {
    /// Caminho do config.toml (padrão: ao lado do executável)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Liga temperaturas, potência e frequência
    #[arg(short, long)]
    telemetry: bool,

    /// Coleta dois ticks, imprime o resumo e sai
    #[arg(long)]
    once: bool,

    /// Sobrescreve o sink: serial, udp ou stdout
    #[arg(long)]
    sink: Option<String>,

    /// Sobrescreve o dispositivo do sink serial
    #[arg(long)]
    device: Option<String>,
}

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // ── Carregar config ──
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    if let Some(sink) = cli.sink {
        config.sender.sink = sink;
    }
    if let Some(device) = cli.device {
        config.sender.device = device;
    }
    if cli.telemetry {
        config.telemetry.enabled = true;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config inválida: {e}");
        }
        std::process::exit(2);
    }

    let interval = Duration::from_secs_f64(config.sender.interval_secs);
    let disk_mount = config.telemetry.disk_mount.clone();

    // ── Thread de coleta ──
    let rx = match collector::spawn_collector(interval, config.telemetry.enabled, move || {
        let (engine, report) = platform::native(&disk_mount);
        log_init_report(&report);
        engine
    }) {
        Ok(rx) => rx,
        Err(e) => {
            error!("Falha ao criar thread de coleta: {e}");
            std::process::exit(1);
        }
    };

    if cli.once {
        // O primeiro snapshot ainda traz potência do baseline; o segundo já tem taxa.
        match rx.iter().nth(1) {
            Some(snapshot) => println!("{snapshot}"),
            None => error!("Coleta encerrada antes do segundo tick"),
        }
        return;
    }

    // ── Sink ──
    let mut sink = match Sink::open(&config.sender) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Falha ao abrir sink \"{}\": {e}", config.sender.sink);
            std::process::exit(1);
        }
    };
    let quiet = matches!(sink, Sink::Stdout(_));

    // ── Banner ──
    if !quiet {
        println!();
        println!("══════════════════════════════════════════════");
        println!("   PC STATS SENDER – ATIVO");
        println!("══════════════════════════════════════════════");
        println!("  Destino:   {}", sink.describe());
        println!("  Intervalo: {:.1}s", config.sender.interval_secs);
        println!("  Telemetria: {}", if config.telemetry.enabled { "ligada" } else { "desligada" });
        println!("══════════════════════════════════════════════");
        println!();
    }

    // ── Loop principal ──
    for snapshot in rx.iter() {
        let frame = match encode(&snapshot) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Erro ao codificar snapshot: {e}");
                continue;
            }
        };

        match sink.write_frame(&frame) {
            Ok(()) => {
                info!(
                    "→ {} bytes para {} | CPU {:.1}% {:.0}°C {:.1}W | GPU {:.1}% {:.0}°C | RAM {:.0}%",
                    frame.len() - HEADER_SIZE,
                    sink.describe(),
                    snapshot.cpu.load,
                    snapshot.cpu.temp,
                    snapshot.cpu.consume,
                    snapshot.gpu.load,
                    snapshot.gpu.temp,
                    snapshot.memory.percent
                );
            }
            Err(e) => error!("Erro ao escrever em {}: {e}", sink.describe()),
        }
    }

    warn!("Thread de coleta encerrada");
}

fn log_init_report(report: &InitReport) {
    log_status("SMC", &report.sensors);
    log_status("Sensores HID", &report.thermal_fallback);
    log_status("IOReport", &report.counters);
}

fn log_status(name: &str, status: &ProviderStatus) {
    match status {
        ProviderStatus::Available => info!("✓ {name}: disponível"),
        ProviderStatus::Unavailable(reason) => warn!("✗ {name}: {reason}"),
    }
}
