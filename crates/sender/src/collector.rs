//! Thread de coleta: dona exclusiva do engine.
//!
//! O engine guarda handles nativos que não atravessam threads, então ele é
//! construído dentro da própria thread a partir de uma closure.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use pcstats_core::StatsSnapshot;
use pcstats_core::engine::TelemetryEngine;
use pcstats_core::power::CounterTelemetry;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Snapshots pendentes antes de começar a descartar.
const CHANNEL_CAPACITY: usize = 4;

/// Inicia a thread `stats-collector`. Retorna o receiver dos snapshots.
///
/// `build` roda já dentro da thread. A thread termina quando o receiver é
/// descartado.
pub fn spawn_collector<F, C>(
    interval: Duration,
    telemetry: bool,
    build: F,
) -> std::io::Result<Receiver<StatsSnapshot>>
where
    F: FnOnce() -> TelemetryEngine<C> + Send + 'static,
    C: CounterTelemetry,
{
    let (tx, rx) = bounded::<StatsSnapshot>(CHANNEL_CAPACITY);

    std::thread::Builder::new()
        .name("stats-collector".into())
        .spawn(move || {
            let mut engine = build();
            if telemetry {
                match engine.enable_telemetry() {
                    Ok(()) => info!("Telemetria ligada (temperaturas, potência, frequência)"),
                    Err(e) => warn!("Potência/frequência indisponíveis: {e}"),
                }
            }
            collector_loop(&mut engine, &tx, interval);
        })?;

    Ok(rx)
}

fn collector_loop<C: CounterTelemetry>(
    engine: &mut TelemetryEngine<C>,
    tx: &Sender<StatsSnapshot>,
    interval: Duration,
) {
    // Os baselines foram gravados agora; a primeira taxa precisa de um intervalo.
    std::thread::sleep(interval);

    loop {
        let cycle_start = Instant::now();

        let snapshot = engine.collect();
        // Non-blocking send: se o consumidor está lento, descarta o snapshot
        match tx.try_send(snapshot) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Channel cheio, descartando snapshot"),
            Err(TrySendError::Disconnected(_)) => {
                info!("Consumidor encerrado, parando coleta");
                return;
            }
        }

        // Dormir pelo tempo restante do intervalo
        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcstats_core::counters::SysinfoCounters;
    use pcstats_core::platform::Unsupported;
    use pcstats_core::power::DeltaSampler;
    use pcstats_core::registry::KeyRegistry;
    use pcstats_core::thermal::TemperatureAggregator;

    fn portable_engine() -> TelemetryEngine<Unsupported> {
        TelemetryEngine::new(
            TemperatureAggregator::new(KeyRegistry::unavailable(), None),
            DeltaSampler::new(Unsupported),
            Box::new(SysinfoCounters::new()),
            "/",
        )
    }

    #[test]
    fn delivers_snapshots_on_interval() {
        let rx = spawn_collector(Duration::from_millis(20), true, portable_engine).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.cmd, 1230);
        assert_eq!(second.cpu.temp, 0.0);
        assert!(second.board.tick >= first.board.tick);
    }

    #[test]
    fn stops_when_receiver_is_dropped() {
        let rx = spawn_collector(Duration::from_millis(10), false, portable_engine).unwrap();
        let _ = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(rx);
        // A thread sai sozinha no próximo try_send; nada a observar além de não travar.
        std::thread::sleep(Duration::from_millis(50));
    }
}
