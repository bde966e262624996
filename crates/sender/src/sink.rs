//! Destino dos frames: dispositivo, UDP ou stdout.

use pcstats_core::{SenderConfig, SinkKind};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::UdpSocket;

/// Stream de bytes que recebe os frames.
pub enum Sink {
    /// Porta serial (ou qualquer caminho gravável)
    Device { file: File, path: String },
    Udp { socket: UdpSocket, dest: String },
    Stdout(io::Stdout),
}

impl Sink {
    /// Abre o destino configurado.
    pub fn open(cfg: &SenderConfig) -> io::Result<Self> {
        match cfg.sink_kind() {
            Some(SinkKind::Serial) => {
                let file = OpenOptions::new().write(true).open(&cfg.device)?;
                Ok(Self::Device {
                    file,
                    path: cfg.device.clone(),
                })
            }
            Some(SinkKind::Udp) => {
                let socket = UdpSocket::bind("0.0.0.0:0")?;
                Ok(Self::Udp {
                    socket,
                    dest: format!("{}:{}", cfg.dest_ip, cfg.port),
                })
            }
            Some(SinkKind::Stdout) => Ok(Self::Stdout(io::stdout())),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sink desconhecido: {}", cfg.sink),
            )),
        }
    }

    /// Escreve um frame inteiro.
    pub fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        match self {
            Self::Device { file, .. } => {
                file.write_all(frame)?;
                file.flush()
            }
            Self::Udp { socket, dest } => {
                let sent = socket.send_to(frame, dest.as_str())?;
                if sent != frame.len() {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("datagrama parcial: {sent}/{} bytes", frame.len()),
                    ));
                }
                Ok(())
            }
            Self::Stdout(out) => {
                let mut lock = out.lock();
                lock.write_all(frame)?;
                lock.flush()
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Device { path, .. } => path.clone(),
            Self::Udp { dest, .. } => format!("udp://{dest}"),
            Self::Stdout(_) => "stdout".into(),
        }
    }
}
