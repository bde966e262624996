//! Configuração via TOML.
//!
//! Um único `config.toml` ao lado do executável, com seções `[sender]` e
//! `[telemetry]`. Arquivos parciais funcionam: campos ausentes usam o padrão.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Destino dos frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Caminho de dispositivo (porta serial) aberto para escrita
    Serial,
    Udp,
    Stdout,
}

impl SinkKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "serial" => Some(Self::Serial),
            "udp" => Some(Self::Udp),
            "stdout" => Some(Self::Stdout),
            _ => None,
        }
    }
}

/// Configuração do envio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// "serial", "udp" ou "stdout"
    pub sink: String,
    /// Dispositivo do display (sink serial)
    pub device: String,
    /// IP de destino (sink UDP)
    pub dest_ip: String,
    /// Porta UDP
    pub port: u16,
    /// Intervalo entre ticks em segundos
    pub interval_secs: f64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            sink: "serial".into(),
            device: "/dev/cu.usbmodem0001".into(),
            dest_ip: "127.0.0.1".into(),
            port: 5005,
            interval_secs: 1.0,
        }
    }
}

impl SenderConfig {
    pub fn sink_kind(&self) -> Option<SinkKind> {
        SinkKind::parse(&self.sink)
    }
}

/// Coleta de sensores (temperaturas, potência, frequência).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Desligado por padrão: exige opt-in explícito
    pub enabled: bool,
    /// Ponto de montagem usado no percentual de disco
    pub disk_mount: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            disk_mount: "/".into(),
        }
    }
}

/// Erros ao salvar a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro de I/O em {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Configuração raiz.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sender: SenderConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML. Nunca falha: usa o padrão.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let sender = &self.sender;

        if !(0.1..=60.0).contains(&sender.interval_secs) {
            errors.push(format!(
                "Intervalo do sender inválido: {} (0.1–60.0)",
                sender.interval_secs
            ));
        }
        match sender.sink_kind() {
            Some(SinkKind::Udp) if sender.port == 0 => {
                errors.push("Porta UDP não pode ser 0".into());
            }
            Some(SinkKind::Serial) if sender.device.trim().is_empty() => {
                errors.push("Dispositivo serial não configurado".into());
            }
            Some(_) => {}
            None => errors.push(format!(
                "Sink desconhecido: \"{}\" (serial, udp, stdout)",
                sender.sink
            )),
        }
        if self.telemetry.disk_mount.trim().is_empty() {
            errors.push("Ponto de montagem do disco vazio".into());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[sender]
sink = "udp"
port = 9999
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.sender.port, 9999);
        assert_eq!(config.sender.sink_kind(), Some(SinkKind::Udp));
        // Outros campos devem ter valor padrão
        assert_eq!(config.sender.interval_secs, 1.0);
        assert_eq!(config.telemetry.disk_mount, "/");
    }

    #[test]
    fn validate_reports_each_problem() {
        let mut config = AppConfig::default();
        config.sender.interval_secs = 0.05;
        config.sender.device = "  ".into();
        config.telemetry.disk_mount = String::new();
        assert_eq!(config.validate().len(), 3);

        config = AppConfig::default();
        config.sender.sink = "udp".into();
        config.sender.port = 0;
        assert_eq!(config.validate(), vec!["Porta UDP não pode ser 0".to_string()]);

        config.sender.sink = "bluetooth".into();
        assert!(config.validate()[0].contains("bluetooth"));
    }

    #[test]
    fn non_finite_interval_is_rejected() {
        let config: AppConfig = toml::from_str("[sender]\ninterval_secs = nan").unwrap();
        assert!(config.sender.interval_secs.is_nan());
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Intervalo"));

        let mut config = AppConfig::default();
        config.sender.interval_secs = f64::INFINITY;
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.sender.sink = "stdout".into();
        config.telemetry.enabled = true;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path);
        assert_eq!(loaded.sender.sink, "stdout");
        assert!(loaded.telemetry.enabled);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sender\nport = ").unwrap();
        let config = AppConfig::load(&path);
        assert_eq!(config.sender.port, 5005);
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nao_existe").join("config.toml");
        assert!(matches!(
            AppConfig::default().save(&path),
            Err(ConfigError::Io { .. })
        ));
    }
}
