use serde::Deserialize;
use std::{fs, path::PathBuf};
use time::{macros::format_description, UtcOffset};

const DEFAULT_CONFIG_PATH: &str = "meter-config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    JsonFile,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub capacity: usize,
    /// Data file for `json_file`.
    pub path: PathBuf,
    /// Connection URL for `sqlite`.
    pub sqlite_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::JsonFile,
            capacity: 10_000,
            path: PathBuf::from("dados.json"),
            sqlite_url: "sqlite://multimedidor.db".to_string(),
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Offset used for hour-of-day and calendar-date grouping, `+HH:MM`.
    pub utc_offset: String,
    pub latest_limit: usize,
    pub history_default_limit: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            utc_offset: "-03:00".to_string(),
            latest_limit: 10,
            history_default_limit: 100,
        }
    }
}

impl DashboardConfig {
    pub fn offset(&self) -> anyhow::Result<UtcOffset> {
        UtcOffset::parse(
            self.utc_offset.trim(),
            format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
        )
        .map_err(|e| anyhow::anyhow!("invalid dashboard.utc_offset '{}': {e}", self.utc_offset))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub full_limit: usize,
    pub summary_limit: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            full_limit: 10_000,
            summary_limit: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub dashboard: DashboardConfig,
    pub export: ExportConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Reads the file named by `METER_CONFIG`, or `meter-config.toml` if that
    /// exists. `PORT` overrides the port of `server.bind_addr`.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let mut cfg = match env::var("METER_CONFIG") {
            Ok(path) => Self::from_toml_str(&fs::read_to_string(&path)?)?,
            Err(_) => match fs::read_to_string(DEFAULT_CONFIG_PATH) {
                Ok(contents) => Self::from_toml_str(&contents)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
                Err(e) => return Err(e.into()),
            },
        };

        if let Ok(port) = env::var("PORT") {
            cfg.server.bind_addr = with_port(&cfg.server.bind_addr, &port)?;
        }

        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.dashboard.offset()?;
        Ok(cfg)
    }
}

fn with_port(bind_addr: &str, port: &str) -> anyhow::Result<String> {
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid PORT '{port}': {e}"))?;
    let host = bind_addr
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or("0.0.0.0");
    Ok(format!("{host}:{port}"))
}
