use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use subscout_core::OrchestratorConfig;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_STALE_SCAN_MINUTES: u64 = 10;

/// Server configuration: defaults, then an optional TOML file, then
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,

    /// Scans left `pending` or `running` for longer than this when the
    /// server starts are marked as interrupted.
    pub stale_scan_minutes: u64,

    pub orchestrator: OrchestratorConfig,

    #[serde(skip)]
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub env_file_loaded: bool,
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            cors: CorsConfig::default(),
            stale_scan_minutes: DEFAULT_STALE_SCAN_MINUTES,
            orchestrator: OrchestratorConfig::default(),
            metadata: ConfigMetadata::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Loads `.env`, then the config file (`explicit_path`,
    /// `$SUBSCOUT_CONFIG_PATH`, or the first default location that exists),
    /// then applies environment overrides.
    pub fn load(explicit_path: Option<&Path>) -> anyhow::Result<Self> {
        let env_file_loaded = dotenvy::dotenv().is_ok();

        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("SUBSCOUT_CONFIG_PATH").map(PathBuf::from))
            .or_else(Self::find_default_file);

        let mut config = match &path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.metadata = ConfigMetadata {
            env_file_loaded,
            config_path: path,
        };
        Ok(config)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).map_err(|err| anyhow!("{err}"))
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &["subscout.toml", "config/subscout.toml"];
        CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.is_file())
    }

    /// Applies `SERVER_*`, `DATABASE_URL`, `CORS_ALLOWED_ORIGINS` and the
    /// `SUBSCOUT_*` tool settings. `lookup` returns `None` for unset keys.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(host) = var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("SERVER_PORT") {
            self.server.port = parse_number("SERVER_PORT", &port)?;
        }
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(origins) = var("CORS_ALLOWED_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(secs) = var("SUBSCOUT_TOOL_TIMEOUT_SECS") {
            self.orchestrator.default_timeout_secs =
                parse_number("SUBSCOUT_TOOL_TIMEOUT_SECS", &secs)?;
        }
        if let Some(container) = var("SUBSCOUT_TOOLS_CONTAINER") {
            self.orchestrator.tools.container = Some(container);
        }
        if let Some(dir) = var("SUBSCOUT_OUTPUT_DIR") {
            self.orchestrator.tools.output_dir = PathBuf::from(dir);
        }
        if let Some(minutes) = var("SUBSCOUT_STALE_SCAN_MINUTES") {
            self.stale_scan_minutes =
                parse_number("SUBSCOUT_STALE_SCAN_MINUTES", &minutes)?;
        }
        Ok(())
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("DATABASE_URL is not set and no database.url is configured"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_number<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| anyhow!("invalid {key} value {raw:?}: {err}"))
}
