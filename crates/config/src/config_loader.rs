use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use twin_common::Result;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    pub persona: PersonaConfig,
    pub cors: CorsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    pub model: String,
    /// Never written back out; comes from the file or `OPENAI_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub memory_dir: PathBuf,
}

/// Persona resource location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub path: PathBuf,
}

/// CORS allow-list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            memory_dir: PathBuf::from("../memory"),
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("me.txt"),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            provider: ProviderConfig::default(),
            storage: StorageConfig::default(),
            persona: PersonaConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Apply overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.provider.api_key = Some(key.trim().to_string());
        }
        if let Some(base) = lookup("OPENAI_BASE_URL").filter(|b| !b.trim().is_empty()) {
            self.provider.api_base = base.trim().trim_end_matches('/').to_string();
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            let parsed = parse_origins(&origins);
            if !parsed.is_empty() {
                self.cors.origins = parsed;
            }
        }
    }
}

/// Split a comma-separated origin list
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file (or defaults), then `.env` and process environment
    pub fn load(path: Option<&PathBuf>) -> Result<AppConfig> {
        match dotenvy::dotenv_override() {
            Ok(env_path) => debug!("Loaded environment from {}", env_path.display()),
            Err(_) => debug!("No .env file found"),
        }

        let mut config = Self::load_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from file or use defaults, without touching the environment
    pub fn load_file(path: Option<&PathBuf>) -> Result<AppConfig> {
        if let Some(path) = path {
            if path.exists() {
                return Self::read(path);
            }
        }

        // Check default locations
        let default_paths = vec![
            PathBuf::from("twin.json"),
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("twin/config.json"),
        ];

        for path in default_paths {
            if path.exists() {
                return Self::read(&path);
            }
        }

        // Use defaults
        Ok(AppConfig::default())
    }

    fn read(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(config: &AppConfig, path: &PathBuf) -> Result<()> {
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
