use anyhow::Result;
use chrono::Datelike;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for the PPMP planner
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlannerConfig {
    /// Planning defaults
    pub planning: PlanningConfig,
    /// Snapshot and attachment storage
    pub storage: StorageConfig,
    /// Notification side channel
    pub notifications: NotificationConfig,
    /// List cache settings
    pub cache: CacheConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlanningConfig {
    /// Fiscal year used when a command does not name one
    pub current_fiscal_year: i32,
    /// Page size for list views
    pub per_page: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    /// JSON snapshot used by the in-memory store
    pub data_file: PathBuf,
    /// Root directory for uploaded attachments
    pub attachments_dir: PathBuf,
    /// Bucket name attachments are stored under
    pub attachments_bucket: String,
    /// Base URL attachment links are built from
    pub public_base_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Disable to skip every notification insert
    pub enabled: bool,
    /// Deep link prefix; the PPMP id is appended
    pub link_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum cached list queries
    pub max_capacity: u64,
    /// Seconds before a cached list expires
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines instead of plain text
    pub json_logs: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            planning: PlanningConfig {
                current_fiscal_year: chrono::Utc::now().year(),
                per_page: 10,
            },
            storage: StorageConfig {
                data_file: PathBuf::from(".ppmp-planner/planner.json"),
                attachments_dir: PathBuf::from(".ppmp-planner/storage"),
                attachments_bucket: "ppmp-attachments".to_string(),
                public_base_url: "http://localhost:8080/storage".to_string(),
            },
            notifications: NotificationConfig {
                enabled: true,
                link_prefix: "/planning/ppmp".to_string(),
            },
            cache: CacheConfig {
                max_capacity: 256,
                ttl_seconds: 60,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
            database: None,
        }
    }
}

impl PlannerConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (ppmp-planner.toml, .ppmp-planner-rc)
    /// 3. Environment variables (prefixed with PPMP_PLANNER_)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`PlannerConfig::load`], resolving config files under `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&PlannerConfig::default())?);

        let toml_file = dir.join("ppmp-planner.toml");
        if toml_file.exists() {
            builder = builder.add_source(File::from(toml_file));
        }

        let rc_file = dir.join(".ppmp-planner-rc");
        if rc_file.exists() {
            builder = builder.add_source(File::from(rc_file).format(config::FileFormat::Toml));
        }

        // Nested keys use a double underscore: PPMP_PLANNER_CACHE__TTL_SECONDS
        builder = builder.add_source(
            Environment::with_prefix("PPMP_PLANNER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut planner_config: PlannerConfig = config.try_deserialize()?;

        // Short form for the most common override
        if let Ok(year) = std::env::var("PPMP_PLANNER_FISCAL_YEAR") {
            planner_config.planning.current_fiscal_year = year.trim().parse()?;
        }

        Ok(planner_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<PlannerConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = PlannerConfig::load_env_file();
        PlannerConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static PlannerConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let config = PlannerConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.planning.per_page, 10);
        assert_eq!(config.storage.attachments_bucket, "ppmp-attachments");
        assert_eq!(config.notifications.link_prefix, "/planning/ppmp");
        assert!(config.database.is_none());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("ppmp-planner.toml"),
            "[planning]\ncurrent_fiscal_year = 2031\nper_page = 25\n\n[notifications]\nenabled = false\nlink_prefix = \"/ppmp\"\n",
        )
        .unwrap();

        let config = PlannerConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.planning.current_fiscal_year, 2031);
        assert_eq!(config.planning.per_page, 25);
        assert!(!config.notifications.enabled);
        assert_eq!(config.cache.ttl_seconds, 60);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut config = PlannerConfig::default();
        config.cache.max_capacity = 8;
        config.save_to_file(dir.path().join("ppmp-planner.toml")).unwrap();

        let reloaded = PlannerConfig::load_from(dir.path()).unwrap();
        assert_eq!(reloaded.cache.max_capacity, 8);
    }
}
