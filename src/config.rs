use anyhow::{Context, Result};
use std::{env, path::PathBuf, sync::OnceLock, time::Duration};

/// Process configuration loaded and validated at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Mihomo external controller.
    pub controller: ControllerConfig,

    /// File locations for the side store and client settings.
    pub paths: PathConfig,

    /// Delay before the post-patch core-config re-fetch.
    pub reconcile_delay: Duration,
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub base_url: String,
    pub api_secret: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PathConfig {
    pub data_dir: PathBuf,
    pub side_store_file: PathBuf,
    pub client_settings_file: PathBuf,
}

impl AppConfig {
    /// Get or load the application configuration.
    ///
    /// On first call, loads everything from environment variables; subsequent
    /// calls return the cached instance.
    ///
    /// # Panics
    /// Panics if configuration loading fails. The application cannot function
    /// without valid configuration.
    pub fn get() -> &'static Self {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();
        APP_CONFIG.get_or_init(|| {
            Self::load_internal().expect("failed to load application configuration")
        })
    }

    fn load_internal() -> Result<Self> {
        let controller = ControllerConfig::load();
        let paths = PathConfig::load()?;
        let reconcile_delay = env::var("RECONCILE_DELAY_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse::<u64>()
            .map(Duration::from_millis)
            .context("failed to parse RECONCILE_DELAY_MS: invalid format")?;

        Ok(Self {
            controller,
            paths,
            reconcile_delay,
        })
    }
}

impl ControllerConfig {
    fn load() -> Self {
        let base_url = env::var("MIHOMO_CONTROLLER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9090".to_string());
        let api_secret = env::var("MIHOMO_API_SECRET").ok().filter(|s| !s.is_empty());

        Self {
            base_url,
            api_secret,
        }
    }
}

impl PathConfig {
    fn load() -> Result<Self> {
        let data_dir = match env::var("DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => Self::default_data_dir(),
        };

        std::fs::create_dir_all(&data_dir).context("failed to create data directory")?;

        let side_store_file = data_dir.join("state.ini");
        let client_settings_file = data_dir.join("settings.json");

        Ok(Self {
            data_dir,
            side_store_file,
            client_settings_file,
        })
    }

    #[cfg(not(any(test, feature = "mock")))]
    fn default_data_dir() -> PathBuf {
        match env::var("HOME") {
            Ok(home) => PathBuf::from(home)
                .join(".config")
                .join(env!("CARGO_PKG_NAME")),
            Err(_) => std::env::temp_dir().join(env!("CARGO_PKG_NAME")),
        }
    }

    // In test mode, use a temp directory to avoid touching the user's config
    #[cfg(any(test, feature = "mock"))]
    fn default_data_dir() -> PathBuf {
        std::env::temp_dir().join(concat!(env!("CARGO_PKG_NAME"), "-test"))
    }
}
