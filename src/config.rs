use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TrackerError};

/// Placeholder substituted with the tracking number in URL templates.
pub const TRACKING_PLACEHOLDER: &str = "{tracking}";

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    pub cruz_del_sur: CruzDelSurConfig,
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub fedex_url: String,
    pub correos_url: String,
    pub fedex_timeout_secs: u64,
    pub correos_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub starken_url: String,
    pub starken_settle_ms: u64,
    pub starken_wait_secs: u64,
    pub starken_poll_interval_ms: u64,
}

/// Pixel rectangle of the captcha image inside a full-page screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CruzDelSurConfig {
    pub tracking_url: String,
    pub max_attempts: u32,
    pub retry_backoff_secs: u64,
    pub form_timeout_secs: u64,
    pub settle_secs: u64,
    pub captcha_region: CaptchaRegion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub max_polls: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            http: HttpConfig {
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                fedex_url: "https://clsclweb.tntchile.cl/txapgw/tracking.asp?boleto={tracking}".to_string(),
                correos_url: "https://www.correos.cl/web/guest/seguimiento-en-linea?numero={tracking}".to_string(),
                fedex_timeout_secs: 15,
                correos_timeout_secs: 20,
            },
            browser: BrowserConfig {
                webdriver_url: "http://localhost:9515".to_string(),
                headless: true,
                window_width: 1920,
                window_height: 1080,
                starken_url: "https://www.starken.cl/seguimiento?codigo={tracking}".to_string(),
                starken_settle_ms: 3000,
                starken_wait_secs: 20,
                starken_poll_interval_ms: 500,
            },
            cruz_del_sur: CruzDelSurConfig {
                tracking_url: "https://www.cruzdelsurcarga.cl/seguimiento/".to_string(),
                max_attempts: 5,
                retry_backoff_secs: 3,
                form_timeout_secs: 10,
                settle_secs: 6,
                captcha_region: CaptchaRegion {
                    x: 563,
                    y: 409,
                    width: 138,
                    height: 62,
                },
            },
            solver: SolverConfig {
                base_url: "http://2captcha.com".to_string(),
                api_key_env: "API_KEY_2CAPTCHA".to_string(),
                request_timeout_secs: 20,
                poll_interval_secs: 5,
                max_polls: 15,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file (if given) above the default locations
    pub fn load_from(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            // Start with default values
            .add_source(Config::try_from(&AppConfig::default())?)
            // Add config files if they exist
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Add environment variables with prefix, e.g. SHIPTRACK_SOLVER__MAX_POLLS
            .add_source(
                Environment::with_prefix("SHIPTRACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TrackerError::InvalidConfig(format!("Failed to load configuration: {e}")))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| TrackerError::InvalidConfig(format!("Failed to deserialize configuration: {e}")))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TrackerError::InvalidConfig(msg));

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return invalid(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return invalid(format!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format, valid_formats
            ));
        }

        // Validate URL templates
        for (name, template) in [
            ("http.fedex_url", &self.http.fedex_url),
            ("http.correos_url", &self.http.correos_url),
            ("browser.starken_url", &self.browser.starken_url),
        ] {
            if !template.contains(TRACKING_PLACEHOLDER) {
                return invalid(format!("{name} must contain {TRACKING_PLACEHOLDER}"));
            }
        }

        // Validate timeouts and bounds
        for (name, value) in [
            ("http.fedex_timeout_secs", self.http.fedex_timeout_secs),
            ("http.correos_timeout_secs", self.http.correos_timeout_secs),
            ("browser.starken_wait_secs", self.browser.starken_wait_secs),
            ("browser.starken_poll_interval_ms", self.browser.starken_poll_interval_ms),
            ("cruz_del_sur.form_timeout_secs", self.cruz_del_sur.form_timeout_secs),
            ("solver.request_timeout_secs", self.solver.request_timeout_secs),
            ("solver.poll_interval_secs", self.solver.poll_interval_secs),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be greater than 0"));
            }
        }

        if self.cruz_del_sur.max_attempts == 0 {
            return invalid("cruz_del_sur.max_attempts must be greater than 0".to_string());
        }
        if self.solver.max_polls == 0 {
            return invalid("solver.max_polls must be greater than 0".to_string());
        }

        let region = self.cruz_del_sur.captcha_region;
        if region.width == 0 || region.height == 0 {
            return invalid("cruz_del_sur.captcha_region must have a non-zero size".to_string());
        }

        if self.solver.api_key_env.trim().is_empty() {
            return invalid("solver.api_key_env must name an environment variable".to_string());
        }

        Ok(())
    }

    /// Solver API key from the environment; empty values count as absent
    pub fn solver_api_key(&self) -> Option<String> {
        std::env::var(&self.solver.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}

impl HttpConfig {
    pub fn fedex_timeout(&self) -> Duration {
        Duration::from_secs(self.fedex_timeout_secs)
    }

    pub fn correos_timeout(&self) -> Duration {
        Duration::from_secs(self.correos_timeout_secs)
    }
}

/// Substitute the tracking number into a URL template.
pub fn tracking_url(template: &str, tracking_number: &str) -> String {
    template.replace(TRACKING_PLACEHOLDER, tracking_number)
}
