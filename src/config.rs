use std::{path::Path, time::Duration};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "vision-relay.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Remote endpoint settings.
#[derive(Clone, Debug, PartialEq)]
pub struct DashScopeSettings {
    pub api_key: String,
    pub base_url: String,
    pub vision_model: String,
    /// `None` leaves the transport default in place.
    pub request_timeout: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Deployment tag such as `development` or `production`.
    pub environment: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u32,
}

/// Process-wide settings, loaded once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub dashscope: DashScopeSettings,
    pub server: ServerSettings,
    pub cors_origins: Vec<String>,
    pub rate_limit: RateLimitSettings,
}

// Flat mirror of the environment variable names, lowercased by the `config` crate.
#[derive(Debug, Deserialize)]
struct RawSettings {
    dashscope_api_key: String,
    dashscope_base_url: String,
    vision_model: String,
    request_timeout_ms: Option<u64>,
    host: String,
    port: u16,
    node_env: String,
    cors_origins: String,
    rate_limit_window_ms: u64,
    rate_limit_max_requests: u32,
}

impl Settings {
    /// Loads defaults, then the optional TOML file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let source = with_defaults(Config::builder())?
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;
        Self::from_config(source)
    }

    /// Builds settings from an already assembled [`Config`].
    pub fn from_config(source: Config) -> Result<Self, SettingsError> {
        let raw: RawSettings = source.try_deserialize()?;

        if raw.rate_limit_window_ms == 0 {
            return Err(SettingsError::Invalid {
                key: "rate_limit_window_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        let settings = Settings {
            dashscope: DashScopeSettings {
                api_key: raw.dashscope_api_key,
                base_url: raw.dashscope_base_url,
                vision_model: raw.vision_model,
                request_timeout: raw.request_timeout_ms.map(Duration::from_millis),
            },
            server: ServerSettings {
                host: raw.host,
                port: raw.port,
                environment: raw.node_env,
            },
            cors_origins: raw
                .cors_origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            rate_limit: RateLimitSettings {
                window: Duration::from_millis(raw.rate_limit_window_ms),
                max_requests: raw.rate_limit_max_requests,
            },
        };

        if settings.dashscope.api_key.is_empty() && settings.is_production() {
            log::warn!("DASHSCOPE_API_KEY is not set");
        }

        Ok(settings)
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == "production"
    }
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    builder
        .set_default("dashscope_api_key", "")?
        .set_default(
            "dashscope_base_url",
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
        )?
        .set_default("vision_model", "qwen3-vl-plus")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 3000_i64)?
        .set_default("node_env", "development")?
        .set_default("cors_origins", "http://localhost:3000")?
        .set_default("rate_limit_window_ms", 900_000_i64)?
        .set_default("rate_limit_max_requests", 100_i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(overrides: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let mut builder = with_defaults(Config::builder()).unwrap();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        Settings::from_config(builder.build().unwrap())
    }

    #[test]
    fn defaults() {
        let settings = build(&[]).unwrap();
        assert_eq!(settings.dashscope.api_key, "");
        assert_eq!(
            settings.dashscope.base_url,
            "https://dashscope.aliyuncs.com/compatible-mode/v1"
        );
        assert_eq!(settings.dashscope.vision_model, "qwen3-vl-plus");
        assert_eq!(settings.dashscope.request_timeout, None);
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.environment, "development");
        assert_eq!(settings.cors_origins, vec!["http://localhost:3000"]);
        assert_eq!(settings.rate_limit.window, Duration::from_secs(900));
        assert_eq!(settings.rate_limit.max_requests, 100);
        assert!(!settings.is_production());
    }

    #[test]
    fn string_values_are_parsed() {
        let settings = build(&[
            ("port", "8080"),
            ("request_timeout_ms", "2500"),
            ("cors_origins", " https://a.example , https://b.example,,"),
            ("rate_limit_max_requests", "5"),
            ("node_env", "production"),
        ])
        .unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(
            settings.dashscope.request_timeout,
            Some(Duration::from_millis(2500))
        );
        assert_eq!(
            settings.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(settings.rate_limit.max_requests, 5);
        assert!(settings.is_production());
    }

    #[test]
    fn rejects_zero_window() {
        let err = build(&[("rate_limit_window_ms", "0")]).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                key: "rate_limit_window_ms",
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(matches!(
            build(&[("port", "eighty")]),
            Err(SettingsError::Load(_))
        ));
    }

    #[test]
    fn missing_file_is_allowed() {
        let source = with_defaults(Config::builder())
            .unwrap()
            .add_source(
                File::from(Path::new("does-not-exist.toml"))
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .build()
            .unwrap();
        assert_eq!(Settings::from_config(source).unwrap().server.port, 3000);
    }
}
