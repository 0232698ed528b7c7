use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, ConfigError, File};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use typed_builder::TypedBuilder;
use validator::Validate;

lazy_static::lazy_static! {
    pub static ref ENVIRONMENT: ExecutionEnvironment = mode();
}

/// Where the binary is running, read from `RUN_MODE`.
#[derive(
    Default,
    Display,
    Deserialize,
    Serialize,
    Clone,
    Copy,
    Debug,
    EnumString,
    AsRefStr,
    Eq,
    PartialEq,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEnvironment {
    #[default]
    Local,
    #[strum(serialize = "dev")]
    Development,
    Stage,
    #[strum(serialize = "prod")]
    Production,
    Integration,
}

fn mode() -> ExecutionEnvironment {
    env::var("RUN_MODE")
        .map(|enum_str| ExecutionEnvironment::from_str(enum_str.as_str()).unwrap_or_default())
        .unwrap_or_default()
}

#[derive(Default, Display, Deserialize, Serialize, Clone, Copy, Debug, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, TypedBuilder, Validate)]
pub struct TelemetryConfig {
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    tracing_service_name: Option<String>,
    #[builder(default)]
    #[serde(default)]
    log_format: LogFormat,
    /// Default filter directive, used when `RUST_LOG` is not set.
    #[builder(default = default_log_level(), setter(into))]
    #[serde(default = "default_log_level")]
    #[validate(length(min = 1))]
    log_level: String,
    /// When set, logs are also written as JSON lines to this file.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    log_file: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl TelemetryConfig {
    pub fn tracing_service_name(&self) -> Option<&str> {
        self.tracing_service_name.as_deref()
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

/// Layered configuration loader.
///
/// Sources, later ones overriding earlier ones:
/// `config/default` (optional), the explicit `path` (required when given),
/// then environment variables `{env_prefix}__{section}__{key}`.
#[derive(TypedBuilder)]
pub struct Settings<'a> {
    #[builder(default, setter(strip_option))]
    path: Option<&'a str>,
    #[builder(default = "FHE_CHALLENGE")]
    env_prefix: &'a str,
}

impl Settings<'_> {
    /// # Errors
    ///
    /// Returns an error if a required source is missing or the merged
    /// configuration cannot be deserialized into `T`.
    pub fn init_conf<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let mut s = Config::builder().add_source(File::with_name("config/default").required(false));

        if let Some(path) = self.path {
            s = s.add_source(File::with_name(path).required(true))
        };

        let s = s
            .add_source(
                config::Environment::with_prefix(self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct SampleConf {
        name: String,
        retries: u32,
        telemetry: TelemetryConfig,
    }

    fn write_sample(dir: &Path) -> PathBuf {
        let path = dir.join("sample.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
name = "from-file"
retries = 3

[telemetry]
tracing_service_name = "sample"
log_format = "json"
"#
        )
        .unwrap();
        path
    }

    #[test]
    #[serial_test::serial]
    fn file_values_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let conf: SampleConf = Settings::builder()
            .path(path.to_str().unwrap())
            .env_prefix("OBS_FILE_TEST")
            .build()
            .init_conf()
            .unwrap();
        assert_eq!(conf.name, "from-file");
        assert_eq!(conf.retries, 3);
        assert_eq!(conf.telemetry.tracing_service_name(), Some("sample"));
        assert_eq!(conf.telemetry.log_format(), LogFormat::Json);
        // not in the file, falls back to the serde default
        assert_eq!(conf.telemetry.log_level(), "info");
        assert!(conf.telemetry.log_file().is_none());
    }

    #[test]
    #[serial_test::serial]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        env::set_var("OBS_ENV_TEST__NAME", "from-env");
        env::set_var("OBS_ENV_TEST__TELEMETRY__LOG_LEVEL", "debug");
        let conf: SampleConf = Settings::builder()
            .path(path.to_str().unwrap())
            .env_prefix("OBS_ENV_TEST")
            .build()
            .init_conf()
            .unwrap();
        env::remove_var("OBS_ENV_TEST__NAME");
        env::remove_var("OBS_ENV_TEST__TELEMETRY__LOG_LEVEL");
        assert_eq!(conf.name, "from-env");
        assert_eq!(conf.retries, 3);
        assert_eq!(conf.telemetry.log_level(), "debug");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let res: Result<SampleConf, _> = Settings::builder()
            .path("/definitely/not/here.toml")
            .build()
            .init_conf();
        assert!(res.is_err());
    }

    #[test]
    fn telemetry_defaults() {
        let conf = TelemetryConfig::default();
        assert_eq!(conf.log_format(), LogFormat::Text);
        assert_eq!(conf.log_level(), "info");
        assert!(conf.validate().is_ok());

        let bad = TelemetryConfig::builder().log_level("").build();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn environment_names() {
        assert_eq!(
            ExecutionEnvironment::from_str("prod").unwrap(),
            ExecutionEnvironment::Production
        );
        assert_eq!(ExecutionEnvironment::Development.to_string(), "dev");
        assert!(ExecutionEnvironment::from_str("mars").is_err());
    }
}
