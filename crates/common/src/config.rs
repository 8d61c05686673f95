//! Configuration structures for CocoServe
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `COCOSERVE_<SECTION>__<FIELD>` environment variables. Everything is
//! read once at startup; nothing here is reloaded at runtime.

use crate::error::{CocoError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the YAML configuration file
pub const CONFIG_PATH_ENV: &str = "COCOSERVE_CONFIG";

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "configs/cocoserve.yaml";

/// Top-level configuration for the classification service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServeConfig {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Worker pool and job queue sizing
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Model, labels and selection threshold
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Outbound image retrieval
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Logging and metrics
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server binding address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served under `/static`
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

/// What `submit` does when the job queue is at capacity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Suspend the producer until a slot frees
    #[default]
    Block,

    /// Fail immediately with `QueueFull`
    Reject,
}

/// Worker pool and job queue sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of workers (0 = CPU count)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of jobs buffered awaiting a worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Full-queue policy
    #[serde(default)]
    pub admission: AdmissionPolicy,

    /// Per-job time budget in milliseconds
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,
}

/// How concurrent workers share the inference engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineConcurrency {
    /// Engine is thread-safe; up to W calls run at once
    #[default]
    Shared,

    /// Engine calls are serialized behind a mutex
    Serialized,
}

/// Model, labels and selection threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Directory containing the serialized model
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Model file name inside `model_dir`
    #[serde(default = "default_model_file")]
    pub model_file: String,

    /// Label file, one label per line
    #[serde(default = "default_labels_path")]
    pub labels_path: PathBuf,

    /// Detections must score strictly above this to be drawn
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Engine sharing policy
    #[serde(default)]
    pub engine_concurrency: EngineConcurrency,
}

/// Outbound image retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Trust any TLS certificate (legacy self-signed setups only)
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Largest accepted image body
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

/// Logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Expose `/metrics`
    #[serde(default = "default_metrics")]
    pub enable_metrics: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_workers() -> usize {
    0 // Means use CPU count
}

fn default_queue_capacity() -> usize {
    100
}

fn default_job_timeout_ms() -> u64 {
    30_000
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_file() -> String {
    "frozen_inference_graph.pb".to_string()
}

fn default_labels_path() -> PathBuf {
    PathBuf::from("labels.txt")
}

fn default_threshold() -> f32 {
    0.4
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_max_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_log_filter() -> String {
    "cocoserve=info,tower_http=info".to_string()
}

fn default_metrics() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            admission: AdmissionPolicy::default(),
            job_timeout_ms: default_job_timeout_ms(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            model_file: default_model_file(),
            labels_path: default_labels_path(),
            threshold: default_threshold(),
            engine_concurrency: EngineConcurrency::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            accept_invalid_certs: false,
            timeout_secs: default_fetch_timeout(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            enable_metrics: default_metrics(),
        }
    }
}

impl ServeConfig {
    /// Load configuration from an optional YAML file plus environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("COCOSERVE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CocoError::Config(format!("Failed to load {}: {}", path.display(), e)))?;

        let config: ServeConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the file named by `COCOSERVE_CONFIG`
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    /// Parse a YAML document without consulting the environment
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: ServeConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.queue_capacity == 0 {
            return Err(CocoError::config("dispatch.queue_capacity must be at least 1"));
        }
        if self.dispatch.job_timeout_ms == 0 {
            return Err(CocoError::config("dispatch.job_timeout_ms must be positive"));
        }
        let threshold = self.classifier.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CocoError::config(format!(
                "classifier.threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.classifier.model_file.is_empty() {
            return Err(CocoError::config("classifier.model_file must not be empty"));
        }
        if self.classifier.labels_path.as_os_str().is_empty() {
            return Err(CocoError::config("classifier.labels_path must not be empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(CocoError::config("fetch.timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Full path of the serialized model
    pub fn model_path(&self) -> PathBuf {
        self.classifier.model_dir.join(&self.classifier.model_file)
    }
}

impl DispatchConfig {
    /// Resolved worker count W, never zero
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Per-job time budget
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }
}

impl FetchConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ServeConfig::from_yaml_str("{}").unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.dispatch.queue_capacity, 100);
        assert_eq!(config.dispatch.admission, AdmissionPolicy::Block);
        assert_eq!(config.classifier.threshold, 0.4);
        assert_eq!(config.classifier.engine_concurrency, EngineConcurrency::Shared);
        assert!(!config.fetch.accept_invalid_certs);
        assert_eq!(
            config.model_path(),
            PathBuf::from("models/frozen_inference_graph.pb")
        );
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
dispatch:
  workers: 2
  queue_capacity: 8
  admission: reject
  job_timeout_ms: 500
classifier:
  model_dir: /srv/coco
  threshold: 0.6
  engine_concurrency: serialized
fetch:
  accept_invalid_certs: true
"#;
        let config = ServeConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.dispatch.worker_count(), 2);
        assert_eq!(config.dispatch.queue_capacity, 8);
        assert_eq!(config.dispatch.admission, AdmissionPolicy::Reject);
        assert_eq!(config.dispatch.job_timeout(), Duration::from_millis(500));
        assert_eq!(config.classifier.engine_concurrency, EngineConcurrency::Serialized);
        assert!(config.fetch.accept_invalid_certs);
        assert_eq!(
            config.model_path(),
            PathBuf::from("/srv/coco/frozen_inference_graph.pb")
        );
    }

    #[test]
    fn test_config_validation_zero_capacity() {
        let result = ServeConfig::from_yaml_str("dispatch:\n  queue_capacity: 0\n");
        assert!(matches!(result, Err(CocoError::Config(_))));
    }

    #[test]
    fn test_config_validation_threshold_range() {
        let result = ServeConfig::from_yaml_str("classifier:\n  threshold: 1.5\n");
        assert!(matches!(result, Err(CocoError::Config(_))));
    }

    #[test]
    fn test_zero_workers_resolves_to_cpu_count() {
        let dispatch = DispatchConfig::default();
        assert!(dispatch.worker_count() >= 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  port: 9000\ndispatch:\n  workers: 3").unwrap();

        let config = ServeConfig::load(file.path()).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.dispatch.worker_count(), 3);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServeConfig::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.dispatch.queue_capacity, 100);
    }
}
