//! # Configuration Management
//!
//! Hierarchical configuration loaded from, in order of increasing precedence:
//! `config/default.toml`, `config/{environment}.toml`, then environment
//! variables. Environment variable names are the ones enumerated in the
//! platform's external interface contract (`KVSTORE_*`, `STOREFRONT_*`,
//! `API_*`, `MODEL_*`, `LLM_*`, `USE_WORKFLOW_ORCHESTRATION`,
//! `USE_VALUE_STORE`).

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub kv_store: KvStoreConfig,
    pub storefront: StorefrontConfig,
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub llm: LlmConfig,
    pub workflow: WorkflowConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KvStoreConfig {
    pub host: String,
    pub port: u16,
    pub namespace: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub tls_cafile: Option<String>,
    #[serde(default)]
    pub tls_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl KvStoreConfig {
    /// Build the Redis connection URL backing the KV store adapter.
    pub fn redis_url(&self) -> String {
        let scheme = if self.use_tls { "rediss" } else { "redis" };
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => format!("{scheme}://{u}:{p}@{}:{}", self.host, self.port),
            (None, Some(p)) => format!("{scheme}://:{p}@{}:{}", self.host, self.port),
            _ => format!("{scheme}://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorefrontConfig {
    pub api_url: String,
    #[serde(default = "default_storefront_timeout")]
    pub timeout_seconds: u64,
}

fn default_storefront_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_cart_load_budget")]
    pub cart_load_budget_ms: u64,
}

fn default_cart_load_budget() -> u64 {
    3_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_path: String,
    #[serde(default)]
    pub model_metrics_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    #[serde(default = "default_true")]
    pub use_workflow_orchestration: bool,
    #[serde(default = "default_true")]
    pub use_value_store: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,
    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allowed_methods() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allowed_headers() -> Vec<String> {
    vec!["*".to_string()]
}

impl Config {
    /// Load configuration from TOML files plus environment overrides.
    ///
    /// The environment is selected by `ENVIRONMENT` (`development` by default).
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(
                Environment::default()
                    .try_parsing(true)
                    .separator("__")
                    .prefix_separator("_"),
            );

        let raw = builder.build()?;
        let config: Config = raw.try_deserialize().or_else(|_| Self::from_env_fallback())?;
        config.validate()?;
        Ok(config)
    }

    /// Direct env-var mapping fallback for the flat `KVSTORE_HOST`-style
    /// variable names used by the platform's external interface contract,
    /// for deployments that don't use TOML files at all.
    fn from_env_fallback() -> Result<Self, ConfigError> {
        Ok(Config {
            kv_store: KvStoreConfig {
                host: env::var("KVSTORE_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env::var("KVSTORE_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(6379),
                namespace: env::var("KVSTORE_NAMESPACE")
                    .unwrap_or_else(|_| "churnprediction".to_string()),
                use_tls: env::var("KVSTORE_USE_TLS")
                    .map(|v| v == "true")
                    .unwrap_or(false),
                tls_cafile: env::var("KVSTORE_TLS_CAFILE").ok(),
                tls_name: env::var("KVSTORE_TLS_NAME").ok(),
                username: env::var("KVSTORE_USERNAME").ok(),
                password: env::var("KVSTORE_PASSWORD").ok(),
            },
            storefront: StorefrontConfig {
                api_url: env::var("STOREFRONT_API_URL")
                    .unwrap_or_else(|_| "http://localhost:8000".to_string()),
                timeout_seconds: default_storefront_timeout(),
            },
            server: ServerConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("API_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                cart_load_budget_ms: default_cart_load_budget(),
            },
            model: ModelConfig {
                model_path: env::var("MODEL_PATH")
                    .unwrap_or_else(|_| "./models/churn_model.json".to_string()),
                model_metrics_path: env::var("MODEL_METRICS_PATH").ok(),
            },
            llm: LlmConfig {
                api_key: env::var("LLM_API_KEY").unwrap_or_default(),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| default_llm_model()),
                base_url: default_llm_base_url(),
                timeout_seconds: default_llm_timeout(),
            },
            workflow: WorkflowConfig {
                use_workflow_orchestration: env::var("USE_WORKFLOW_ORCHESTRATION")
                    .map(|v| v != "false")
                    .unwrap_or(true),
                use_value_store: env::var("USE_VALUE_STORE")
                    .map(|v| v != "false")
                    .unwrap_or(true),
            },
            cors: CorsConfig {
                allowed_origins: default_allowed_origins(),
                allowed_methods: default_allowed_methods(),
                allowed_headers: default_allowed_headers(),
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.kv_store.namespace.is_empty() {
            return Err(ConfigError::Message(
                "kv_store.namespace must not be empty".to_string(),
            ));
        }
        if self.model.model_path.is_empty() {
            return Err(ConfigError::Message(
                "model.model_path must be set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_embeds_credentials() {
        let cfg = KvStoreConfig {
            host: "cache".to_string(),
            port: 6380,
            namespace: "ns".to_string(),
            use_tls: false,
            tls_cafile: None,
            tls_name: None,
            username: Some("u".to_string()),
            password: Some("p".to_string()),
        };
        assert_eq!(cfg.redis_url(), "redis://u:p@cache:6380");
    }

    #[test]
    fn redis_url_defaults_to_plain_scheme() {
        let cfg = KvStoreConfig {
            host: "localhost".to_string(),
            port: 6379,
            namespace: "ns".to_string(),
            use_tls: false,
            tls_cafile: None,
            tls_name: None,
            username: None,
            password: None,
        };
        assert_eq!(cfg.redis_url(), "redis://localhost:6379");
    }
}
