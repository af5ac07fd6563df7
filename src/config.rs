//! Service configuration loaded from environment variables.
//!
//! Everything is read once at startup; there is no runtime reconfiguration.
//! CLI flags override individual fields after loading.
//!
//! | Variable            | Default                                   | Description                              |
//! |---------------------|-------------------------------------------|------------------------------------------|
//! | `MODEL_ID`          | `deepseek-ai/DeepSeek-R1-Distill-Qwen-7B` | Registry model identifier                |
//! | `MODEL_PATH`        | unset                                     | Local snapshot directory (tried first)   |
//! | `MODEL_REVISION`    | `main`                                    | Registry revision                        |
//! | `MAX_NEW_TOKENS`    | `256`                                     | Generation budget per request            |
//! | `TEMPERATURE`       | `0.7`                                     | Sampling temperature                     |
//! | `TOP_P`             | `0.9`                                     | Nucleus sampling threshold               |
//! | `SEED`              | unset                                     | Fixed RNG seed                           |
//! | `HF_ENDPOINT`       | unset                                     | Registry endpoint (mirror) override      |
//! | `HF_HOME`           | unset                                     | Registry cache root override             |
//! | `HF_TOKEN`          | unset                                     | Registry access token                    |
//! | `HTTPS_PROXY`       | unset                                     | Proxy for registry downloads             |
//! | `SOMNIA_FALLBACK`   | `true`                                    | Keyword fallback when the model is absent|
//! | `SOMNIA_SKIP_MODEL` | `false`                                   | Serve the fallback only                  |
//! | `SOMNIA_CPU`        | `false`                                   | Never place the model on an accelerator  |
//! | `HOST`              | `0.0.0.0`                                 | Bind host                                |
//! | `PORT`              | `5000`                                    | Bind port                                |
//! | `SOMNIA_LOG`        | `info`                                    | `tracing` filter directive               |

use std::path::PathBuf;

use crate::error::{Result, SomniaError};
use crate::generate::GenerationConfig;

/// Default registry model
pub const DEFAULT_MODEL_ID: &str = "deepseek-ai/DeepSeek-R1-Distill-Qwen-7B";

/// Registry access settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryConfig {
    /// Endpoint override, e.g. a regional mirror
    pub endpoint: Option<String>,
    /// Cache root (the `hub/` directory lives below it)
    pub home: Option<PathBuf>,
    /// Access token
    pub token: Option<String>,
    /// Proxy URL picked up by the HTTP client
    pub proxy: Option<String>,
}

impl RegistryConfig {
    /// Directory holding `models--{org}--{name}` snapshot trees
    #[must_use]
    pub fn hub_cache_dir(&self) -> PathBuf {
        match &self.home {
            Some(home) => home.join("hub"),
            None => hf_hub::Cache::from_env().path().clone(),
        }
    }
}

/// Runtime configuration for the service process
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Registry model identifier
    pub model_id: String,
    /// Explicit local snapshot directory
    pub model_path: Option<PathBuf>,
    /// Registry revision
    pub revision: String,
    /// Sampling defaults for every request
    pub generation: GenerationConfig,
    /// Registry access settings
    pub registry: RegistryConfig,
    /// Whether the keyword fallback may answer when the model is unavailable
    pub fallback_enabled: bool,
    /// Skip model loading entirely
    pub skip_model: bool,
    /// Force CPU placement
    pub force_cpu: bool,
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Tracing filter directive
    pub log_filter: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServiceConfig {
    /// Load configuration from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, applying defaults where
    /// a key is absent or unparseable
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let str_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut generation = GenerationConfig::default()
            .with_max_new_tokens(env_parse(&lookup, "MAX_NEW_TOKENS", 256))
            .with_temperature(env_parse(&lookup, "TEMPERATURE", 0.7))
            .with_top_p(env_parse(&lookup, "TOP_P", 0.9));
        if let Some(seed) = lookup("SEED").and_then(|v| v.parse().ok()) {
            generation = generation.with_seed(seed);
        }

        Self {
            model_id: str_or("MODEL_ID", DEFAULT_MODEL_ID),
            model_path: non_empty("MODEL_PATH").map(PathBuf::from),
            revision: str_or("MODEL_REVISION", "main"),
            generation,
            registry: RegistryConfig {
                endpoint: non_empty("HF_ENDPOINT"),
                home: non_empty("HF_HOME").map(PathBuf::from),
                token: non_empty("HF_TOKEN"),
                proxy: non_empty("HTTPS_PROXY").or_else(|| non_empty("HTTP_PROXY")),
            },
            fallback_enabled: env_bool(&lookup, "SOMNIA_FALLBACK", true),
            skip_model: env_bool(&lookup, "SOMNIA_SKIP_MODEL", false),
            force_cpu: env_bool(&lookup, "SOMNIA_CPU", false),
            host: str_or("HOST", "0.0.0.0"),
            port: env_parse(&lookup, "PORT", 5000),
            log_filter: str_or("SOMNIA_LOG", "info"),
        }
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::InvalidConfiguration`] on the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.model_id.trim().is_empty() {
            return Err(SomniaError::InvalidConfiguration(
                "model id cannot be empty".to_string(),
            ));
        }
        self.generation.validate()
    }
}

fn env_bool<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: bool) -> bool {
    match lookup(key) {
        Some(v) if v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") => {
            true
        },
        Some(v) if v == "0" || v.eq_ignore_ascii_case("false") || v.eq_ignore_ascii_case("no") => {
            false
        },
        _ => default,
    }
}

fn env_parse<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
