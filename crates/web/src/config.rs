//! Server and workflow configuration.
//!
//! Resolution order: built-in defaults, then a TOML file, then environment
//! variables, then command-line flags (applied by the binary).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stepline_workflow::{
    DirectoryStore, EngineConfig, FinalizePolicy, HandlerRegistry, InMemoryStore, PatternHandler,
    PipelineStore, StepDescriptor, StepRegistry,
};
use tracing::info;

use crate::error::Error;

/// Environment variable overriding [`WebConfig::bind_address`].
pub const ENV_BIND: &str = "STEPLINE_BIND";
/// Environment variable overriding [`WebConfig::app_name`].
pub const ENV_APP: &str = "STEPLINE_APP";
/// Environment variable selecting directory storage at the given path.
pub const ENV_DATA_DIR: &str = "STEPLINE_DATA_DIR";
/// Environment variable overriding [`WebConfig::finalize_policy`].
pub const ENV_FINALIZE_POLICY: &str = "STEPLINE_FINALIZE_POLICY";
/// Environment variable overriding [`WebConfig::cors_origin`].
pub const ENV_CORS_ORIGIN: &str = "STEPLINE_CORS_ORIGIN";

/// Longest accepted app name. Leaves room for the `-{nn}` suffix of
/// suggested pipeline ids.
pub const MAX_APP_NAME_LEN: usize = 64;

/// Where pipeline documents live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process memory; lost on restart.
    #[default]
    Memory,
    /// One JSON file per pipeline under `path`.
    Directory { path: PathBuf },
}

/// How a step validates its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Any non-blank text.
    #[default]
    Text,
    /// Text matching `pattern`.
    Pattern,
}

/// One configured step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    pub id: String,
    /// Defaults to `id`.
    pub done_key: Option<String>,
    /// Defaults to `id`.
    pub label: Option<String>,
    pub refill: bool,
    pub kind: StepKind,
    pub pattern: Option<String>,
    /// Inline message for input that does not match `pattern`.
    pub message: Option<String>,
    /// Pre-fill derived from the previous step, `{value}` is substituted.
    pub template: Option<String>,
}

impl StepConfig {
    fn descriptor(&self) -> StepDescriptor {
        let done_key = self.done_key.clone().unwrap_or_else(|| self.id.clone());
        let label = self.label.clone().unwrap_or_else(|| self.id.clone());
        let step = StepDescriptor::new(self.id.clone(), done_key, label).with_refill(self.refill);
        match &self.template {
            Some(template) => step.with_template(template.clone()),
            None => step,
        }
    }

    fn handler(&self) -> Result<Option<PatternHandler>, Error> {
        match self.kind {
            StepKind::Text => Ok(None),
            StepKind::Pattern => {
                let pattern = self.pattern.as_deref().ok_or_else(|| {
                    Error::Config(format!("step '{}' has kind pattern but no pattern", self.id))
                })?;
                let message = self
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("{} does not match {pattern}", self.id));
                Ok(Some(PatternHandler::new(pattern, message)?))
            }
        }
    }
}

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Address to bind to (e.g., "127.0.0.1:3000")
    pub bind_address: String,
    /// Allowed CORS origin
    pub cors_origin: String,
    /// First path segment of every pipeline route.
    pub app_name: String,
    pub finalize_policy: FinalizePolicy,
    pub storage: StorageConfig,
    /// Ordered data steps. The finalize step is appended automatically.
    pub steps: Vec<StepConfig>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            app_name: "hello".to_string(),
            finalize_policy: FinalizePolicy::default(),
            storage: StorageConfig::default(),
            steps: Vec::new(),
        }
    }
}

impl WebConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Toml`] if the document does not parse.
    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Toml`]
    /// if it does not parse.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), steps = config.steps.len(), "Loaded configuration");
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unrecognised finalize policy.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind_address = bind;
        }
        if let Some(app) = lookup(ENV_APP) {
            self.app_name = app;
        }
        if let Some(origin) = lookup(ENV_CORS_ORIGIN) {
            self.cors_origin = origin;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.storage = StorageConfig::Directory { path: dir.into() };
        }
        if let Some(policy) = lookup(ENV_FINALIZE_POLICY) {
            self.finalize_policy = policy
                .parse()
                .map_err(|reason| Error::Config(format!("{ENV_FINALIZE_POLICY}: {reason}")))?;
        }
        Ok(self)
    }

    /// Check values the engine cannot reject itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an app name that is not a plain path
    /// segment.
    pub fn validate(&self) -> Result<(), Error> {
        let valid_segment = !self.app_name.is_empty()
            && self.app_name.len() <= MAX_APP_NAME_LEN
            && self
                .app_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
        if !valid_segment || self.app_name == "health" {
            return Err(Error::Config(format!(
                "app_name '{}' must be a plain path segment of at most {MAX_APP_NAME_LEN} characters other than 'health'",
                self.app_name
            )));
        }
        Ok(())
    }

    /// Engine settings carried by this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            app_name: self.app_name.clone(),
            finalize_policy: self.finalize_policy,
        }
    }

    /// Configured steps, or the built-in greeting workflow when none are set.
    pub fn effective_steps(&self) -> Vec<StepConfig> {
        if self.steps.is_empty() {
            greeting_steps()
        } else {
            self.steps.clone()
        }
    }

    /// Build the step registry and the handlers for its steps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] for a malformed step list and
    /// [`Error::Config`] for a pattern step without a usable pattern.
    pub fn build_registry(&self) -> Result<(StepRegistry, HandlerRegistry), Error> {
        let steps = self.effective_steps();
        let mut handlers = HandlerRegistry::new();
        let mut descriptors = Vec::with_capacity(steps.len() + 1);

        for step in &steps {
            if let Some(handler) = step.handler()? {
                handlers.register(step.id.clone(), Arc::new(handler));
            }
            descriptors.push(step.descriptor());
        }
        descriptors.push(StepDescriptor::finalize());

        Ok((StepRegistry::register(descriptors)?, handlers))
    }

    /// Open the configured store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the storage directory cannot be created.
    pub async fn open_store(&self) -> Result<Arc<dyn PipelineStore>, Error> {
        match &self.storage {
            StorageConfig::Memory => Ok(Arc::new(InMemoryStore::new())),
            StorageConfig::Directory { path } => {
                info!(path = %path.display(), "Using directory storage");
                Ok(Arc::new(DirectoryStore::open(path.clone()).await?))
            }
        }
    }
}

/// Two-step greeting: a name, then a greeting pre-filled from it.
fn greeting_steps() -> Vec<StepConfig> {
    vec![
        StepConfig {
            id: "name".to_string(),
            label: Some("Your name".to_string()),
            refill: true,
            ..StepConfig::default()
        },
        StepConfig {
            id: "greeting".to_string(),
            label: Some("Greeting".to_string()),
            template: Some("Hello {value}!".to_string()),
            ..StepConfig::default()
        },
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_web_config_default() {
        let config = WebConfig::default();
        assert_eq!(config.bind_address, "127.0.0.1:3000");
        assert_eq!(config.app_name, "hello");
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.finalize_policy, FinalizePolicy::RequireComplete);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() -> Result<(), Error> {
        let config = WebConfig::from_toml_str(
            r#"
            app_name = "signup"
            finalize_policy = "allow_incomplete"

            [storage]
            backend = "directory"
            path = "/var/lib/stepline"

            [[steps]]
            id = "email"
            kind = "pattern"
            pattern = "^[^@]+@[^@]+$"
            message = "Enter an email address"

            [[steps]]
            id = "nickname"
            refill = true
            template = "{value}"
            "#,
        )?;

        assert_eq!(config.app_name, "signup");
        assert_eq!(config.finalize_policy, FinalizePolicy::AllowIncomplete);
        assert_eq!(
            config.storage,
            StorageConfig::Directory {
                path: PathBuf::from("/var/lib/stepline")
            }
        );
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.bind_address, "127.0.0.1:3000");

        let (registry, handlers) = config.build_registry()?;
        assert_eq!(registry.len(), 3);
        assert!(handlers.has("email"));
        assert!(!handlers.has("nickname"));
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<(), Error> {
        let config = WebConfig::default().apply_env(env(&[
            (ENV_BIND, "0.0.0.0:8080"),
            (ENV_APP, "survey"),
            (ENV_DATA_DIR, "/tmp/pipelines"),
            (ENV_FINALIZE_POLICY, "allow-incomplete"),
        ]))?;

        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.app_name, "survey");
        assert_eq!(
            config.storage,
            StorageConfig::Directory {
                path: PathBuf::from("/tmp/pipelines")
            }
        );
        assert_eq!(config.finalize_policy, FinalizePolicy::AllowIncomplete);
        Ok(())
    }

    #[test]
    fn test_env_rejects_unknown_policy() {
        let result = WebConfig::default().apply_env(env(&[(ENV_FINALIZE_POLICY, "sometimes")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_default_greeting_registry() -> Result<(), Error> {
        let (registry, _) = WebConfig::default().build_registry()?;
        let ids: Vec<&str> = registry.steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["name", "greeting", "finalize"]);
        Ok(())
    }

    #[test]
    fn test_pattern_step_requires_pattern() {
        let config = WebConfig {
            steps: vec![StepConfig {
                id: "code".to_string(),
                kind: StepKind::Pattern,
                ..StepConfig::default()
            }],
            ..WebConfig::default()
        };
        assert!(matches!(config.build_registry(), Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_step_is_engine_error() {
        let step = StepConfig {
            id: "a".to_string(),
            ..StepConfig::default()
        };
        let config = WebConfig {
            steps: vec![step.clone(), step],
            ..WebConfig::default()
        };
        assert!(matches!(config.build_registry(), Err(Error::Engine(_))));
    }

    #[test]
    fn test_validate_app_name() {
        for bad in ["", "has space", "a/b", "health"] {
            let config = WebConfig {
                app_name: bad.to_string(),
                ..WebConfig::default()
            };
            assert!(config.validate().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_validate_app_name_length() {
        let longest = WebConfig {
            app_name: "a".repeat(MAX_APP_NAME_LEN),
            ..WebConfig::default()
        };
        assert!(longest.validate().is_ok());

        let too_long = WebConfig {
            app_name: "a".repeat(MAX_APP_NAME_LEN + 1),
            ..WebConfig::default()
        };
        assert!(too_long.validate().is_err());
    }
}
