//! Queue configuration

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Queue configuration
///
/// # Example
///
/// ```
/// use everruns_queue::QueueConfig;
///
/// let config = QueueConfig::new(4)
///     .with_name("thumbnails")
///     .with_preallocate(16);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueConfig {
    /// Name used in logs and status reports
    pub name: String,

    /// Maximum number of tasks in flight at once
    pub concurrency: usize,

    /// Number of task nodes to allocate up front
    #[serde(default)]
    pub preallocate: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "queue".to_string(),
            concurrency: 1,
            preallocate: 0,
        }
    }
}

impl QueueConfig {
    /// Create a configuration with the given concurrency
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    /// Set the queue name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the concurrency limit
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set how many task nodes to allocate up front
    pub fn with_preallocate(mut self, nodes: usize) -> Self {
        self.preallocate = nodes;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.concurrency == 0 {
            return Err(QueueError::InvalidConcurrency(self.concurrency));
        }
        Ok(())
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `QUEUE_NAME`: Queue name (default: queue)
    /// - `QUEUE_CONCURRENCY`: Maximum tasks in flight (default: 1)
    /// - `QUEUE_PREALLOCATE`: Task nodes allocated up front (default: 0)
    pub fn from_env() -> Result<Self, QueueError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, QueueError> {
        let defaults = Self::default();

        let config = Self {
            name: lookup("QUEUE_NAME").unwrap_or(defaults.name),
            concurrency: parse_count(&lookup, "QUEUE_CONCURRENCY")?
                .unwrap_or(defaults.concurrency),
            preallocate: parse_count(&lookup, "QUEUE_PREALLOCATE")?
                .unwrap_or(defaults.preallocate),
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_count(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<usize>, QueueError> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<usize>()
                .map_err(|e| QueueError::InvalidConfig(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.name, "queue");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.preallocate, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = QueueConfig::new(2)
            .with_name("mailer")
            .with_concurrency(8)
            .with_preallocate(32);

        assert_eq!(config.name, "mailer");
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.preallocate, 32);
    }

    #[test]
    fn test_zero_concurrency_is_invalid() {
        let config = QueueConfig::new(0);
        assert_eq!(config.validate(), Err(QueueError::InvalidConcurrency(0)));
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = QueueConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = QueueConfig::from_lookup(lookup_from(&[
            ("QUEUE_NAME", "ingest"),
            ("QUEUE_CONCURRENCY", " 6 "),
            ("QUEUE_PREALLOCATE", "12"),
        ]))
        .unwrap();

        assert_eq!(config.name, "ingest");
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.preallocate, 12);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = QueueConfig::from_lookup(lookup_from(&[("QUEUE_CONCURRENCY", "many")]))
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidConfig(msg) if msg.contains("QUEUE_CONCURRENCY")));
    }

    #[test]
    fn test_from_lookup_rejects_zero_concurrency() {
        let err =
            QueueConfig::from_lookup(lookup_from(&[("QUEUE_CONCURRENCY", "0")])).unwrap_err();
        assert_eq!(err, QueueError::InvalidConcurrency(0));
    }

    #[test]
    fn test_serialization() {
        let config = QueueConfig::new(3).with_name("serde");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: QueueConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);

        let parsed: QueueConfig =
            serde_json::from_str(r#"{"name":"short","concurrency":2}"#).unwrap();
        assert_eq!(parsed.preallocate, 0);
    }
}
