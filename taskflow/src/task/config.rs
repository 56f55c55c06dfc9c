//! Serializable task configuration.

use serde::{Deserialize, Serialize};

use super::RetryConfig;
use crate::errors::TaskflowError;

/// Name and retry policy for a task, typically loaded from a config file.
///
/// ```rust
/// use taskflow::task::TaskConfig;
///
/// let config = TaskConfig::from_json_str(
///     r#"{"name": "fetch-items", "retry": {"max_attempts": 5, "base_delay_ms": 3000}}"#,
/// ).unwrap();
/// assert_eq!(config.retry.max_attempts, 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name used in logs and events.
    #[serde(default)]
    pub name: String,
    /// Retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl TaskConfig {
    /// Creates a configuration with no retries.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, TaskflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks the name and retry policy.
    pub fn validate(&self) -> Result<(), TaskflowError> {
        if self.name.trim().is_empty() {
            return Err(TaskflowError::InvalidName);
        }
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_config() {
        let config = TaskConfig::from_json_str(
            r#"{"name": "save-todos", "retry": {"max_attempts": 2, "base_delay_ms": 1000}}"#,
        )
        .unwrap();

        assert_eq!(
            config,
            TaskConfig::new("save-todos").with_retry(RetryConfig::new(2, 1000))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_retry_defaults_to_none() {
        let config = TaskConfig::from_json_str(r#"{"name": "reset"}"#).unwrap();
        assert_eq!(config.retry, RetryConfig::none());
    }

    #[test]
    fn test_invalid_json() {
        let err = TaskConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, TaskflowError::Config(_)));
    }

    #[test]
    fn test_blank_name_rejected() {
        let config = TaskConfig::new("   ");
        assert_eq!(config.validate(), Err(TaskflowError::InvalidName));
    }
}
