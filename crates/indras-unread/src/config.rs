//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::{UnreadError, UnreadResult};
use crate::message::UserId;
use crate::surface::ReloadOptions;

/// Configuration for the read-state engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// The signed-in user, left out of direct-message participant keys
    pub current_user: Option<UserId>,

    /// Whether reads reported by the server set the narrow-scoped read flag
    /// while a filtered view is active
    pub narrow_flag_on_server_reads: bool,

    /// Reload requested after bankruptcy
    pub reload_after_bankruptcy: ReloadOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            current_user: None,
            narrow_flag_on_server_reads: true,
            reload_after_bankruptcy: ReloadOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Config for a signed-in user with all other settings at their defaults
    pub fn for_user(user: UserId) -> Self {
        Self {
            current_user: Some(user),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> UnreadResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| UnreadError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot express
    pub fn validate(&self) -> UnreadResult<()> {
        if self.current_user == Some(UserId(0)) {
            return Err(UnreadError::InvalidConfig(
                "current_user must be a real user id".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.current_user.is_none());
        assert!(config.narrow_flag_on_server_reads);
        assert!(!config.reload_after_bankruptcy.save_pointer);
        assert!(config.reload_after_bankruptcy.save_narrow);
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(r#"{"current_user": 7}"#).unwrap();
        assert_eq!(config.current_user, Some(UserId(7)));
        assert!(config.narrow_flag_on_server_reads);
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let err = EngineConfig::from_json(r#"{"retry_failed_requests": true}"#).unwrap_err();
        assert!(matches!(err, UnreadError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_zero_user() {
        assert!(EngineConfig::for_user(UserId(0)).validate().is_err());
    }
}
