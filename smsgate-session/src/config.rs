use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

const fn default_max_size() -> usize {
    1000
}

/// Configuration for the session cache
///
/// # Examples
///
/// ```ron
/// (
///     max_size: 5000,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Most sessions held before the least recently used one is evicted
    ///
    /// Default: 1000
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
        }
    }
}

impl SessionConfig {
    /// The configured size as a non-zero bound.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] if `max_size` is zero.
    pub fn max_size(&self) -> Result<NonZeroUsize, SessionError> {
        NonZeroUsize::new(self.max_size)
            .ok_or_else(|| SessionError::InvalidConfig("max_size must be at least 1".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults_from_empty_ron() {
        let config: SessionConfig = ron::from_str("()").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.max_size().unwrap().get(), 1000);
    }

    #[test]
    fn test_zero_size_rejected() {
        let config: SessionConfig = ron::from_str("(max_size: 0)").unwrap();
        assert!(matches!(
            config.max_size(),
            Err(SessionError::InvalidConfig(_))
        ));
    }
}
