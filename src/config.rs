//! Engine Configuration
//!
//! An [`EngineConfig`] fixes everything about an engine instance that must
//! not change while it runs: the namespace prefix, the default TTL, the
//! envelope format version, and which keys are stored obfuscated.
//!
//! Configuration mistakes are programmer errors and are reported once, at
//! construction time, as a [`ConfigError`].

use crate::codec::{DEFAULT_OBFUSCATION_KEY, FORMAT_VERSION};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Default namespace prefix.
pub const DEFAULT_PREFIX: &str = "stashkv_";

/// Default TTL applied when a write does not choose one (24 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors raised by [`EngineConfig::validate`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// An empty prefix would make the namespace cover the whole backing store
    #[error("namespace prefix must not be empty")]
    EmptyPrefix,

    /// Every envelope needs a version to compare against
    #[error("format version must not be empty")]
    EmptyFormatVersion,

    /// The obfuscation key must contain at least one byte
    #[error("obfuscation key must not be empty")]
    EmptyObfuscationKey,
}

/// Declares which logical keys are stored obfuscated.
///
/// This is the single source of truth for a key's storage mode. Writes and
/// reads that leave their obfuscation flag unset use it, a write whose
/// explicit flag disagrees with it is refused, and cleanup/diagnostics decode
/// every entry with it.
///
/// # Example
///
/// ```
/// use stashkv::ObfuscationPolicy;
///
/// let policy = ObfuscationPolicy::keys(["auth_token"]).with_prefixes(["session_"]);
/// assert!(policy.applies_to("auth_token"));
/// assert!(policy.applies_to("session_nonce"));
/// assert!(!policy.applies_to("theme"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ObfuscationPolicy {
    /// No key is obfuscated
    #[default]
    Never,
    /// Every key is obfuscated
    Always,
    /// Keys listed exactly, or starting with one of the prefixes, are obfuscated
    Matching {
        /// Exact logical key names
        keys: BTreeSet<String>,
        /// Logical key prefixes
        prefixes: BTreeSet<String>,
    },
}

impl ObfuscationPolicy {
    /// Builds a policy covering exactly the given key names.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Never.with_keys(keys)
    }

    /// Builds a policy covering every key that starts with one of `prefixes`.
    pub fn prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Never.with_prefixes(prefixes)
    }

    /// Adds exact key names. `Always` is left as it is.
    pub fn with_keys<I, S>(self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Self::Always => Self::Always,
            Self::Never => Self::Matching {
                keys: extra.into_iter().map(Into::into).collect(),
                prefixes: BTreeSet::new(),
            },
            Self::Matching { mut keys, prefixes } => {
                keys.extend(extra.into_iter().map(Into::into));
                Self::Matching { keys, prefixes }
            }
        }
    }

    /// Adds key prefixes. `Always` is left as it is.
    pub fn with_prefixes<I, S>(self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Self::Always => Self::Always,
            Self::Never => Self::Matching {
                keys: BTreeSet::new(),
                prefixes: extra.into_iter().map(Into::into).collect(),
            },
            Self::Matching { keys, mut prefixes } => {
                prefixes.extend(extra.into_iter().map(Into::into));
                Self::Matching { keys, prefixes }
            }
        }
    }

    /// Returns true if `key` is stored obfuscated under this policy.
    pub fn applies_to(&self, key: &str) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Matching { keys, prefixes } => {
                keys.contains(key) || prefixes.iter().any(|p| key.starts_with(p.as_str()))
            }
        }
    }
}

/// Configuration for a storage engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prepended to every logical key (default: "stashkv_")
    pub prefix: String,

    /// TTL for writes that don't specify one (None = never expire)
    pub default_ttl: Option<Duration>,

    /// Format version stamped on new envelopes and required on reads
    pub format_version: String,

    /// Key for the obfuscation transform
    pub obfuscation_key: String,

    /// Which keys are stored obfuscated by default
    pub obfuscation: ObfuscationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            default_ttl: Some(DEFAULT_TTL),
            format_version: FORMAT_VERSION.to_string(),
            obfuscation_key: DEFAULT_OBFUSCATION_KEY.to_string(),
            obfuscation: ObfuscationPolicy::Never,
        }
    }
}

impl EngineConfig {
    /// Creates a default config under the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Sets the default TTL (None = never expire).
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the envelope format version.
    pub fn with_format_version(mut self, version: impl Into<String>) -> Self {
        self.format_version = version.into();
        self
    }

    /// Sets the obfuscation key.
    pub fn with_obfuscation_key(mut self, key: impl Into<String>) -> Self {
        self.obfuscation_key = key.into();
        self
    }

    /// Sets the obfuscation policy.
    pub fn with_obfuscation(mut self, policy: ObfuscationPolicy) -> Self {
        self.obfuscation = policy;
        self
    }

    /// Checks the config for misuse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self.format_version.is_empty() {
            return Err(ConfigError::EmptyFormatVersion);
        }
        if self.obfuscation_key.is_empty() {
            return Err(ConfigError::EmptyObfuscationKey);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prefix, DEFAULT_PREFIX);
        assert_eq!(config.default_ttl, Some(DEFAULT_TTL));
        assert_eq!(config.format_version, FORMAT_VERSION);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new("app_")
            .with_default_ttl(None)
            .with_format_version("2.0")
            .with_obfuscation(ObfuscationPolicy::Always);

        assert_eq!(config.prefix, "app_");
        assert_eq!(config.default_ttl, None);
        assert_eq!(config.format_version, "2.0");
        assert_eq!(config.obfuscation, ObfuscationPolicy::Always);
    }

    #[test]
    fn test_validate_rejects_misuse() {
        assert_eq!(
            EngineConfig::new("").validate(),
            Err(ConfigError::EmptyPrefix)
        );
        assert_eq!(
            EngineConfig::new("a_").with_format_version("").validate(),
            Err(ConfigError::EmptyFormatVersion)
        );
        assert_eq!(
            EngineConfig::new("a_").with_obfuscation_key("").validate(),
            Err(ConfigError::EmptyObfuscationKey)
        );
    }

    #[test]
    fn test_policy() {
        assert!(!ObfuscationPolicy::Never.applies_to("auth_token"));
        assert!(ObfuscationPolicy::Always.applies_to("theme"));

        let policy = ObfuscationPolicy::keys(["auth_user", "auth_token"]);
        assert!(policy.applies_to("auth_token"));
        assert!(!policy.applies_to("theme"));
        assert!(!policy.applies_to("auth_token_old"));
    }

    #[test]
    fn test_policy_prefixes() {
        let policy = ObfuscationPolicy::prefixes(["session_"]).with_keys(["auth_token"]);
        assert!(policy.applies_to("session_"));
        assert!(policy.applies_to("session_cart"));
        assert!(policy.applies_to("auth_token"));
        assert!(!policy.applies_to("my_session_cart"));
        assert!(!policy.applies_to("theme"));

        // Always stays total
        assert_eq!(
            ObfuscationPolicy::Always.with_prefixes(["x_"]),
            ObfuscationPolicy::Always
        );
    }
}
