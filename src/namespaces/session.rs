//! Ad hoc session data.
//!
//! A thin layer over the engine for short-lived values whose lifetime the
//! caller chooses per write. Keys are grouped under a `session_` sub-prefix
//! so the whole session can be dropped at once.
//!
//! Obfuscation is chosen per key through the engine's
//! [`ObfuscationPolicy`](crate::ObfuscationPolicy), e.g.
//! `ObfuscationPolicy::prefixes(["session_"])` for every session value or
//! `ObfuscationPolicy::keys(["session_nonce"])` for a single one. A write
//! whose flag disagrees with the policy is refused.

use crate::clock::Clock;
use crate::storage::{BackingStore, ReadOptions, StorageEngine, Ttl, WriteOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Sub-prefix of session keys within the engine's namespace.
pub const SESSION_KEY_PREFIX: &str = "session_";

/// Stores and retrieves session-scoped values.
pub struct SessionStore<'a, B, C> {
    engine: &'a StorageEngine<B, C>,
}

impl<'a, B: BackingStore, C: Clock> SessionStore<'a, B, C> {
    /// Create a session store backed by the given engine.
    pub fn new(engine: &'a StorageEngine<B, C>) -> Self {
        Self { engine }
    }

    /// Build the engine key for a session value.
    fn session_key(&self, key: &str) -> String {
        format!("{}{}", SESSION_KEY_PREFIX, key)
    }

    /// True if the engine stores this session value obfuscated.
    pub fn is_obfuscated(&self, key: &str) -> bool {
        self.engine
            .config()
            .obfuscation
            .applies_to(&self.session_key(key))
    }

    /// Persist a value.
    ///
    /// A `ttl` of `None` uses the engine's default TTL. `obfuscate` of
    /// `None` follows the policy; an explicit flag must agree with it or the
    /// write is refused and `false` is returned.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        obfuscate: Option<bool>,
    ) -> bool {
        let options = WriteOptions {
            ttl: ttl.map(Ttl::After),
            obfuscate,
        };
        self.engine.set(&self.session_key(key), value, options)
    }

    /// Load a value in the mode the policy assigns to it.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.engine
            .get(&self.session_key(key), ReadOptions::default())
    }

    /// Remove a value.
    pub fn remove(&self, key: &str) {
        self.engine.remove(&self.session_key(key));
    }

    /// Remove every session value. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let keys: Vec<String> = self
            .engine
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(SESSION_KEY_PREFIX))
            .collect();

        for key in &keys {
            self.engine.remove(key);
        }
        keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{EngineConfig, ObfuscationPolicy};
    use crate::storage::MemoryBackend;

    fn engine_with(
        policy: ObfuscationPolicy,
    ) -> (StorageEngine<MemoryBackend, ManualClock>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let config = EngineConfig::new("app_").with_obfuscation(policy);
        let engine = StorageEngine::with_clock(config, MemoryBackend::new(), clock.clone()).unwrap();
        (engine, clock)
    }

    fn engine() -> (StorageEngine<MemoryBackend, ManualClock>, ManualClock) {
        engine_with(ObfuscationPolicy::Never)
    }

    #[test]
    fn test_set_get() {
        let (engine, _) = engine();
        let session = SessionStore::new(&engine);

        assert!(session.set("cart", &vec![1, 2, 3], None, None));
        assert!(session.set("note", "abc", Some(Duration::from_secs(60)), Some(false)));

        assert_eq!(session.get::<Vec<i32>>("cart"), Some(vec![1, 2, 3]));
        assert_eq!(session.get::<String>("note"), Some("abc".to_string()));
        assert!(engine.backend().get("app_session_cart").unwrap().is_some());
    }

    #[test]
    fn test_obfuscation_follows_policy_prefix() {
        let (engine, _) = engine_with(ObfuscationPolicy::prefixes([SESSION_KEY_PREFIX]));
        let session = SessionStore::new(&engine);
        engine.set("theme", "dark", WriteOptions::default());

        assert!(session.is_obfuscated("nonce"));
        assert!(session.set("nonce", "abc", None, Some(true)));

        let raw = engine.backend().get("app_session_nonce").unwrap().unwrap();
        assert!(!raw.contains("abc"));
        assert_eq!(session.get::<String>("nonce"), Some("abc".to_string()));

        assert_eq!(engine.cleanup(), 0);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_flag_against_policy_is_refused() {
        let (engine, _) = engine();
        let session = SessionStore::new(&engine);

        assert!(!session.is_obfuscated("nonce"));
        assert!(!session.set("nonce", "abc", None, Some(true)));
        assert_eq!(session.get::<String>("nonce"), None);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_caller_chosen_ttl() {
        let (engine, clock) = engine();
        let session = SessionStore::new(&engine);

        session.set("flash", "saved!", Some(Duration::from_secs(5)), None);
        clock.advance_ms(6_000);
        assert_eq!(session.get::<String>("flash"), None);
    }

    #[test]
    fn test_clear_only_touches_session_keys() {
        let (engine, _) = engine_with(ObfuscationPolicy::keys(["session_b"]));
        let session = SessionStore::new(&engine);

        engine.set("theme", "dark", WriteOptions::default());
        session.set("a", "1", None, None);
        session.set("b", "2", None, Some(true));

        assert_eq!(session.clear(), 2);
        assert_eq!(engine.keys(), vec!["theme".to_string()]);
    }

    #[test]
    fn test_remove() {
        let (engine, _) = engine();
        let session = SessionStore::new(&engine);

        session.set("a", "1", None, None);
        session.remove("a");
        assert_eq!(session.get::<String>("a"), None);
    }
}
