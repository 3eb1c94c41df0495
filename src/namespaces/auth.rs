//! Authentication state persistence.
//!
//! Keeps the signed-in user object and its access token with a 24-hour
//! lifetime, so a stale sign-in disappears on its own even if the user never
//! signs out.
//!
//! Whether the two entries are obfuscated is up to the engine's
//! [`ObfuscationPolicy`](crate::ObfuscationPolicy). Build the engine with
//! [`auth_obfuscation_policy`](super::auth_obfuscation_policy) (or a policy
//! that covers both keys) to keep them out of plain sight.

use crate::clock::Clock;
use crate::storage::{BackingStore, ReadOptions, StorageEngine, WriteOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Logical key of the signed-in user object.
pub const AUTH_USER_KEY: &str = "auth_user";
/// Logical key of the access token.
pub const AUTH_TOKEN_KEY: &str = "auth_token";
/// Lifetime of a sign-in.
pub const AUTH_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Stores and retrieves the signed-in user and token.
pub struct AuthStore<'a, B, C> {
    engine: &'a StorageEngine<B, C>,
}

impl<'a, B: BackingStore, C: Clock> AuthStore<'a, B, C> {
    /// Create an auth store backed by the given engine.
    ///
    /// Logs a warning if the engine's policy stores the auth keys in plain text.
    pub fn new(engine: &'a StorageEngine<B, C>) -> Self {
        let policy = &engine.config().obfuscation;
        if !policy.applies_to(AUTH_USER_KEY) || !policy.applies_to(AUTH_TOKEN_KEY) {
            warn!(
                prefix = engine.prefix(),
                "Obfuscation policy does not cover the auth keys, sign-ins are stored in plain text"
            );
        }
        Self { engine }
    }

    /// True if the engine stores the token obfuscated.
    pub fn is_obfuscated(&self) -> bool {
        self.engine.config().obfuscation.applies_to(AUTH_TOKEN_KEY)
    }

    fn write_options() -> WriteOptions {
        WriteOptions::ttl(AUTH_TTL)
    }

    fn read_options() -> ReadOptions {
        ReadOptions::default()
    }

    /// Persist both the user and the token.
    ///
    /// If the token cannot be written, the user written just before it is
    /// removed again so no half sign-in is left behind.
    pub fn sign_in<U: Serialize + ?Sized>(&self, user: &U, token: &str) -> bool {
        if !self.save_user(user) {
            return false;
        }
        if !self.save_token(token) {
            self.engine.remove(AUTH_USER_KEY);
            return false;
        }
        debug!("Stored sign-in");
        true
    }

    /// Remove the user and token.
    pub fn sign_out(&self) {
        self.engine.remove(AUTH_USER_KEY);
        self.engine.remove(AUTH_TOKEN_KEY);
        debug!("Cleared sign-in");
    }

    /// Persist the user object.
    pub fn save_user<U: Serialize + ?Sized>(&self, user: &U) -> bool {
        self.engine.set(AUTH_USER_KEY, user, Self::write_options())
    }

    /// Load the user object.
    pub fn user<U: DeserializeOwned>(&self) -> Option<U> {
        self.engine.get(AUTH_USER_KEY, Self::read_options())
    }

    /// Persist the access token.
    pub fn save_token(&self, token: &str) -> bool {
        self.engine.set(AUTH_TOKEN_KEY, token, Self::write_options())
    }

    /// Load the access token.
    pub fn token(&self) -> Option<String> {
        self.engine.get(AUTH_TOKEN_KEY, Self::read_options())
    }

    /// True if both a user and a token are live.
    pub fn is_authenticated(&self) -> bool {
        self.engine.has(AUTH_TOKEN_KEY, Self::read_options())
            && self.engine.has(AUTH_USER_KEY, Self::read_options())
    }
}
