//! Typed Consumer Namespaces
//!
//! Small facades that borrow a [`StorageEngine`](crate::StorageEngine) and
//! fix the keys and lifetimes for one kind of data, so callers don't have to
//! repeat them (or get them inconsistent) at every call site.
//!
//! | Store             | Keys                       | Intended mode | TTL        |
//! |-------------------|----------------------------|---------------|------------|
//! | `AuthStore`       | `auth_user`, `auth_token`  | obfuscated    | 24 hours   |
//! | `PreferenceStore` | caller-chosen, `theme`     | plain         | 365 days   |
//! | `SessionStore`    | `session_*`                | per key       | per write  |
//!
//! None of them hard-codes a storage mode: every entry is written and read
//! in the mode the engine's [`ObfuscationPolicy`](crate::ObfuscationPolicy)
//! assigns, which is also the mode cleanup and diagnostics decode with. Use
//! [`auth_obfuscation_policy`] to obfuscate the auth keys.

pub mod auth;
pub mod preferences;
pub mod session;

pub use auth::{AuthStore, AUTH_TOKEN_KEY, AUTH_TTL, AUTH_USER_KEY};
pub use preferences::{PreferenceStore, PREFERENCE_TTL, THEME_KEY};
pub use session::{SessionStore, SESSION_KEY_PREFIX};

use crate::config::ObfuscationPolicy;

/// An obfuscation policy covering the keys [`AuthStore`] writes.
pub fn auth_obfuscation_policy() -> ObfuscationPolicy {
    ObfuscationPolicy::keys([AUTH_USER_KEY, AUTH_TOKEN_KEY])
}
