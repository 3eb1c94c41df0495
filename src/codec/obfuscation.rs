//! Reversible Obfuscation
//!
//! **This is not encryption.** The transform XORs the text with a repeating
//! key and base64-encodes the result. Anyone holding this crate (or a few
//! minutes and a stored value) can reverse it. It exists to keep casual
//! readers of the backing store from seeing tokens and user objects in plain
//! text, nothing more.
//!
//! Callers that need confidentiality must layer authenticated encryption on
//! top of the engine as a separate codec step.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

/// Key used when the engine config does not provide one.
pub const DEFAULT_OBFUSCATION_KEY: &str = "stashkv-obfuscation-v1";

/// Errors that can occur while reversing the transform.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ObfuscationError {
    /// The stored text is not valid base64
    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    /// The unmasked bytes are not valid UTF-8
    #[error("invalid UTF-8 after unmasking: {0}")]
    InvalidUtf8(String),
}

/// A reversible, non-confidential text transform.
///
/// # Example
///
/// ```
/// use stashkv::codec::Obfuscator;
///
/// let obfuscator = Obfuscator::default();
/// let masked = obfuscator.obfuscate("tok-123");
/// assert_ne!(masked, "tok-123");
/// assert_eq!(obfuscator.reveal(&masked).unwrap(), "tok-123");
/// ```
#[derive(Debug, Clone)]
pub struct Obfuscator {
    key: Vec<u8>,
}

impl Obfuscator {
    /// Creates an obfuscator with the given key.
    ///
    /// An empty key is replaced by [`DEFAULT_OBFUSCATION_KEY`]; the engine
    /// config rejects empty keys before they get here.
    pub fn new(key: &str) -> Self {
        let key = if key.is_empty() {
            DEFAULT_OBFUSCATION_KEY
        } else {
            key
        };
        Self {
            key: key.as_bytes().to_vec(),
        }
    }

    /// Masks `plain` into printable base64 text.
    pub fn obfuscate(&self, plain: &str) -> String {
        STANDARD.encode(self.mask(plain.as_bytes()))
    }

    /// Reverses [`obfuscate`](Self::obfuscate).
    pub fn reveal(&self, masked: &str) -> Result<String, ObfuscationError> {
        let bytes = STANDARD
            .decode(masked.trim())
            .map_err(|e| ObfuscationError::InvalidBase64(e.to_string()))?;

        String::from_utf8(self.mask(&bytes))
            .map_err(|e| ObfuscationError::InvalidUtf8(e.to_string()))
    }

    /// XOR is its own inverse, so masking and unmasking are the same step.
    fn mask(&self, input: &[u8]) -> Vec<u8> {
        input
            .iter()
            .zip(self.key.iter().cycle())
            .map(|(b, k)| b ^ k)
            .collect()
    }
}

impl Default for Obfuscator {
    fn default() -> Self {
        Self::new(DEFAULT_OBFUSCATION_KEY)
    }
}
