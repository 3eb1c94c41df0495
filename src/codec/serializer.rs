//! Envelope Serialization
//!
//! Turns an [`Envelope`] into the single opaque string the backing store
//! holds, and back.
//!
//! ## Pipeline
//!
//! ```text
//! encode:  Envelope<T> ──serde_json──> JSON text ──(obfuscate?)──> stored string
//! decode:  stored string ──(reveal?)──> JSON text ──serde_json──> Envelope<T> ──validate──> Ok
//! ```
//!
//! The whole envelope is serialized as one unit, so when obfuscation is on the
//! metadata is masked together with the payload.
//!
//! Decoding fails closed: any transform, parse or structural problem yields a
//! [`DecodeError`], never a partially filled envelope.

use crate::codec::envelope::Envelope;
use crate::codec::obfuscation::{ObfuscationError, Obfuscator};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur while decoding a stored string.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// The obfuscation layer could not be reversed
    #[error("obfuscation error: {0}")]
    Obfuscation(#[from] ObfuscationError),

    /// The text is not a JSON envelope of the expected shape
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The envelope parsed but breaks a structural invariant
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(&'static str),
}

/// Error raised when a value cannot be serialized into an envelope.
#[derive(Debug, Error)]
#[error("failed to serialize envelope: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Encodes and decodes envelopes, optionally through the obfuscation layer.
///
/// # Example
///
/// ```
/// use stashkv::codec::{Envelope, EnvelopeCodec, FORMAT_VERSION};
///
/// let codec = EnvelopeCodec::default();
/// let envelope = Envelope::new("dark".to_string(), 1_000, None, FORMAT_VERSION);
///
/// let stored = codec.encode(&envelope, true).unwrap();
/// let decoded: Envelope<String> = codec.decode(&stored, true).unwrap();
/// assert_eq!(decoded, envelope);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCodec {
    obfuscator: Obfuscator,
}

impl EnvelopeCodec {
    /// Creates a codec that uses `obfuscator` for obfuscated entries.
    pub fn new(obfuscator: Obfuscator) -> Self {
        Self { obfuscator }
    }

    /// Serializes the full envelope, obfuscating it if `obfuscate` is set.
    pub fn encode<T: Serialize>(
        &self,
        envelope: &Envelope<T>,
        obfuscate: bool,
    ) -> Result<String, EncodeError> {
        let json = serde_json::to_string(envelope)?;

        if obfuscate {
            Ok(self.obfuscator.obfuscate(&json))
        } else {
            Ok(json)
        }
    }

    /// Parses a stored string back into an envelope.
    ///
    /// `obfuscated` must match the flag the entry was encoded with; the
    /// stored string does not say which mode produced it.
    pub fn decode<T: DeserializeOwned>(
        &self,
        raw: &str,
        obfuscated: bool,
    ) -> Result<Envelope<T>, DecodeError> {
        let json: Cow<'_, str> = if obfuscated {
            Cow::Owned(self.obfuscator.reveal(raw)?)
        } else {
            Cow::Borrowed(raw)
        };

        let envelope: Envelope<T> =
            serde_json::from_str(&json).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        envelope
            .validate()
            .map_err(DecodeError::InvalidEnvelope)?;

        Ok(envelope)
    }
}
