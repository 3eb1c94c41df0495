//! Envelope Codec
//!
//! This module turns logical values into the strings a backing store holds.
//!
//! ## Modules
//!
//! - `envelope`: The versioned, timestamped, expiring wrapper format
//! - `obfuscation`: A reversible, non-confidential text transform
//! - `serializer`: JSON encoding/decoding of envelopes, with optional obfuscation
//!
//! ## Example
//!
//! ```
//! use stashkv::codec::{Envelope, EnvelopeCodec, FORMAT_VERSION};
//!
//! let codec = EnvelopeCodec::default();
//! let envelope = Envelope::new(vec![1, 2, 3], 1_000, Some(60_000), FORMAT_VERSION);
//!
//! let stored = codec.encode(&envelope, false).unwrap();
//! let decoded: Envelope<Vec<i32>> = codec.decode(&stored, false).unwrap();
//! assert_eq!(decoded.payload, vec![1, 2, 3]);
//! ```

pub mod envelope;
pub mod obfuscation;
pub mod serializer;

// Re-export commonly used types for convenience
pub use envelope::{Envelope, FORMAT_VERSION};
pub use obfuscation::{ObfuscationError, Obfuscator, DEFAULT_OBFUSCATION_KEY};
pub use serializer::{DecodeError, EncodeError, EnvelopeCodec};
