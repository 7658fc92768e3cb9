//! Error types for PURB construction and decoding.

use thiserror::Error;

/// Errors that can occur while building, assembling or decoding a PURB.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PurbError {
    /// A strict reservation was requested over an occupied byte range.
    ///
    /// Raised for entry points and the payload only; it points at a sizing bug.
    #[error("allocation conflict on [{start}, {end}) for {tag}")]
    AllocationConflict {
        /// First byte of the rejected range.
        start: usize,
        /// One past the last byte of the rejected range.
        end: usize,
        /// Tag of the rejected reservation.
        tag: String,
    },

    /// A suite has no usable entry in the suite info map.
    #[error("suite coverage error: {0}")]
    SuiteCoverage(String),

    /// No candidate cornerstone / entry point combination opened the payload.
    #[error("decryption failure")]
    DecryptionFailure,

    /// Key material was rejected by the suite's key agreement.
    #[error("key agreement failure: {0}")]
    KeyAgreementFailure(&'static str),

    /// A PURB needs at least one recipient.
    #[error("no recipients")]
    NoRecipients,

    /// An input has an invalid length or value.
    #[error("malformed field: {0}")]
    Malformed(&'static str),

    /// The container was used before the named build phase ran.
    #[error("incomplete container: {0} has not run")]
    Incomplete(&'static str),

    /// CBOR serialization or deserialization error.
    #[error("serialization error: {0}")]
    Ser(String),
}
