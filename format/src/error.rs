use thiserror::Error;

/// Failures of the value-type validator and the literal parser.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariantError {
    #[error("invalid type string '{0}'")]
    InvalidSignature(String),

    #[error("cannot parse a value of indefinite type '{0}'")]
    IndefiniteType(String),

    /// The literal is malformed or does not have exactly the expected type.
    #[error("cannot parse '{text}' as a value of type '{expected}': {reason}")]
    Mismatch {
        text:     String,
        expected: String,
        reason:   String,
    },
}
