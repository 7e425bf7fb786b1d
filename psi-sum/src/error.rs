//! Error types for the PSI-Sum protocol.

use crate::messages::MessageKind;
use crate::state::ProtocolStage;

/// Errors that can occur during PSI-Sum protocol execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PsiSumError {
    /// Bytes did not decode to a valid group element.
    #[error("invalid group element encoding")]
    InvalidPoint,

    /// A plaintext was not smaller than the Paillier modulus.
    #[error("plaintext out of range for the encryption modulus")]
    PlaintextOutOfRange,

    /// An input value exceeded the configured maximum.
    #[error("value {value} exceeds the configured maximum {max}")]
    ValueOutOfRange { value: u64, max: u64 },

    /// A ciphertext was not well formed under the decryption key.
    #[error("decryption failed: {0}")]
    DecryptionError(String),

    /// Key generation could not produce a suitable key pair.
    #[error("key generation failed: {0}")]
    KeyGenError(String),

    /// A message arrived that the current stage cannot accept.
    #[error("unexpected {message} message at stage {stage}")]
    OutOfOrderMessage {
        stage: ProtocolStage,
        message: MessageKind,
    },

    /// A peer message had the wrong shape or content.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Input data was empty and the configuration forbids it.
    #[error("input data cannot be empty")]
    EmptyInputNotAllowed,

    /// The random source failed.
    #[error("random source failure: {0}")]
    RandomSource(String),
}

/// Broad classification of a [`PsiSumError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid caller input or invalid cryptographic data from the peer.
    Validation,
    /// The peer violated the message sequence or message shape.
    Protocol,
    /// Key generation or the random source ran out of luck or entropy.
    Resource,
}

impl PsiSumError {
    /// Returns the broad class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PsiSumError::InvalidPoint
            | PsiSumError::PlaintextOutOfRange
            | PsiSumError::ValueOutOfRange { .. }
            | PsiSumError::DecryptionError(_)
            | PsiSumError::EmptyInputNotAllowed => ErrorKind::Validation,
            PsiSumError::OutOfOrderMessage { .. } | PsiSumError::MalformedMessage(_) => {
                ErrorKind::Protocol
            }
            PsiSumError::KeyGenError(_) | PsiSumError::RandomSource(_) => ErrorKind::Resource,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        PsiSumError::MalformedMessage(msg.into())
    }
}

impl From<rand::Error> for PsiSumError {
    fn from(err: rand::Error) -> Self {
        PsiSumError::RandomSource(err.to_string())
    }
}

impl From<bincode::Error> for PsiSumError {
    fn from(err: bincode::Error) -> Self {
        // Decoding errors raised by our own `TryFrom` impls reach here as
        // serde custom messages.
        match *err {
            bincode::ErrorKind::Custom(ref msg)
                if *msg == PsiSumError::InvalidPoint.to_string() =>
            {
                PsiSumError::InvalidPoint
            }
            ref other => PsiSumError::MalformedMessage(other.to_string()),
        }
    }
}

/// Result type for PSI-Sum operations.
pub type Result<T> = std::result::Result<T, PsiSumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", PsiSumError::EmptyInputNotAllowed),
            "input data cannot be empty"
        );
        assert_eq!(
            format!("{}", PsiSumError::MalformedMessage("test".to_string())),
            "malformed message: test"
        );
        assert_eq!(
            format!("{}", PsiSumError::ValueOutOfRange { value: 7, max: 5 }),
            "value 7 exceeds the configured maximum 5"
        );
        assert_eq!(
            format!(
                "{}",
                PsiSumError::OutOfOrderMessage {
                    stage: ProtocolStage::Created,
                    message: MessageKind::Round3,
                }
            ),
            "unexpected Round3 message at stage Created"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(PsiSumError::InvalidPoint.kind(), ErrorKind::Validation);
        assert_eq!(
            PsiSumError::DecryptionError("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            PsiSumError::MalformedMessage("x".into()).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(PsiSumError::KeyGenError("x".into()).kind(), ErrorKind::Resource);
        assert_eq!(PsiSumError::RandomSource("x".into()).kind(), ErrorKind::Resource);
    }

    #[test]
    fn test_from_bincode_keeps_invalid_point() {
        let custom: bincode::Error = Box::new(bincode::ErrorKind::Custom(
            PsiSumError::InvalidPoint.to_string(),
        ));
        assert_eq!(PsiSumError::from(custom), PsiSumError::InvalidPoint);

        let other: bincode::Error = Box::new(bincode::ErrorKind::Custom("truncated".into()));
        assert_eq!(
            PsiSumError::from(other),
            PsiSumError::MalformedMessage("truncated".into())
        );
    }

    #[test]
    fn test_result_type() {
        let ok_result: Result<()> = Ok(());
        let err_result: Result<()> = Err(PsiSumError::EmptyInputNotAllowed);
        assert!(ok_result.is_ok());
        assert!(err_result.is_err());
    }
}
