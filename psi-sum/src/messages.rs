//! Message types exchanged between the two PSI-Sum roles.

use crate::error::Result;
use crate::group::GroupElement;
use crate::paillier::{Ciphertext, PublicKey};
use bincode::Options;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on an encoded [`ProtocolMessage`].
pub const MAX_MESSAGE_BYTES: u64 = 1 << 30;

/// Party2's public key, sent before Round 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupMessage {
    pub public_key: PublicKey,
}

/// Party1's masked identifiers, in shuffled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round1Message {
    pub elements: Vec<GroupElement>,
}

impl Round1Message {
    /// Returns the number of masked identifiers.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if this message carries no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Party2's reply.
///
/// `doubly_masked` is the set `Z`; `masked_pairs` carries one
/// `(masked identifier, encrypted value)` pair per Party2 input. The two are
/// shuffled independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round2Message {
    pub doubly_masked: Vec<GroupElement>,
    pub masked_pairs: Vec<(GroupElement, Ciphertext)>,
}

/// Party1's disclosure of the intersection size and the encrypted sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round3Message {
    pub cardinality: u64,
    pub sum: Ciphertext,
}

/// Tag of a [`ProtocolMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Setup,
    Round1,
    Round2,
    Round3,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Envelope for transports that dispatch on the message tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolMessage {
    Setup(SetupMessage),
    Round1(Round1Message),
    Round2(Round2Message),
    Round3(Round3Message),
}

impl ProtocolMessage {
    /// The tag of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            ProtocolMessage::Setup(_) => MessageKind::Setup,
            ProtocolMessage::Round1(_) => MessageKind::Round1,
            ProtocolMessage::Round2(_) => MessageKind::Round2,
            ProtocolMessage::Round3(_) => MessageKind::Round3,
        }
    }

    /// Encode for transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(wire_options().serialize(self)?)
    }

    /// Decode from transport, validating every group element and the
    /// canonical form of every integer.
    ///
    /// # Errors
    /// Returns `PsiSumError::InvalidPoint` if a group element does not
    /// decode, and `PsiSumError::MalformedMessage` for any other problem.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(wire_options().deserialize(bytes)?)
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_MESSAGE_BYTES)
}

impl From<SetupMessage> for ProtocolMessage {
    fn from(message: SetupMessage) -> Self {
        ProtocolMessage::Setup(message)
    }
}

impl From<Round1Message> for ProtocolMessage {
    fn from(message: Round1Message) -> Self {
        ProtocolMessage::Round1(message)
    }
}

impl From<Round2Message> for ProtocolMessage {
    fn from(message: Round2Message) -> Self {
        ProtocolMessage::Round2(message)
    }
}

impl From<Round3Message> for ProtocolMessage {
    fn from(message: Round3Message) -> Self {
        ProtocolMessage::Round3(message)
    }
}

/// Final result of the PSI-Sum protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsiSumOutput {
    /// Size of the intersection as disclosed by Party1.
    pub cardinality: u64,
    /// Sum of Party2's values over the intersection.
    pub sum: BigUint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PsiSumError};
    use crate::group::{hash_to_group, GroupElement};

    fn element(label: &[u8]) -> GroupElement {
        hash_to_group(b"messages-test", label)
    }

    #[test]
    fn test_round1_message_len() {
        let msg = Round1Message {
            elements: vec![element(b"a"), element(b"b")],
        };
        assert_eq!(msg.len(), 2);
        assert!(!msg.is_empty());
        assert!(Round1Message { elements: vec![] }.is_empty());
    }

    #[test]
    fn test_message_kind() {
        let msg: ProtocolMessage = Round1Message { elements: vec![] }.into();
        assert_eq!(msg.kind(), MessageKind::Round1);
        assert_eq!(MessageKind::Round3.to_string(), "Round3");
    }

    #[test]
    fn test_wire_round_trip() {
        let msg: ProtocolMessage = Round1Message {
            elements: vec![element(b"a"), element(b"b"), GroupElement::identity()],
        }
        .into();
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(ProtocolMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_wire_rejects_invalid_point() {
        let msg: ProtocolMessage = Round1Message {
            elements: vec![element(b"a")],
        }
        .into();
        let mut bytes = msg.to_bytes().unwrap();
        // The encoded point occupies the final 32 bytes.
        let len = bytes.len();
        bytes[len - 32..].copy_from_slice(&[0xff; 32]);
        let err = ProtocolMessage::from_bytes(&bytes).unwrap_err();
        assert_eq!(err, PsiSumError::InvalidPoint);
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_wire_rejects_garbage() {
        assert!(matches!(
            ProtocolMessage::from_bytes(&[0xde, 0xad, 0xbe, 0xef]),
            Err(PsiSumError::MalformedMessage(_))
        ));
        assert!(ProtocolMessage::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_wire_rejects_trailing_bytes() {
        let msg: ProtocolMessage = Round1Message { elements: vec![] }.into();
        let mut bytes = msg.to_bytes().unwrap();
        bytes.push(0);
        assert!(ProtocolMessage::from_bytes(&bytes).is_err());
    }
}
