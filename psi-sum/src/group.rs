//! Ristretto255 group primitive: hash-to-group, masking and canonical encoding.

use crate::error::{PsiSumError, Result};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::traits::{Identity, IsIdentity};
use curve25519_dalek::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;
use std::hash::{Hash, Hasher};
use zeroize::Zeroize;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Length of a canonically encoded group element.
pub const ENCODED_LEN: usize = 32;

/// An element of the prime-order Ristretto255 group.
///
/// Every value of this type is a valid group element: the only way to build
/// one from untrusted bytes is [`GroupElement::from_bytes`], which rejects
/// non-canonical and off-group encodings.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "[u8; 32]", try_from = "[u8; 32]")]
pub struct GroupElement(RistrettoPoint);

impl GroupElement {
    /// The group identity.
    pub fn identity() -> Self {
        GroupElement(RistrettoPoint::identity())
    }

    /// Returns true if this is the group identity.
    pub fn is_identity(&self) -> bool {
        self.0.is_identity()
    }

    /// Multiply this element by a private scalar.
    ///
    /// For any element `e` and scalars `a`, `b`, `e·a·b == e·b·a`.
    pub fn scalar_mul(&self, scalar: &GroupScalar) -> GroupElement {
        GroupElement(scalar.0 * self.0)
    }

    /// Canonical 32-byte encoding.
    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        self.0.compress().to_bytes()
    }

    /// Decode a canonical encoding.
    ///
    /// # Errors
    /// Returns `PsiSumError::InvalidPoint` if `bytes` is not exactly 32 bytes
    /// or does not encode a Ristretto255 element.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; ENCODED_LEN] = bytes.try_into().map_err(|_| PsiSumError::InvalidPoint)?;
        CompressedRistretto(array)
            .decompress()
            .map(GroupElement)
            .ok_or(PsiSumError::InvalidPoint)
    }
}

impl Hash for GroupElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl fmt::Debug for GroupElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        write!(f, "GroupElement(")?;
        for byte in &bytes[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

impl From<GroupElement> for [u8; ENCODED_LEN] {
    fn from(element: GroupElement) -> Self {
        element.to_bytes()
    }
}

impl TryFrom<[u8; ENCODED_LEN]> for GroupElement {
    type Error = PsiSumError;

    fn try_from(bytes: [u8; ENCODED_LEN]) -> Result<Self> {
        GroupElement::from_bytes(&bytes)
    }
}

/// A private exponent in `[1, ℓ − 1]`.
///
/// Neither `Clone` nor serializable; zeroized on drop.
pub struct GroupScalar(Scalar);

impl GroupScalar {
    /// Sample a fresh non-zero scalar from a cryptographically secure source.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let scalar = Scalar::random(rng);
            if scalar != Scalar::ZERO {
                return GroupScalar(scalar);
            }
        }
    }
}

impl fmt::Debug for GroupScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GroupScalar(<redacted>)")
    }
}

impl Drop for GroupScalar {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Deterministically map an identifier to a group element.
///
/// The domain tag is length-prefixed so that `(domain, identifier)` pairs
/// cannot collide by shifting bytes between the two.
pub fn hash_to_group(domain: &[u8], identifier: &[u8]) -> GroupElement {
    let hasher = Sha512::new()
        .chain_update((domain.len() as u64).to_be_bytes())
        .chain_update(domain)
        .chain_update(identifier);
    GroupElement(RistrettoPoint::from_hash(hasher))
}

/// Hash every identifier to the group and mask it with `scalar`.
///
/// Output order follows input order; callers shuffle explicitly.
pub(crate) fn mask_identifiers(
    domain: &[u8],
    identifiers: &[Vec<u8>],
    scalar: &GroupScalar,
) -> Vec<GroupElement> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            let iter = identifiers.par_iter();
        } else {
            let iter = identifiers.iter();
        }
    }

    iter.map(|identifier| hash_to_group(domain, identifier).scalar_mul(scalar))
        .collect()
}

/// Mask every element with `scalar`, preserving order.
pub(crate) fn mask_elements(elements: &[GroupElement], scalar: &GroupScalar) -> Vec<GroupElement> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            let iter = elements.par_iter();
        } else {
            let iter = elements.iter();
        }
    }

    iter.map(|element| element.scalar_mul(scalar)).collect()
}
