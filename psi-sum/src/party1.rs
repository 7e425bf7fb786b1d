//! Party1: holds identifiers, learns the intersection size.

use crate::config::ProtocolConfig;
use crate::error::{PsiSumError, Result};
use crate::group::{mask_elements, mask_identifiers, GroupElement, GroupScalar};
use crate::messages::{Round1Message, Round2Message, Round3Message, SetupMessage};
use crate::paillier::Ciphertext;
use crate::shuffle::shuffle;
use crate::state::{party1, ProtocolStage, State};
use rand::{CryptoRng, RngCore};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, instrument};

/// The identifier-holding role.
pub struct Party1<S: State = party1::Created> {
    config: ProtocolConfig,
    state: S,
}

impl Party1 {
    /// Create Party1 from its identifiers.
    ///
    /// Duplicates are kept; each copy matches independently.
    ///
    /// # Errors
    /// Returns `PsiSumError::EmptyInputNotAllowed` if `identifiers` is empty
    /// and the configuration forbids it.
    pub fn new(config: ProtocolConfig, identifiers: Vec<Vec<u8>>) -> Result<Self> {
        if identifiers.is_empty() && !config.allow_empty_input {
            return Err(PsiSumError::EmptyInputNotAllowed);
        }
        Ok(Self {
            config,
            state: party1::Created { identifiers },
        })
    }
}

impl<S: State> Party1<S> {
    /// Current stage.
    pub fn stage(&self) -> ProtocolStage {
        S::STAGE
    }

    /// The configuration this role runs with.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }
}

impl<S: State> fmt::Debug for Party1<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Party1").field("stage", &S::STAGE).finish()
    }
}

impl Party1<party1::Created> {
    /// Accept Party2's public key and sample the private scalar.
    ///
    /// # Errors
    /// Returns `PsiSumError::MalformedMessage` if the modulus is smaller than
    /// the configured minimum.
    #[instrument(level = "debug", skip_all, err)]
    pub fn setup<R: RngCore + CryptoRng>(
        self,
        message: SetupMessage,
        rng: &mut R,
    ) -> Result<Party1<party1::SetupDone>> {
        let bits = message.public_key.modulus_bits();
        if bits < self.config.min_modulus_bits {
            return Err(PsiSumError::malformed(format!(
                "peer modulus has {bits} bits, need at least {}",
                self.config.min_modulus_bits
            )));
        }
        debug!(modulus_bits = bits, "accepted peer public key");

        Ok(Party1 {
            config: self.config,
            state: party1::SetupDone {
                identifiers: self.state.identifiers,
                scalar: GroupScalar::random(rng),
                public_key: message.public_key,
            },
        })
    }
}

impl Party1<party1::SetupDone> {
    /// Round 1: hash, mask and shuffle every identifier.
    #[instrument(level = "debug", skip_all)]
    pub fn round1<R: RngCore + CryptoRng>(
        self,
        rng: &mut R,
    ) -> (Party1<party1::Round1Done>, Round1Message) {
        let party1::SetupDone {
            identifiers,
            scalar,
            public_key,
        } = self.state;

        let mut elements = mask_identifiers(&self.config.hash_domain, &identifiers, &scalar);
        shuffle(&mut elements, rng);
        debug!(count = elements.len(), "masked identifiers");

        let sent = elements.len();
        (
            Party1 {
                config: self.config,
                state: party1::Round1Done {
                    scalar,
                    public_key,
                    sent,
                },
            },
            Round1Message { elements },
        )
    }
}

impl Party1<party1::Round1Done> {
    /// Round 3: find the intersection and return its encrypted sum.
    ///
    /// A received pair matches once for every equal element of `Z`, so
    /// duplicate identifiers in Party1's input each count.
    ///
    /// # Errors
    /// Returns `PsiSumError::MalformedMessage` if `Z` does not have one
    /// element per identifier sent in Round 1, if any element is the
    /// identity, or if any ciphertext is invalid under the public key.
    #[instrument(level = "debug", skip_all, err)]
    pub fn round3<R: RngCore + CryptoRng>(
        self,
        message: Round2Message,
        rng: &mut R,
    ) -> Result<(Party1<party1::Round3Done>, Round3Message)> {
        let party1::Round1Done {
            scalar,
            public_key,
            sent,
        } = self.state;
        let Round2Message {
            doubly_masked,
            masked_pairs,
        } = message;

        if doubly_masked.len() != sent {
            return Err(PsiSumError::malformed(format!(
                "expected {sent} doubly masked elements, got {}",
                doubly_masked.len()
            )));
        }
        reject_identity(&doubly_masked)?;
        let (masked, ciphertexts): (Vec<GroupElement>, Vec<Ciphertext>) =
            masked_pairs.into_iter().unzip();
        reject_identity(&masked)?;
        for ciphertext in &ciphertexts {
            public_key
                .validate_ciphertext(ciphertext)
                .map_err(|e| PsiSumError::malformed(e.to_string()))?;
        }

        let mut z: HashMap<GroupElement, u64> = HashMap::with_capacity(doubly_masked.len());
        for element in doubly_masked {
            *z.entry(element).or_default() += 1;
        }

        let mut matched: Vec<&Ciphertext> = Vec::new();
        for (element, ciphertext) in mask_elements(&masked, &scalar).iter().zip(&ciphertexts) {
            if let Some(&count) = z.get(element) {
                matched.extend(std::iter::repeat(ciphertext).take(count as usize));
            }
        }

        let cardinality = matched.len() as u64;
        let sum = public_key.sum(matched, rng)?;
        let sum = public_key.refresh(&sum, rng);
        debug!(pairs = ciphertexts.len(), cardinality, "computed intersection");

        Ok((
            Party1 {
                config: self.config,
                state: party1::Round3Done { cardinality },
            },
            Round3Message { cardinality, sum },
        ))
    }
}

impl Party1<party1::Round3Done> {
    /// Size of the intersection, as disclosed to Party2.
    pub fn cardinality(&self) -> u64 {
        self.state.cardinality
    }
}

fn reject_identity(elements: &[GroupElement]) -> Result<()> {
    if elements.iter().any(GroupElement::is_identity) {
        return Err(PsiSumError::malformed("identity element in message"));
    }
    Ok(())
}
