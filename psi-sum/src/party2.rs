//! Party2: holds identifier/value pairs and the decryption key.

use crate::config::ProtocolConfig;
use crate::error::{PsiSumError, Result};
use crate::group::{hash_to_group, mask_elements, GroupElement, GroupScalar};
use crate::messages::{PsiSumOutput, Round1Message, Round2Message, Round3Message, SetupMessage};
use crate::paillier::{Ciphertext, KeyPair};
use crate::shuffle::shuffle;
use crate::state::{party2, ProtocolStage, State};
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::fmt;
use tracing::{debug, instrument};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// The value-holding role.
pub struct Party2<S: State = party2::Created> {
    config: ProtocolConfig,
    state: S,
}

impl Party2 {
    /// Create Party2 from its `(identifier, value)` pairs.
    ///
    /// # Errors
    /// Returns `PsiSumError::EmptyInputNotAllowed` for an empty input when
    /// the configuration forbids it, and `PsiSumError::ValueOutOfRange` for
    /// any value above `config.max_value`.
    pub fn new(config: ProtocolConfig, pairs: Vec<(Vec<u8>, u64)>) -> Result<Self> {
        if pairs.is_empty() && !config.allow_empty_input {
            return Err(PsiSumError::EmptyInputNotAllowed);
        }
        if let Some(&(_, value)) = pairs.iter().find(|(_, value)| *value > config.max_value) {
            return Err(PsiSumError::ValueOutOfRange {
                value,
                max: config.max_value,
            });
        }
        Ok(Self {
            config,
            state: party2::Created { pairs },
        })
    }
}

impl<S: State> Party2<S> {
    /// Current stage.
    pub fn stage(&self) -> ProtocolStage {
        S::STAGE
    }

    /// The configuration this role runs with.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }
}

impl<S: State> fmt::Debug for Party2<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Party2").field("stage", &S::STAGE).finish()
    }
}

impl Party2<party2::Created> {
    /// Generate the Paillier key pair and sample the private scalar.
    ///
    /// # Errors
    /// Returns `PsiSumError::KeyGenError` if key generation gives up.
    #[instrument(level = "debug", skip_all, err)]
    pub fn setup<R: RngCore + CryptoRng>(
        self,
        rng: &mut R,
    ) -> Result<(Party2<party2::SetupDone>, SetupMessage)> {
        let keys = KeyPair::generate(
            self.config.modulus_bits,
            self.config.keygen_attempts,
            rng,
        )?;
        let message = SetupMessage {
            public_key: keys.public_key().clone(),
        };

        Ok((
            Party2 {
                config: self.config,
                state: party2::SetupDone {
                    pairs: self.state.pairs,
                    scalar: GroupScalar::random(rng),
                    keys,
                },
            },
            message,
        ))
    }
}

impl Party2<party2::SetupDone> {
    /// Round 2: re-mask Party1's elements and encrypt the local values.
    ///
    /// # Errors
    /// Returns `PsiSumError::MalformedMessage` if Round 1 contains the
    /// identity, and `PsiSumError::PlaintextOutOfRange` if the largest
    /// possible intersection sum would not fit below the modulus.
    #[instrument(level = "debug", skip_all, err)]
    pub fn round2<R: RngCore + CryptoRng>(
        self,
        message: Round1Message,
        rng: &mut R,
    ) -> Result<(Party2<party2::Round2Done>, Round2Message)> {
        let party2::SetupDone {
            pairs,
            scalar,
            keys,
        } = self.state;
        let public_key = keys.public_key();

        if message.elements.iter().any(GroupElement::is_identity) {
            return Err(PsiSumError::malformed("identity element in message"));
        }

        // Each of |W| ciphertexts can be matched at most |V| times.
        let max_value = pairs.iter().map(|(_, value)| *value).max().unwrap_or(0);
        let worst_case = BigUint::from(max_value)
            * BigUint::from(message.len())
            * BigUint::from(pairs.len());
        if &worst_case >= public_key.modulus() {
            return Err(PsiSumError::PlaintextOutOfRange);
        }

        let mut doubly_masked = mask_elements(&message.elements, &scalar);
        shuffle(&mut doubly_masked, rng);

        // One seed per pair, drawn in order, so per-element encryption can
        // run on any thread without sharing the caller's generator.
        let seeds = (0..pairs.len())
            .map(|_| -> Result<[u8; 32]> {
                let mut seed = [0u8; 32];
                rng.try_fill_bytes(&mut seed)?;
                Ok(seed)
            })
            .collect::<Result<Vec<_>>>()?;

        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                let iter = pairs.par_iter().zip(seeds.par_iter());
            } else {
                let iter = pairs.iter().zip(seeds.iter());
            }
        }

        let domain = &self.config.hash_domain;
        let mut masked_pairs = iter
            .map(|((identifier, value), seed)| -> Result<(GroupElement, Ciphertext)> {
                let mut rng = ChaCha20Rng::from_seed(*seed);
                let masked = hash_to_group(domain, identifier).scalar_mul(&scalar);
                let ciphertext = public_key.encrypt(&BigUint::from(*value), &mut rng)?;
                Ok((masked, ciphertext))
            })
            .collect::<Result<Vec<_>>>()?;
        shuffle(&mut masked_pairs, rng);

        debug!(
            received = message.len(),
            pairs = masked_pairs.len(),
            "masked and encrypted"
        );

        let received = message.len();
        let sent = masked_pairs.len();
        Ok((
            Party2 {
                config: self.config,
                state: party2::Round2Done {
                    secret_key: keys.into_secret_key(),
                    received,
                    sent,
                    max_value,
                },
            },
            Round2Message {
                doubly_masked,
                masked_pairs,
            },
        ))
    }
}

impl Party2<party2::Round2Done> {
    /// Output: decrypt the intersection sum.
    ///
    /// # Errors
    /// Returns `PsiSumError::MalformedMessage` if the disclosed cardinality
    /// or the decrypted sum is impossible given the exchanged sizes, and
    /// `PsiSumError::DecryptionError` if the ciphertext is invalid.
    #[instrument(level = "debug", skip_all, err)]
    pub fn output(
        self,
        message: Round3Message,
    ) -> Result<(Party2<party2::OutputDone>, PsiSumOutput)> {
        let party2::Round2Done {
            secret_key,
            received,
            sent,
            max_value,
        } = self.state;

        let max_cardinality = (received as u64).saturating_mul(sent as u64);
        if message.cardinality > max_cardinality {
            return Err(PsiSumError::malformed(format!(
                "cardinality {} exceeds the {max_cardinality} possible matches",
                message.cardinality
            )));
        }

        let sum = secret_key.decrypt(&message.sum)?;
        if sum > BigUint::from(message.cardinality) * BigUint::from(max_value) {
            return Err(PsiSumError::malformed(
                "sum inconsistent with the disclosed cardinality",
            ));
        }
        debug!(cardinality = message.cardinality, "decrypted intersection sum");

        let output = PsiSumOutput {
            cardinality: message.cardinality,
            sum,
        };
        Ok((
            Party2 {
                config: self.config,
                state: party2::OutputDone {
                    output: output.clone(),
                },
            },
            output,
        ))
    }
}

impl Party2<party2::OutputDone> {
    /// The decrypted result.
    pub fn result(&self) -> &PsiSumOutput {
        &self.state.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paillier::PublicKey;
    use rand_chacha::ChaCha20Rng;

    fn config() -> ProtocolConfig {
        ProtocolConfig::builder().modulus_bits(512).build().unwrap()
    }

    fn pairs(entries: &[(&str, u64)]) -> Vec<(Vec<u8>, u64)> {
        entries
            .iter()
            .map(|(id, value)| (id.as_bytes().to_vec(), *value))
            .collect()
    }

    fn round1(labels: &[&str]) -> Round1Message {
        Round1Message {
            elements: labels
                .iter()
                .map(|l| hash_to_group(b"party2-test", l.as_bytes()))
                .collect(),
        }
    }

    #[test]
    fn test_new_value_range() {
        let config = ProtocolConfig::builder()
            .modulus_bits(512)
            .max_value(100)
            .build()
            .unwrap();
        let err = Party2::new(config, pairs(&[("a", 50), ("b", 101)])).unwrap_err();
        assert_eq!(err, PsiSumError::ValueOutOfRange { value: 101, max: 100 });
    }

    #[test]
    fn test_new_empty_input_policy() {
        assert!(Party2::new(config(), vec![]).is_ok());
        let strict = ProtocolConfig::builder()
            .modulus_bits(512)
            .allow_empty_input(false)
            .build()
            .unwrap();
        assert_eq!(
            Party2::new(strict, vec![]).unwrap_err(),
            PsiSumError::EmptyInputNotAllowed
        );
    }

    #[test]
    fn test_setup_public_key() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let (party, msg) = Party2::new(config(), pairs(&[("a", 1)]))
            .unwrap()
            .setup(&mut rng)
            .unwrap();
        assert_eq!(party.stage(), ProtocolStage::SetupDone);
        assert_eq!(msg.public_key.modulus_bits(), 512);
        let decoded = PublicKey::from_bytes(&msg.public_key.to_bytes()).unwrap();
        assert_eq!(decoded, msg.public_key);
    }

    #[test]
    fn test_round2_sizes() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let (party, _) = Party2::new(config(), pairs(&[("a", 1), ("b", 2), ("c", 3)]))
            .unwrap()
            .setup(&mut rng)
            .unwrap();
        let (party, msg) = party.round2(round1(&["x", "y"]), &mut rng).unwrap();
        assert_eq!(party.stage(), ProtocolStage::Round2Done);
        assert_eq!(msg.doubly_masked.len(), 2);
        assert_eq!(msg.masked_pairs.len(), 3);
    }

    #[test]
    fn test_round2_order_independent_of_input() {
        // Follow the image of the first Round 1 element through Z and the
        // image of the first pair through the masked pairs. Each position
        // should be about equally likely, and the two positions should not
        // predict each other.
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let keys = KeyPair::generate(512, 64, &mut rng).unwrap();
        let input = pairs(&[("w0", 1), ("w1", 2), ("w2", 3), ("w3", 4)]);
        let received = round1(&["v0", "v1", "v2", "v3"]);
        let trials = 800;
        let mut z_positions = [0u32; 4];
        let mut pair_positions = [0u32; 4];
        let mut joint = [[0u32; 4]; 4];

        for _ in 0..trials {
            let party = Party2 {
                config: config(),
                state: party2::SetupDone {
                    pairs: input.clone(),
                    scalar: GroupScalar::random(&mut rng),
                    keys: keys.clone(),
                },
            };
            let expected_z = received.elements[0].scalar_mul(&party.state.scalar);
            let expected_pair =
                hash_to_group(config().hash_domain(), b"w0").scalar_mul(&party.state.scalar);

            let (_, msg) = party.round2(received.clone(), &mut rng).unwrap();
            let z = msg.doubly_masked.iter().position(|e| *e == expected_z).unwrap();
            let pair = msg
                .masked_pairs
                .iter()
                .position(|(e, _)| *e == expected_pair)
                .unwrap();
            z_positions[z] += 1;
            pair_positions[pair] += 1;
            joint[z][pair] += 1;
        }

        // Expected 200 per position, standard deviation about 12.
        for count in z_positions.iter().chain(pair_positions.iter()) {
            assert!((140..=260).contains(count), "z {z_positions:?} pairs {pair_positions:?}");
        }
        // Expected 50 per cell, standard deviation about 7.
        for row in joint {
            for count in row {
                assert!((15..=85).contains(&count), "joint {joint:?}");
            }
        }
    }

    #[test]
    fn test_round2_rejects_identity() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (party, _) = Party2::new(config(), pairs(&[("a", 1)]))
            .unwrap()
            .setup(&mut rng)
            .unwrap();
        let msg = Round1Message {
            elements: vec![GroupElement::identity()],
        };
        let err = party.round2(msg, &mut rng).unwrap_err();
        assert!(matches!(err, PsiSumError::MalformedMessage(_)));
    }

    #[test]
    fn test_output_rejects_impossible_cardinality() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let (party, setup) = Party2::new(config(), pairs(&[("a", 1)]))
            .unwrap()
            .setup(&mut rng)
            .unwrap();
        let (party, _) = party.round2(round1(&["a"]), &mut rng).unwrap();
        let sum = setup
            .public_key
            .encrypt(&BigUint::from(1u8), &mut rng)
            .unwrap();
        let err = party
            .output(Round3Message {
                cardinality: 2,
                sum,
            })
            .unwrap_err();
        assert!(matches!(err, PsiSumError::MalformedMessage(_)));
    }

    #[test]
    fn test_output_rejects_inconsistent_sum() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let (party, setup) = Party2::new(config(), pairs(&[("a", 10)]))
            .unwrap()
            .setup(&mut rng)
            .unwrap();
        let (party, _) = party.round2(round1(&["a"]), &mut rng).unwrap();
        let sum = setup
            .public_key
            .encrypt(&BigUint::from(11u8), &mut rng)
            .unwrap();
        let err = party
            .output(Round3Message {
                cardinality: 1,
                sum,
            })
            .unwrap_err();
        assert!(matches!(err, PsiSumError::MalformedMessage(_)));
    }

    #[test]
    fn test_output_rejects_bad_ciphertext() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let (party, setup) = Party2::new(config(), pairs(&[("a", 10)]))
            .unwrap()
            .setup(&mut rng)
            .unwrap();
        let (party, _) = party.round2(round1(&["a"]), &mut rng).unwrap();
        let bogus = Ciphertext::from_bytes(&setup.public_key.to_bytes()).unwrap();
        let err = party
            .output(Round3Message {
                cardinality: 0,
                sum: bogus,
            })
            .unwrap_err();
        assert!(matches!(err, PsiSumError::DecryptionError(_)));
    }
}
