//! # Private Intersection-Sum with Cardinality (PSI-Sum)
//!
//! This library implements the two-party DDH-based PSI-Sum protocol on the
//! Ristretto255 group (curve25519-dalek) with Paillier encryption for the
//! values.
//!
//! Party1 holds a set of identifiers. Party2 holds `(identifier, value)`
//! pairs. Together they learn the size of the intersection and the sum of
//! Party2's values over it, and nothing else beyond the sizes of each
//! other's inputs. Security holds against semi-honest parties.
//!
//! ## Features
//!
//! - **Transport Agnostic**: The library handles the protocol logic but leaves
//!   message exchange to the user.
//! - **Type-State Pattern**: Each role is a state machine whose transitions
//!   consume the role, so rounds cannot be skipped or replayed at compile time.
//!   [`Party1Session`]/[`Party2Session`] offer the same machines for transports
//!   that dispatch on [`ProtocolMessage`] at runtime.
//! - **Validated Wire Format**: Messages derive serde; group elements are
//!   checked while decoding, and [`ProtocolMessage::to_bytes`] gives a
//!   bincode encoding.
//! - **Parallel Rounds**: Per-element masking and encryption run on rayon
//!   when the `rayon` feature is enabled (the default).
//!
//! ## Protocol Overview
//!
//! 1. **Setup**: Party2 generates a Paillier key pair and sends the public key.
//!    Both parties sample a private scalar.
//! 2. **Round 1**: Party1 sends `H(v)^k1` for each identifier, shuffled.
//! 3. **Round 2**: Party2 sends `Z = {H(v)^(k1·k2)}`, shuffled, and
//!    `(H(w)^k2, Enc(t))` for each pair, shuffled independently.
//! 4. **Round 3**: Party1 raises each `H(w)^k2` to `k1`, matches against `Z`,
//!    adds up the matching ciphertexts, refreshes the sum and sends it with
//!    the intersection size.
//! 5. **Output**: Party2 decrypts the sum.
//!
//! ## Example Usage
//!
//! ```ignore
//! use psi_sum::{Party1, Party2, ProtocolConfig, PsiSumError};
//! use rand::rngs::OsRng;
//!
//! let config = ProtocolConfig::default();
//! let mut rng = OsRng;
//!
//! let party1 = Party1::new(config.clone(), vec![b"user1".to_vec(), b"user2".to_vec()])?;
//! let party2 = Party2::new(config, vec![(b"user2".to_vec(), 100)])?;
//!
//! let (party2, setup) = party2.setup(&mut rng)?;
//! let (party1, round1) = party1.setup(setup, &mut rng)?.round1(&mut rng);
//! let (party2, round2) = party2.round2(round1, &mut rng)?;
//! let (party1, round3) = party1.round3(round2, &mut rng)?;
//! let (_party2, output) = party2.output(round3)?;
//!
//! assert_eq!(output.cardinality, 1);
//! assert_eq!(party1.cardinality(), 1);
//! # Ok::<(), PsiSumError>(())
//! ```
//!
//! ## Security Considerations
//!
//! - The public key must reach Party1 over an authenticated channel.
//! - Message sizes reveal input sizes.
//! - Duplicate identifiers are not removed; deduplicate inputs for set
//!   semantics.
//! - Scalars and keys are per run; never reuse a role for a second run.
//!
//! ## Modules
//!
//! - [`group`] - Ristretto255 group primitive
//! - [`paillier`] - Paillier encryption
//! - [`messages`] - Message types for protocol exchange
//! - [`session`] - Runtime-dispatched role state machines
//! - [`state`] - Protocol stages and type-state payloads

pub use config::{ProtocolConfig, ProtocolConfigBuilder, ProtocolConfigBuilderError};
pub use error::{ErrorKind, PsiSumError, Result};
pub use group::{hash_to_group, GroupElement, GroupScalar};
pub use messages::{
    MessageKind, ProtocolMessage, PsiSumOutput, Round1Message, Round2Message, Round3Message,
    SetupMessage,
};
pub use paillier::{Ciphertext, KeyPair, PublicKey, SecretKey};
pub use party1::Party1;
pub use party2::Party2;
pub use session::{Party1Session, Party2Session};
pub use shuffle::shuffle;
pub use state::ProtocolStage;

mod config;
mod error;
pub mod group;
pub mod messages;
pub mod paillier;
mod party1;
mod party2;
pub mod session;
mod shuffle;
pub mod state;
