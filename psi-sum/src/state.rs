//! Protocol stages and the per-role type-state payloads.

use std::fmt;

/// Position of a role in the protocol run.
///
/// Party1 passes through `Created`, `SetupDone`, `Round1Done` and
/// `Round3Done`; Party2 through `Created`, `SetupDone`, `Round2Done` and
/// `OutputDone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolStage {
    Created,
    SetupDone,
    Round1Done,
    Round2Done,
    Round3Done,
    OutputDone,
    /// A transition failed; the run is over.
    Aborted,
}

impl fmt::Display for ProtocolStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Marker for a role's type-state.
pub trait State: sealed::Sealed {
    /// The stage this state represents.
    const STAGE: ProtocolStage;
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::party1::Created {}
    impl Sealed for super::party1::SetupDone {}
    impl Sealed for super::party1::Round1Done {}
    impl Sealed for super::party1::Round3Done {}

    impl Sealed for super::party2::Created {}
    impl Sealed for super::party2::SetupDone {}
    impl Sealed for super::party2::Round2Done {}
    impl Sealed for super::party2::OutputDone {}
}

/// Party1 (identifier holder) states.
pub mod party1 {
    use super::{ProtocolStage, State};
    use crate::group::GroupScalar;
    use crate::paillier::PublicKey;

    /// Holding the input, nothing sampled yet.
    pub struct Created {
        pub(crate) identifiers: Vec<Vec<u8>>,
    }

    /// Peer public key received, scalar sampled.
    pub struct SetupDone {
        pub(crate) identifiers: Vec<Vec<u8>>,
        pub(crate) scalar: GroupScalar,
        pub(crate) public_key: PublicKey,
    }

    /// Masked identifiers sent; waiting for Round 2.
    pub struct Round1Done {
        pub(crate) scalar: GroupScalar,
        pub(crate) public_key: PublicKey,
        /// Number of elements sent in Round 1.
        pub(crate) sent: usize,
    }

    /// Intersection computed and disclosed.
    pub struct Round3Done {
        pub(crate) cardinality: u64,
    }

    impl State for Created {
        const STAGE: ProtocolStage = ProtocolStage::Created;
    }
    impl State for SetupDone {
        const STAGE: ProtocolStage = ProtocolStage::SetupDone;
    }
    impl State for Round1Done {
        const STAGE: ProtocolStage = ProtocolStage::Round1Done;
    }
    impl State for Round3Done {
        const STAGE: ProtocolStage = ProtocolStage::Round3Done;
    }
}

/// Party2 (identifier/value holder) states.
pub mod party2 {
    use super::{ProtocolStage, State};
    use crate::group::GroupScalar;
    use crate::messages::PsiSumOutput;
    use crate::paillier::{KeyPair, SecretKey};

    /// Holding the input, nothing generated yet.
    pub struct Created {
        pub(crate) pairs: Vec<(Vec<u8>, u64)>,
    }

    /// Key pair generated and scalar sampled.
    pub struct SetupDone {
        pub(crate) pairs: Vec<(Vec<u8>, u64)>,
        pub(crate) scalar: GroupScalar,
        pub(crate) keys: KeyPair,
    }

    /// Round 2 sent; waiting for the encrypted sum.
    pub struct Round2Done {
        pub(crate) secret_key: SecretKey,
        /// Number of elements received in Round 1.
        pub(crate) received: usize,
        /// Number of pairs sent in Round 2.
        pub(crate) sent: usize,
        /// Largest value among the pairs sent.
        pub(crate) max_value: u64,
    }

    /// Output decrypted.
    pub struct OutputDone {
        pub(crate) output: PsiSumOutput,
    }

    impl State for Created {
        const STAGE: ProtocolStage = ProtocolStage::Created;
    }
    impl State for SetupDone {
        const STAGE: ProtocolStage = ProtocolStage::SetupDone;
    }
    impl State for Round2Done {
        const STAGE: ProtocolStage = ProtocolStage::Round2Done;
    }
    impl State for OutputDone {
        const STAGE: ProtocolStage = ProtocolStage::OutputDone;
    }
}
