//! Runtime state machines over the type-state roles.
//!
//! A transport that receives [`ProtocolMessage`]s off the wire cannot know
//! their type statically. The sessions here hold whichever role state is
//! current, dispatch on the message tag, and abort on anything unexpected.

use crate::config::ProtocolConfig;
use crate::error::{PsiSumError, Result};
use crate::messages::{MessageKind, ProtocolMessage, PsiSumOutput};
use crate::party1::Party1;
use crate::party2::Party2;
use crate::state::{party1, party2, ProtocolStage};
use rand::{CryptoRng, RngCore};
use std::mem;
use tracing::warn;

enum Party1Slot {
    Created(Party1<party1::Created>),
    Round1Done(Party1<party1::Round1Done>),
    Round3Done(Party1<party1::Round3Done>),
    Aborted,
}

impl Party1Slot {
    fn stage(&self) -> ProtocolStage {
        match self {
            Party1Slot::Created(p) => p.stage(),
            Party1Slot::Round1Done(p) => p.stage(),
            Party1Slot::Round3Done(p) => p.stage(),
            Party1Slot::Aborted => ProtocolStage::Aborted,
        }
    }
}

/// Party1 driven by inbound messages.
pub struct Party1Session {
    slot: Party1Slot,
}

impl Party1Session {
    /// See [`Party1::new`].
    pub fn new(config: ProtocolConfig, identifiers: Vec<Vec<u8>>) -> Result<Self> {
        Ok(Self {
            slot: Party1Slot::Created(Party1::new(config, identifiers)?),
        })
    }

    /// Current stage.
    pub fn stage(&self) -> ProtocolStage {
        self.slot.stage()
    }

    /// Handle one inbound message and return the reply.
    ///
    /// `Setup` is answered with `Round1`, `Round2` with `Round3`.
    ///
    /// # Errors
    /// Returns `PsiSumError::OutOfOrderMessage` for a message the current
    /// stage does not accept, or the error of the failed transition. Either
    /// way the session is aborted.
    pub fn handle<R: RngCore + CryptoRng>(
        &mut self,
        message: ProtocolMessage,
        rng: &mut R,
    ) -> Result<Option<ProtocolMessage>> {
        let slot = mem::replace(&mut self.slot, Party1Slot::Aborted);
        let (next, reply) = match (slot, message) {
            (Party1Slot::Created(party), ProtocolMessage::Setup(message)) => {
                let (party, reply) = party.setup(message, rng)?.round1(rng);
                (Party1Slot::Round1Done(party), reply.into())
            }
            (Party1Slot::Round1Done(party), ProtocolMessage::Round2(message)) => {
                let (party, reply) = party.round3(message, rng)?;
                (Party1Slot::Round3Done(party), reply.into())
            }
            (slot, message) => return Err(out_of_order(slot.stage(), message.kind())),
        };
        self.slot = next;
        Ok(Some(reply))
    }

    /// The intersection size, once Round 3 is done.
    pub fn cardinality(&self) -> Option<u64> {
        match &self.slot {
            Party1Slot::Round3Done(party) => Some(party.cardinality()),
            _ => None,
        }
    }
}

enum Party2Slot {
    Created(Party2<party2::Created>),
    SetupDone(Party2<party2::SetupDone>),
    Round2Done(Party2<party2::Round2Done>),
    OutputDone(Party2<party2::OutputDone>),
    Aborted,
}

impl Party2Slot {
    fn stage(&self) -> ProtocolStage {
        match self {
            Party2Slot::Created(p) => p.stage(),
            Party2Slot::SetupDone(p) => p.stage(),
            Party2Slot::Round2Done(p) => p.stage(),
            Party2Slot::OutputDone(p) => p.stage(),
            Party2Slot::Aborted => ProtocolStage::Aborted,
        }
    }
}

/// Party2 driven by inbound messages.
pub struct Party2Session {
    slot: Party2Slot,
}

impl Party2Session {
    /// See [`Party2::new`].
    pub fn new(config: ProtocolConfig, pairs: Vec<(Vec<u8>, u64)>) -> Result<Self> {
        Ok(Self {
            slot: Party2Slot::Created(Party2::new(config, pairs)?),
        })
    }

    /// Current stage.
    pub fn stage(&self) -> ProtocolStage {
        self.slot.stage()
    }

    /// Run Setup and return the message carrying the public key.
    ///
    /// # Errors
    /// Returns `PsiSumError::OutOfOrderMessage` unless the session is fresh.
    pub fn start<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<ProtocolMessage> {
        match mem::replace(&mut self.slot, Party2Slot::Aborted) {
            Party2Slot::Created(party) => {
                let (party, message) = party.setup(rng)?;
                self.slot = Party2Slot::SetupDone(party);
                Ok(message.into())
            }
            slot => Err(out_of_order(slot.stage(), MessageKind::Setup)),
        }
    }

    /// Handle one inbound message.
    ///
    /// `Round1` is answered with `Round2`; `Round3` completes the run and
    /// yields no reply.
    ///
    /// # Errors
    /// As for [`Party1Session::handle`].
    pub fn handle<R: RngCore + CryptoRng>(
        &mut self,
        message: ProtocolMessage,
        rng: &mut R,
    ) -> Result<Option<ProtocolMessage>> {
        let slot = mem::replace(&mut self.slot, Party2Slot::Aborted);
        let (next, reply) = match (slot, message) {
            (Party2Slot::SetupDone(party), ProtocolMessage::Round1(message)) => {
                let (party, reply) = party.round2(message, rng)?;
                (Party2Slot::Round2Done(party), Some(reply.into()))
            }
            (Party2Slot::Round2Done(party), ProtocolMessage::Round3(message)) => {
                let (party, _) = party.output(message)?;
                (Party2Slot::OutputDone(party), None)
            }
            (slot, message) => return Err(out_of_order(slot.stage(), message.kind())),
        };
        self.slot = next;
        Ok(reply)
    }

    /// The decrypted result, once the run is complete.
    pub fn output(&self) -> Option<&PsiSumOutput> {
        match &self.slot {
            Party2Slot::OutputDone(party) => Some(party.result()),
            _ => None,
        }
    }
}

fn out_of_order(stage: ProtocolStage, message: MessageKind) -> PsiSumError {
    warn!(%stage, %message, "aborting on out-of-order message");
    PsiSumError::OutOfOrderMessage { stage, message }
}
