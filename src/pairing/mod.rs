//! Pairing state machines
//!
//! Pair-Setup (M1..M6), Pair-Verify (M1..M4) and the `/pairings` admin
//! endpoint, driven entirely by dispatcher events. Handlers parse the
//! request TLV, mutate the session's pairing context, and either emit the
//! next cryptographic step or write a terminal TLV response. All failures
//! are answered in-band (HTTP 200 with a `kTLVType_Error` item) and tear
//! the pairing context down; nothing unwinds through the dispatcher.

pub mod pairings;
pub mod setup;
pub mod verify;


use zeroize::Zeroize;

use crate::accessory::Core;
use crate::crypto::{CryptoEnvelope, EphemeralKeypair};
use crate::event::{Emitter, Event, EventKind, EventLoop};
use crate::session::Session;
use crate::tlv::{TlvChain, TlvType};

/// SRP identity for Pair-Setup, fixed by the protocol
pub const SRP_USERNAME: &str = "Pair-Setup";

/// Application-level error codes carried in [`TlvType::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Generic or protocol failure
    Unknown = 1,
    /// Proof, signature, or tag mismatch; unknown controller
    Authentication = 2,
    /// Controller must back off before retrying
    Backoff = 3,
    /// Paired-controller table is full
    MaxPeers = 4,
    /// Too many failed attempts
    MaxTries = 5,
    /// Accessory is already paired
    Unavailable = 6,
    /// Another pairing operation is in flight
    Busy = 7,
}

/// Per-connection pairing state
#[derive(Default)]
pub struct PairInfo {
    /// Active Pair-Setup attempt
    pub setup: Option<PairSetup>,
    /// Active Pair-Verify attempt
    pub verify: Option<PairVerify>,
    /// Envelope awaiting a `NeedDecrypt` round trip
    pub envelope: Option<CryptoEnvelope>,
    /// Established verified session, if Pair-Verify completed
    pub established: Option<VerifiedSession>,
    /// Set when the connection closed mid-exchange; late handlers no-op
    pub abandoned: bool,
}

/// Outcome of a completed Pair-Verify exchange
pub struct VerifiedSession {
    /// Identifier of the verified controller
    pub controller_id: [u8; 36],
    /// Curve25519 shared secret; the transport derives its frame keys
    /// from this
    pub shared_secret: [u8; 32],
}

/// One Pair-Setup attempt
///
/// Byte fields are populated progressively as the SRP events run; `step`
/// gates which incoming states are acceptable and only ever advances.
pub struct PairSetup {
    step: u8,
    pub(crate) password: String,
    pub(crate) salt: [u8; 16],
    pub(crate) verifier: Vec<u8>,
    pub(crate) b: Vec<u8>,
    pub(crate) b_pub: Vec<u8>,
    pub(crate) a_pub: Vec<u8>,
    pub(crate) session_key: [u8; 64],
    pub(crate) expected_proof: [u8; 64],
    pub(crate) server_proof: [u8; 64],
    pub(crate) client_proof: [u8; 64],
    pub(crate) device_id: [u8; 36],
    pub(crate) device_ltpk: [u8; 32],
}

impl PairSetup {
    pub(crate) fn new(password: String) -> Self {
        Self {
            step: 0,
            password,
            salt: [0; 16],
            verifier: Vec::new(),
            b: Vec::new(),
            b_pub: Vec::new(),
            a_pub: Vec::new(),
            session_key: [0; 64],
            expected_proof: [0; 64],
            server_proof: [0; 64],
            client_proof: [0; 64],
            device_id: [0; 36],
            device_ltpk: [0; 32],
        }
    }

    /// Current step, 0..=6
    #[must_use]
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Advance the step; a lower value never rewinds it
    pub(crate) fn advance(&mut self, step: u8) {
        self.step = self.step.max(step);
    }
}

impl Drop for PairSetup {
    fn drop(&mut self) {
        self.password.zeroize();
        self.verifier.zeroize();
        self.b.zeroize();
        self.session_key.zeroize();
    }
}

/// One Pair-Verify attempt
pub struct PairVerify {
    step: u8,
    pub(crate) keypair: EphemeralKeypair,
    pub(crate) ios_e_pub: [u8; 32],
    pub(crate) shared_secret: [u8; 32],
    pub(crate) envelope_key: [u8; 32],
}

impl PairVerify {
    /// Current step, 0..=4
    #[must_use]
    pub fn step(&self) -> u8 {
        self.step
    }

    pub(crate) fn advance(&mut self, step: u8) {
        self.step = self.step.max(step);
    }
}

impl Drop for PairVerify {
    fn drop(&mut self) {
        self.shared_secret.zeroize();
        self.envelope_key.zeroize();
    }
}

/// Wire up the crypto-step listeners. Counterpart of the original
/// registration the pairings manager performs at construction.
pub(crate) fn register(events: &mut EventLoop<Core>) {
    events.on(EventKind::SrpInitFinishGenSalt, setup::on_salt_generated);
    events.on(EventKind::SrpInitComplete, setup::on_init_complete);
    events.on(EventKind::SrpProofVerifierCreated, setup::on_verifier_created);
    events.on(EventKind::SrpProofSkeyGenerated, setup::on_session_key_generated);
    events.on(EventKind::SrpProofSsideGenerated, setup::on_expected_proof_generated);
    events.on(EventKind::SrpProofComplete, setup::on_proof_complete);
    events.on(EventKind::NeedDecrypt, on_need_decrypt);
}

/// `NeedDecrypt` listener: open the envelope parked on the session. The
/// emit's completion callback picks up the outcome.
pub(crate) fn on_need_decrypt(_core: &mut Core, _emitter: &mut Emitter<Core>, event: &Event) {
    let Some(session_ref) = event.session() else {
        return;
    };
    let mut session = session_ref.borrow_mut();
    if session.pair_info.abandoned {
        return;
    }
    if let Some(envelope) = session.pair_info.envelope.as_mut() {
        envelope.decrypt();
    }
}

/// Terminal error reply: `State=state, Error=code`, context destroyed
pub(crate) fn fail(session: &mut Session, state: u8, code: ErrorCode) {
    tracing::warn!(state, ?code, "pairing failure");
    session.pair_info.setup = None;
    session.pair_info.verify = None;
    session.pair_info.envelope = None;

    let mut chain = TlvChain::new();
    chain.insert(TlvType::Error, &[code as u8]);
    chain.insert(TlvType::State, &[state]);
    session.send_tlv(&chain);
}

/// The even state a failure reply should carry for a received state
pub(crate) fn error_state(received: Option<u8>) -> u8 {
    match received {
        Some(state) if state % 2 == 1 => state.saturating_add(1),
        _ => 2,
    }
}
