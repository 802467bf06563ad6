//! Pair-Setup state machine (M1..M6)
//!
//! The SRP server side runs as a chain of dispatcher events so the big
//! modular exponentiations never monopolize a `handle()` tick:
//!
//! ```text
//! M1 received  -> salt + verifier -> SrpInitFinishGenSalt
//!              -> b, B            -> SrpInitComplete        -> M2 sent
//! M3 received  ->                    SrpProofVerifierCreated
//!              -> K = H(S)        -> SrpProofSkeyGenerated
//!              -> M               -> SrpProofSsideGenerated
//!              -> H(A|M|K)        -> SrpProofComplete       -> M4 sent
//! M5 received  -> NeedDecrypt -> verify + persist           -> M6 sent
//! ```

use std::rc::Rc;

use bytes::Bytes;

use crate::accessory::Core;
use crate::crypto::{derive_key, ed25519_verify, srp, CryptoEnvelope};
use crate::event::{Emitter, Event, EventArg, EventKind};
use crate::session::{Session, SessionRef};
use crate::storage::{StorageError, PERMISSION_ADMIN};
use crate::tlv::{methods, TlvChain, TlvType};

use super::{error_state, fail, ErrorCode, PairSetup, SRP_USERNAME};

const ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
const ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";
const CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
const CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";
const ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
const ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";

const NONCE_M5: &[u8] = b"PS-Msg05";
const NONCE_M6: &[u8] = b"PS-Msg06";

/// Entry point for POST `/pair-setup`
pub(crate) fn on_pair_setup(core: &mut Core, emitter: &mut Emitter<Core>, session_ref: &SessionRef) {
    let mut session = session_ref.borrow_mut();
    let Some(body) = session.body() else {
        session.send_status(400);
        return;
    };

    let chain = TlvChain::parse(&body);
    match chain.byte_of(TlvType::State) {
        Some(1) => m1(core, emitter, &mut session, session_ref, &chain),
        Some(3) => m3(emitter, &mut session, session_ref, &chain),
        Some(5) => m5(emitter, &mut session, session_ref, &chain),
        other => fail(&mut session, error_state(other), ErrorCode::Unknown),
    }
}

fn m1(
    core: &mut Core,
    emitter: &mut Emitter<Core>,
    session: &mut Session,
    session_ref: &SessionRef,
    chain: &TlvChain,
) {
    if session.pair_info.setup.take().is_some() {
        tracing::debug!("discarding stale pair-setup context");
    }

    if chain.byte_of(TlvType::Method) != Some(methods::PAIR_SETUP) {
        fail(session, 2, ErrorCode::Unknown);
        return;
    }

    // Once paired, further controllers are admitted through /pairings only
    if core.storage.paired_device_count() > 0 {
        tracing::warn!("rejecting pair-setup: accessory is already paired");
        fail(session, 2, ErrorCode::Unavailable);
        return;
    }

    let mut setup = PairSetup::new(core.config.setup_code.clone());
    setup.salt = srp::generate_salt();
    setup.verifier = srp::compute_verifier(SRP_USERNAME, &setup.password, &setup.salt);
    setup.advance(1);
    session.pair_info.setup = Some(setup);

    tracing::debug!("pair-setup M1 accepted");
    emitter.emit(
        EventKind::SrpInitFinishGenSalt,
        EventArg::Session(Rc::clone(session_ref)),
    );
}

/// `SrpInitFinishGenSalt`: generate the server SRP keypair
pub(crate) fn on_salt_generated(_core: &mut Core, emitter: &mut Emitter<Core>, event: &Event) {
    let Some(session_ref) = event.session() else {
        return;
    };
    let mut session = session_ref.borrow_mut();
    if session.pair_info.abandoned {
        return;
    }
    let Some(setup) = session.pair_info.setup.as_mut() else {
        return;
    };

    setup.b = srp::generate_private_key().to_vec();
    setup.b_pub = srp::compute_public_key(&setup.verifier, &setup.b);
    emitter.emit(EventKind::SrpInitComplete, event.arg.clone());
}

/// `SrpInitComplete`: answer M2
pub(crate) fn on_init_complete(_core: &mut Core, _emitter: &mut Emitter<Core>, event: &Event) {
    let Some(session_ref) = event.session() else {
        return;
    };
    let mut session = session_ref.borrow_mut();
    if session.pair_info.abandoned {
        return;
    }
    let Some((salt, b_pub)) = session.pair_info.setup.as_mut().map(|setup| {
        setup.advance(2);
        (setup.salt, setup.b_pub.clone())
    }) else {
        return;
    };

    let mut chain = TlvChain::new();
    chain.insert(TlvType::Salt, &salt);
    chain.insert(TlvType::PublicKey, &b_pub);
    chain.insert(TlvType::State, &[2]);
    session.send_tlv(&chain);
    tracing::debug!("pair-setup M2 sent");
}

fn m3(
    emitter: &mut Emitter<Core>,
    session: &mut Session,
    session_ref: &SessionRef,
    chain: &TlvChain,
) {
    if !session
        .pair_info
        .setup
        .as_ref()
        .is_some_and(|setup| setup.step() == 2)
    {
        fail(session, 4, ErrorCode::Unknown);
        return;
    }

    let Ok(a_pub) = chain.require(TlvType::PublicKey) else {
        fail(session, 4, ErrorCode::Unknown);
        return;
    };
    let Ok(client_proof) = chain.require_exact(TlvType::Proof, 64) else {
        fail(session, 4, ErrorCode::Unknown);
        return;
    };

    if let Some(setup) = session.pair_info.setup.as_mut() {
        setup.a_pub = a_pub;
        setup.client_proof.copy_from_slice(&client_proof);
        setup.advance(3);
    }

    emitter.emit(
        EventKind::SrpProofVerifierCreated,
        EventArg::Session(Rc::clone(session_ref)),
    );
}

/// `SrpProofVerifierCreated`: derive the session key (the long modexp)
pub(crate) fn on_verifier_created(_core: &mut Core, emitter: &mut Emitter<Core>, event: &Event) {
    let Some(session_ref) = event.session() else {
        return;
    };
    let mut session = session_ref.borrow_mut();
    if session.pair_info.abandoned {
        return;
    }

    let derived = match session.pair_info.setup.as_mut() {
        Some(setup) => {
            match srp::session_key(&setup.a_pub, &setup.b_pub, &setup.b, &setup.verifier) {
                Ok(key) => {
                    setup.session_key = key;
                    true
                }
                Err(error) => {
                    tracing::warn!(%error, "SRP session key rejected");
                    false
                }
            }
        }
        None => return,
    };

    if derived {
        emitter.emit(EventKind::SrpProofSkeyGenerated, event.arg.clone());
    } else {
        fail(&mut session, 4, ErrorCode::Authentication);
    }
}

/// `SrpProofSkeyGenerated`: compute the expected client proof
pub(crate) fn on_session_key_generated(
    _core: &mut Core,
    emitter: &mut Emitter<Core>,
    event: &Event,
) {
    let Some(session_ref) = event.session() else {
        return;
    };
    let mut session = session_ref.borrow_mut();
    if session.pair_info.abandoned {
        return;
    }
    let Some(setup) = session.pair_info.setup.as_mut() else {
        return;
    };

    setup.expected_proof = srp::proof_m(
        SRP_USERNAME,
        &setup.salt,
        &setup.a_pub,
        &setup.b_pub,
        &setup.session_key,
    );
    emitter.emit(EventKind::SrpProofSsideGenerated, event.arg.clone());
}

/// `SrpProofSsideGenerated`: compute the server proof `H(A | M | K)`
pub(crate) fn on_expected_proof_generated(
    _core: &mut Core,
    emitter: &mut Emitter<Core>,
    event: &Event,
) {
    let Some(session_ref) = event.session() else {
        return;
    };
    let mut session = session_ref.borrow_mut();
    if session.pair_info.abandoned {
        return;
    }
    let Some(setup) = session.pair_info.setup.as_mut() else {
        return;
    };

    setup.server_proof =
        srp::server_proof(&setup.a_pub, &setup.expected_proof, &setup.session_key);
    emitter.emit(EventKind::SrpProofComplete, event.arg.clone());
}

/// `SrpProofComplete`: check the client proof and answer M4
pub(crate) fn on_proof_complete(_core: &mut Core, _emitter: &mut Emitter<Core>, event: &Event) {
    let Some(session_ref) = event.session() else {
        return;
    };
    let mut session = session_ref.borrow_mut();
    if session.pair_info.abandoned {
        return;
    }

    let verdict = session.pair_info.setup.as_mut().map(|setup| {
        if srp::verify_client_proof(&setup.expected_proof, &setup.client_proof) {
            setup.advance(4);
            Some(setup.server_proof)
        } else {
            None
        }
    });

    match verdict {
        None => {}
        Some(None) => {
            tracing::warn!("client SRP proof mismatch, wrong setup code");
            fail(&mut session, 4, ErrorCode::Authentication);
        }
        Some(Some(server_proof)) => {
            let mut chain = TlvChain::new();
            chain.insert(TlvType::Proof, &server_proof);
            chain.insert(TlvType::State, &[4]);
            session.send_tlv(&chain);
            tracing::debug!("pair-setup M4 sent");
        }
    }
}

fn m5(
    emitter: &mut Emitter<Core>,
    session: &mut Session,
    session_ref: &SessionRef,
    chain: &TlvChain,
) {
    let Some(session_key) = session
        .pair_info
        .setup
        .as_ref()
        .filter(|setup| setup.step() == 4)
        .map(|setup| setup.session_key)
    else {
        fail(session, 6, ErrorCode::Unknown);
        return;
    };

    let Ok(encrypted) = chain.require(TlvType::EncryptedData) else {
        fail(session, 6, ErrorCode::Unknown);
        return;
    };

    let Ok(key) = derive_key(ENCRYPT_SALT, &session_key, ENCRYPT_INFO) else {
        fail(session, 6, ErrorCode::Unknown);
        return;
    };
    let Ok(envelope) = CryptoEnvelope::for_decrypt(key, NONCE_M5, &encrypted) else {
        fail(session, 6, ErrorCode::Authentication);
        return;
    };

    if let Some(setup) = session.pair_info.setup.as_mut() {
        setup.advance(5);
    }
    session.pair_info.envelope = Some(envelope);

    emitter.emit_then(
        EventKind::NeedDecrypt,
        EventArg::Session(Rc::clone(session_ref)),
        on_m5_decrypted,
    );
}

/// Completion of the M5 `NeedDecrypt`: verify the controller identity,
/// persist it, and answer M6
fn on_m5_decrypted(core: &mut Core, emitter: &mut Emitter<Core>, event: &Event) {
    let Some(session_ref) = event.session() else {
        return;
    };
    let mut session = session_ref.borrow_mut();
    if session.pair_info.abandoned {
        return;
    }
    let Some(envelope) = session.pair_info.envelope.take() else {
        return;
    };
    let Some(session_key) = session
        .pair_info
        .setup
        .as_ref()
        .filter(|setup| setup.step() == 5)
        .map(|setup| setup.session_key)
    else {
        return;
    };

    if !envelope.decrypt_succeeded() {
        tracing::warn!("pair-setup M5 envelope failed authentication");
        fail(&mut session, 6, ErrorCode::Authentication);
        return;
    }

    let plaintext = envelope.plaintext.clone().unwrap_or_default();
    let inner = TlvChain::parse(&Bytes::from(plaintext));
    let (Ok(identifier), Ok(ltpk), Ok(signature)) = (
        inner.require_exact(TlvType::Identifier, 36),
        inner.require_exact(TlvType::PublicKey, 32),
        inner.require_exact(TlvType::Signature, 64),
    ) else {
        fail(&mut session, 6, ErrorCode::Unknown);
        return;
    };

    // iOSDeviceInfo = HKDF(K) || iOSDevicePairingID || iOSDeviceLTPK,
    // signed by the controller's long-term key
    let Ok(controller_hkdf) = derive_key(CONTROLLER_SIGN_SALT, &session_key, CONTROLLER_SIGN_INFO)
    else {
        fail(&mut session, 6, ErrorCode::Unknown);
        return;
    };
    let mut device_info = Vec::with_capacity(32 + 36 + 32);
    device_info.extend_from_slice(&controller_hkdf);
    device_info.extend_from_slice(&identifier);
    device_info.extend_from_slice(&ltpk);

    if ed25519_verify(&ltpk, &device_info, &signature).is_err() {
        tracing::warn!("controller signature rejected in pair-setup M5");
        fail(&mut session, 6, ErrorCode::Authentication);
        return;
    }

    if let Some(setup) = session.pair_info.setup.as_mut() {
        setup.device_id.copy_from_slice(&identifier);
        setup.device_ltpk.copy_from_slice(&ltpk);
        setup.advance(6);
    }

    let Ok(identity) = core.ensure_lt_keys() else {
        fail(&mut session, 6, ErrorCode::Unknown);
        return;
    };

    let mut device_id = [0u8; 36];
    device_id.copy_from_slice(&identifier);
    let mut device_ltpk = [0u8; 32];
    device_ltpk.copy_from_slice(&ltpk);
    match core
        .storage
        .add_paired_device(&device_id, &device_ltpk, [PERMISSION_ADMIN, 0, 0, 0])
    {
        Ok(()) => {}
        Err(StorageError::TableFull) => {
            fail(&mut session, 6, ErrorCode::MaxPeers);
            return;
        }
        Err(error) => {
            tracing::error!(%error, "failed to persist paired controller");
            fail(&mut session, 6, ErrorCode::Unknown);
            return;
        }
    }

    // AccessoryInfo = HKDF(K) || AccessoryPairingID || AccessoryLTPK
    let Ok(accessory_hkdf) = derive_key(ACCESSORY_SIGN_SALT, &session_key, ACCESSORY_SIGN_INFO)
    else {
        fail(&mut session, 6, ErrorCode::Unknown);
        return;
    };
    let accessory_id = core.accessory_id.clone();
    let accessory_ltpk = identity.public_bytes();
    let mut accessory_info = Vec::with_capacity(32 + 36 + 32);
    accessory_info.extend_from_slice(&accessory_hkdf);
    accessory_info.extend_from_slice(accessory_id.as_bytes());
    accessory_info.extend_from_slice(&accessory_ltpk);
    let accessory_signature = identity.sign(&accessory_info);

    let mut sub_chain = TlvChain::new();
    sub_chain.insert(TlvType::Signature, &accessory_signature);
    sub_chain.insert(TlvType::PublicKey, &accessory_ltpk);
    sub_chain.insert(TlvType::Identifier, accessory_id.as_bytes());

    let sealed = derive_key(ENCRYPT_SALT, &session_key, ENCRYPT_INFO)
        .ok()
        .and_then(|key| CryptoEnvelope::for_encrypt(key, NONCE_M6, sub_chain.encode()).ok())
        .and_then(|mut envelope| {
            envelope.encrypt().ok()?;
            envelope.wire_output()
        });
    let Some(wire) = sealed else {
        fail(&mut session, 6, ErrorCode::Unknown);
        return;
    };

    let mut chain = TlvChain::new();
    chain.insert(TlvType::EncryptedData, &wire);
    chain.insert(TlvType::State, &[6]);

    // Commit point: the pairing exists, the context is done
    session.pair_info.setup = None;
    session.send_tlv(&chain);
    tracing::info!("pair-setup complete, controller persisted");

    emitter.emit(EventKind::SdNeededUpdate, EventArg::None);
}
