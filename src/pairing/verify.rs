//! Pair-Verify state machine (M1..M4)
//!
//! Station-to-Station over ephemeral Curve25519: both sides exchange
//! ephemeral public keys, prove their long-term identity over the
//! transcript, and the shared secret becomes the transport session key.

use std::rc::Rc;

use bytes::Bytes;

use crate::accessory::Core;
use crate::crypto::{derive_key, ed25519_verify, CryptoEnvelope, EphemeralKeypair};
use crate::event::{Emitter, Event, EventArg, EventKind};
use crate::session::{Session, SessionRef};
use crate::tlv::{TlvChain, TlvType};

use super::{error_state, fail, ErrorCode, PairVerify, VerifiedSession};

const ENCRYPT_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
const ENCRYPT_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";

const NONCE_M2: &[u8] = b"PV-Msg02";
const NONCE_M3: &[u8] = b"PV-Msg03";

/// Entry point for POST `/pair-verify`
pub(crate) fn on_pair_verify(
    core: &mut Core,
    emitter: &mut Emitter<Core>,
    session_ref: &SessionRef,
) {
    let mut session = session_ref.borrow_mut();
    let Some(body) = session.body() else {
        session.send_status(400);
        return;
    };

    let chain = TlvChain::parse(&body);
    match chain.byte_of(TlvType::State) {
        Some(1) => m1(core, &mut session, &chain),
        Some(3) => m3(emitter, &mut session, session_ref, &chain),
        other => fail(&mut session, error_state(other), ErrorCode::Unknown),
    }
}

fn m1(core: &mut Core, session: &mut Session, chain: &TlvChain) {
    if session.pair_info.verify.take().is_some() {
        tracing::debug!("discarding stale pair-verify context");
    }

    let Ok(ios_e_pub) = chain.require_exact(TlvType::PublicKey, 32) else {
        fail(session, 2, ErrorCode::Unknown);
        return;
    };

    let keypair = EphemeralKeypair::generate();
    let Ok(shared_secret) = keypair.diffie_hellman(&ios_e_pub) else {
        fail(session, 2, ErrorCode::Unknown);
        return;
    };
    if shared_secret == [0u8; 32] {
        tracing::warn!("pair-verify peer key maps to the zero point");
        fail(session, 2, ErrorCode::Authentication);
        return;
    }

    let Ok(envelope_key) = derive_key(ENCRYPT_SALT, &shared_secret, ENCRYPT_INFO) else {
        fail(session, 2, ErrorCode::Unknown);
        return;
    };
    let Ok(identity) = core.ensure_lt_keys() else {
        fail(session, 2, ErrorCode::Unknown);
        return;
    };

    // AccessoryInfo = accessory ePK || AccessoryPairingID || iOS ePK
    let accessory_id = core.accessory_id.clone();
    let accessory_e_pub = keypair.public_bytes();
    let mut accessory_info = Vec::with_capacity(32 + 36 + 32);
    accessory_info.extend_from_slice(&accessory_e_pub);
    accessory_info.extend_from_slice(accessory_id.as_bytes());
    accessory_info.extend_from_slice(&ios_e_pub);
    let signature = identity.sign(&accessory_info);

    let mut sub_chain = TlvChain::new();
    sub_chain.insert(TlvType::Signature, &signature);
    sub_chain.insert(TlvType::Identifier, accessory_id.as_bytes());

    let sealed = CryptoEnvelope::for_encrypt(envelope_key, NONCE_M2, sub_chain.encode())
        .ok()
        .and_then(|mut envelope| {
            envelope.encrypt().ok()?;
            envelope.wire_output()
        });
    let Some(wire) = sealed else {
        fail(session, 2, ErrorCode::Unknown);
        return;
    };

    let mut verify = PairVerify {
        step: 0,
        keypair,
        ios_e_pub: [0u8; 32],
        shared_secret,
        envelope_key,
    };
    verify.ios_e_pub.copy_from_slice(&ios_e_pub);
    verify.advance(2);
    session.pair_info.verify = Some(verify);

    let mut chain = TlvChain::new();
    chain.insert(TlvType::EncryptedData, &wire);
    chain.insert(TlvType::PublicKey, &accessory_e_pub);
    chain.insert(TlvType::State, &[2]);
    session.send_tlv(&chain);
    tracing::debug!("pair-verify M2 sent");
}

fn m3(
    emitter: &mut Emitter<Core>,
    session: &mut Session,
    session_ref: &SessionRef,
    chain: &TlvChain,
) {
    let Some(envelope_key) = session
        .pair_info
        .verify
        .as_ref()
        .filter(|verify| verify.step() == 2)
        .map(|verify| verify.envelope_key)
    else {
        fail(session, 4, ErrorCode::Unknown);
        return;
    };

    let Ok(encrypted) = chain.require(TlvType::EncryptedData) else {
        fail(session, 4, ErrorCode::Unknown);
        return;
    };
    let Ok(envelope) = CryptoEnvelope::for_decrypt(envelope_key, NONCE_M3, &encrypted) else {
        fail(session, 4, ErrorCode::Authentication);
        return;
    };

    if let Some(verify) = session.pair_info.verify.as_mut() {
        verify.advance(3);
    }
    session.pair_info.envelope = Some(envelope);

    emitter.emit_then(
        EventKind::NeedDecrypt,
        EventArg::Session(Rc::clone(session_ref)),
        on_m3_decrypted,
    );
}

/// Completion of the M3 `NeedDecrypt`: authenticate the controller and
/// finish the exchange
fn on_m3_decrypted(core: &mut Core, _emitter: &mut Emitter<Core>, event: &Event) {
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
    if !session
        .pair_info
        .verify
        .as_ref()
        .is_some_and(|verify| verify.step() == 3)
    {
        return;
    }

    if !envelope.decrypt_succeeded() {
        tracing::warn!("pair-verify M3 envelope failed authentication");
        fail(&mut session, 4, ErrorCode::Authentication);
        return;
    }

    let plaintext = envelope.plaintext.clone().unwrap_or_default();
    let inner = TlvChain::parse(&Bytes::from(plaintext));
    let (Ok(identifier), Ok(signature)) = (
        inner.require_exact(TlvType::Identifier, 36),
        inner.require_exact(TlvType::Signature, 64),
    ) else {
        fail(&mut session, 4, ErrorCode::Unknown);
        return;
    };

    let mut controller_id = [0u8; 36];
    controller_id.copy_from_slice(&identifier);
    let record = match core.storage.retrieve_paired_device(&controller_id) {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::warn!("pair-verify from unknown controller");
            fail(&mut session, 4, ErrorCode::Authentication);
            return;
        }
        Err(error) => {
            tracing::error!(%error, "paired device lookup failed");
            fail(&mut session, 4, ErrorCode::Unknown);
            return;
        }
    };

    // iOSDeviceInfo = iOS ePK || iOSDevicePairingID || accessory ePK
    let Some((ios_e_pub, accessory_e_pub, shared_secret)) = session
        .pair_info
        .verify
        .as_ref()
        .map(|verify| (verify.ios_e_pub, verify.keypair.public_bytes(), verify.shared_secret))
    else {
        return;
    };
    let mut device_info = Vec::with_capacity(32 + 36 + 32);
    device_info.extend_from_slice(&ios_e_pub);
    device_info.extend_from_slice(&identifier);
    device_info.extend_from_slice(&accessory_e_pub);

    if ed25519_verify(&record.public_key, &device_info, &signature).is_err() {
        tracing::warn!("controller signature rejected in pair-verify M3");
        fail(&mut session, 4, ErrorCode::Authentication);
        return;
    }

    session.pair_info.verify = None;
    session.pair_info.established = Some(VerifiedSession {
        controller_id,
        shared_secret,
    });

    let mut chain = TlvChain::new();
    chain.insert(TlvType::State, &[4]);
    session.send_tlv(&chain);
    tracing::debug!("pair-verify complete, session established");
}
