//! `/pairings` admin endpoint: add, remove, and list pairings
//!
//! Only a verified session whose controller holds admin permissions may
//! administer the pairing table. Removing the last admin clears every
//! pairing and returns the accessory to unpaired mode.

use crate::accessory::Core;
use crate::event::{Emitter, EventArg, EventKind};
use crate::session::{Session, SessionRef};
use crate::storage::{StorageError, PERMISSION_ADMIN};
use crate::tlv::{methods, TlvChain, TlvType};

use super::{error_state, fail, ErrorCode};

/// Entry point for POST `/pairings`
pub(crate) fn on_pairings(core: &mut Core, emitter: &mut Emitter<Core>, session_ref: &SessionRef) {
    let mut session = session_ref.borrow_mut();
    let Some(body) = session.body() else {
        session.send_status(400);
        return;
    };

    let chain = TlvChain::parse(&body);
    let state = chain.byte_of(TlvType::State);
    if state != Some(1) {
        fail(&mut session, error_state(state), ErrorCode::Unknown);
        return;
    }
    let Some(method) = chain.byte_of(TlvType::Method) else {
        fail(&mut session, 2, ErrorCode::Unknown);
        return;
    };

    let Some(controller_id) = session
        .pair_info
        .established
        .as_ref()
        .map(|established| established.controller_id)
    else {
        tracing::warn!("pairings request on an unverified session");
        fail(&mut session, 2, ErrorCode::Authentication);
        return;
    };

    let admin = match core.storage.retrieve_paired_device(&controller_id) {
        Ok(Some(record)) => record.is_admin(),
        Ok(None) => false,
        Err(error) => {
            tracing::error!(%error, "paired device lookup failed");
            fail(&mut session, 2, ErrorCode::Unknown);
            return;
        }
    };
    if !admin {
        tracing::warn!("pairings request from non-admin controller");
        fail(&mut session, 2, ErrorCode::Authentication);
        return;
    }

    match method {
        methods::ADD_PAIRING => add(core, &mut session, &chain),
        methods::REMOVE_PAIRING => remove(core, emitter, &mut session, &chain),
        methods::LIST_PAIRINGS => list(core, &mut session),
        _ => fail(&mut session, 2, ErrorCode::Unknown),
    }
}

fn add(core: &mut Core, session: &mut Session, chain: &TlvChain) {
    let (Ok(identifier), Ok(public_key), Ok(permissions)) = (
        chain.require_exact(TlvType::Identifier, 36),
        chain.require_exact(TlvType::PublicKey, 32),
        chain.require_exact(TlvType::Permissions, 1),
    ) else {
        fail(session, 2, ErrorCode::Unknown);
        return;
    };

    let mut id = [0u8; 36];
    id.copy_from_slice(&identifier);
    let mut ltpk = [0u8; 32];
    ltpk.copy_from_slice(&public_key);

    // A known identifier presenting a different long-term key is an attack
    // or a confused controller; either way, refuse
    match core.storage.retrieve_paired_device(&id) {
        Ok(Some(existing)) if existing.public_key != ltpk => {
            fail(session, 2, ErrorCode::Unknown);
            return;
        }
        Ok(_) => {}
        Err(error) => {
            tracing::error!(%error, "paired device lookup failed");
            fail(session, 2, ErrorCode::Unknown);
            return;
        }
    }

    match core
        .storage
        .add_paired_device(&id, &ltpk, [permissions[0], 0, 0, 0])
    {
        Ok(()) => {
            let mut response = TlvChain::new();
            response.insert(TlvType::State, &[2]);
            session.send_tlv(&response);
            tracing::debug!("pairing added");
        }
        Err(StorageError::TableFull) => fail(session, 2, ErrorCode::MaxPeers),
        Err(error) => {
            tracing::error!(%error, "failed to store pairing");
            fail(session, 2, ErrorCode::Unknown);
        }
    }
}

fn remove(core: &mut Core, emitter: &mut Emitter<Core>, session: &mut Session, chain: &TlvChain) {
    let Ok(identifier) = chain.require_exact(TlvType::Identifier, 36) else {
        fail(session, 2, ErrorCode::Unknown);
        return;
    };
    let mut id = [0u8; 36];
    id.copy_from_slice(&identifier);

    let before = core.storage.paired_device_count();
    let removed = match core.storage.remove_paired_device(&id) {
        Ok(removed) => removed,
        Err(error) => {
            tracing::error!(%error, "failed to remove pairing");
            fail(session, 2, ErrorCode::Unknown);
            return;
        }
    };

    if removed {
        // With no admin left the remaining pairings are unreachable;
        // drop them all and re-enter unpaired mode
        let orphaned = match core.storage.paired_devices() {
            Ok(devices) => !devices.is_empty() && !devices.iter().any(|d| d.flags[0] & PERMISSION_ADMIN != 0),
            Err(error) => {
                tracing::error!(%error, "paired device scan failed");
                fail(session, 2, ErrorCode::Unknown);
                return;
            }
        };
        if orphaned {
            tracing::info!("last admin removed, clearing all pairings");
            if let Err(error) = core.storage.clear_pairings() {
                tracing::error!(%error, "failed to clear pairings");
                fail(session, 2, ErrorCode::Unknown);
                return;
            }
        }
    }

    if before > 0 && core.storage.paired_device_count() == 0 {
        emitter.emit(EventKind::SdNeededUpdate, EventArg::None);
    }

    let mut response = TlvChain::new();
    response.insert(TlvType::State, &[2]);
    session.send_tlv(&response);
    tracing::debug!(removed, "pairing removal handled");
}

fn list(core: &mut Core, session: &mut Session) {
    let devices = match core.storage.paired_devices() {
        Ok(devices) => devices,
        Err(error) => {
            tracing::error!(%error, "paired device scan failed");
            fail(session, 2, ErrorCode::Unknown);
            return;
        }
    };

    // Built back to front: separators sit between records, State leads
    let mut response = TlvChain::new();
    for (index, device) in devices.iter().enumerate().rev() {
        response.insert(TlvType::Permissions, &[device.flags[0]]);
        response.insert(TlvType::PublicKey, &device.public_key);
        response.insert(TlvType::Identifier, &device.identifier);
        if index > 0 {
            response.insert(TlvType::Separator, &[]);
        }
    }
    response.insert(TlvType::State, &[2]);
    session.send_tlv(&response);
}
