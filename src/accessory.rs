//! Accessory façade
//!
//! Owns the persistent store, the event loop, and the optional built-in
//! TCP listener. The transport surface is three calls: [`Accessory::connect`]
//! opens a session, [`Accessory::receive`] delivers a parsed request, and
//! [`Accessory::disconnect`] tears the session down; the built-in listener
//! and the test suites drive exactly the same path.

use crate::announce::{Announce, ServiceRecord};
use crate::config::AccessoryConfig;
use crate::crypto::{derive_uuid, LongTermKeypair};
use crate::error::HapError;
use crate::event::{Emitter, Event, EventArg, EventKind, EventLoop};
use crate::net;
use crate::pairing;
use crate::session::{Connection, Method, Request, Session, SessionRef};
use crate::storage::{FileBackend, MemoryBackend, PersistentStore, StorageBackend, StorageError};

/// Shared state every event handler sees
pub(crate) struct Core {
    pub config: AccessoryConfig,
    pub storage: PersistentStore,
    pub accessory_id: String,
    pub announcer: Option<Box<dyn Announce>>,
}

impl Core {
    /// Load the accessory identity, generating and persisting it on first
    /// use
    pub fn ensure_lt_keys(&mut self) -> Result<LongTermKeypair, HapError> {
        if self.storage.have_accessory_lt_keys() {
            let (_public, keypair_bytes) = self.storage.accessory_lt_keys()?;
            Ok(LongTermKeypair::from_keypair_bytes(&keypair_bytes)?)
        } else {
            let keypair = LongTermKeypair::generate();
            self.storage
                .set_accessory_lt_keys(&keypair.public_bytes(), &keypair.to_keypair_bytes())?;
            tracing::info!("generated accessory long-term identity");
            Ok(keypair)
        }
    }

    /// Current `_hap._tcp` service record
    pub fn service_record(&self) -> ServiceRecord {
        let paired = self.storage.paired_device_count() > 0;
        ServiceRecord {
            name: self.config.name.clone(),
            port: self.config.port,
            txt: vec![
                ("c#".to_string(), "1".to_string()),
                ("ff".to_string(), "0".to_string()),
                ("id".to_string(), self.config.device_id.clone()),
                ("md".to_string(), self.config.model.clone()),
                ("pv".to_string(), "1.1".to_string()),
                ("s#".to_string(), "1".to_string()),
                ("sf".to_string(), if paired { "0" } else { "1" }.to_string()),
                ("ci".to_string(), self.config.category.to_string()),
            ],
        }
    }
}

/// The accessory daemon
pub struct Accessory {
    core: Core,
    events: EventLoop<Core>,
    listener: Option<net::Listener>,
}

impl Accessory {
    /// Build an accessory from its configuration
    ///
    /// Opens (or formats) persistent storage and wires the internal event
    /// listeners.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid setup code or a storage failure.
    pub fn new(config: AccessoryConfig) -> Result<Self, HapError> {
        config.validate()?;

        let backend: Box<dyn StorageBackend> = match &config.storage_path {
            Some(path) => Box::new(FileBackend::open(path).map_err(StorageError::Io)?),
            None => Box::new(MemoryBackend::new()),
        };
        let storage = PersistentStore::new(backend)?;
        let accessory_id = derive_uuid(&config.device_id);

        let mut events = EventLoop::new();
        events.on(EventKind::NetReceiveRequest, on_request_received);
        events.on(EventKind::NetDisconnect, on_disconnect);
        events.on(EventKind::SdNeededUpdate, on_sd_needed_update);
        pairing::register(&mut events);

        Ok(Self {
            core: Core {
                config,
                storage,
                accessory_id,
                announcer: None,
            },
            events,
            listener: None,
        })
    }

    /// Bind the configured port and publish the initial service record
    ///
    /// # Errors
    ///
    /// Returns [`HapError::AlreadyRunning`] when already bound, or the
    /// bind failure.
    pub fn begin(&mut self) -> Result<(), HapError> {
        if self.listener.is_some() {
            return Err(HapError::AlreadyRunning);
        }
        let listener = net::Listener::bind(self.core.config.port)?;
        tracing::info!(port = self.core.config.port, "accessory listening");
        self.listener = Some(listener);
        self.events.emit(EventKind::SdNeededUpdate, EventArg::None);
        Ok(())
    }

    /// One cooperative tick: network readiness work plus one full event
    /// drain
    pub fn handle(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.poll(self);
            self.listener = Some(listener);
        }
        self.drain();
        if let Some(listener) = self.listener.as_mut() {
            listener.flush();
        }
    }

    /// Dispatch queued events until the queue is empty
    pub fn drain(&mut self) {
        self.events.drain(&mut self.core);
    }

    /// Register a listener for a public event kind
    pub fn on(&mut self, kind: EventKind, mut listener: impl FnMut(&Event) + 'static) {
        self.events
            .on(kind, move |_core, _emitter, event| listener(event));
    }

    /// Open a new controller session
    ///
    /// Used by the built-in listener and by external transports.
    pub fn connect(&mut self) -> SessionRef {
        let session = Session::new(Connection::new());
        self.events
            .emit(EventKind::NetConnect, EventArg::Session(session.clone()));
        session
    }

    /// Deliver a complete request on a session
    pub fn receive(&mut self, session: &SessionRef, request: Request) {
        session.borrow_mut().request = Some(request);
        self.events.emit(
            EventKind::NetReceiveRequest,
            EventArg::Session(session.clone()),
        );
    }

    /// Tear a session down; in-flight pairing work becomes a no-op
    pub fn disconnect(&mut self, session: &SessionRef) {
        session.borrow_mut().close();
        self.events
            .emit(EventKind::NetDisconnect, EventArg::Session(session.clone()));
    }

    /// Attach a service announcer
    pub fn set_announcer(&mut self, announcer: Box<dyn Announce>) {
        self.core.announcer = Some(announcer);
    }

    /// Whether at least one controller is paired
    #[must_use]
    pub fn paired(&self) -> bool {
        self.core.storage.paired_device_count() > 0
    }

    /// The accessory pairing identifier (derived from the device id)
    #[must_use]
    pub fn accessory_id(&self) -> &str {
        &self.core.accessory_id
    }

    /// Accessory configuration
    #[must_use]
    pub fn config(&self) -> &AccessoryConfig {
        &self.core.config
    }

    /// Persistent store, read-only
    #[must_use]
    pub fn storage(&self) -> &PersistentStore {
        &self.core.storage
    }

    /// Persistent store, mutable (provisioning, tests)
    pub fn storage_mut(&mut self) -> &mut PersistentStore {
        &mut self.core.storage
    }
}

/// `NetReceiveRequest`: route by URL path
fn on_request_received(core: &mut Core, emitter: &mut Emitter<Core>, event: &Event) {
    let Some(session_ref) = event.session() else {
        return;
    };

    let routed = {
        let session = session_ref.borrow();
        if session.is_closed() {
            return;
        }
        session
            .request
            .as_ref()
            .map(|request| (request.method, request.path.clone()))
    };
    let Some((method, path)) = routed else {
        return;
    };
    tracing::debug!(%path, "request received");

    if method != Method::Post {
        session_ref.borrow_mut().send_status(405);
        return;
    }
    match path.as_str() {
        "/pair-setup" => pairing::setup::on_pair_setup(core, emitter, session_ref),
        "/pair-verify" => pairing::verify::on_pair_verify(core, emitter, session_ref),
        "/pairings" => pairing::pairings::on_pairings(core, emitter, session_ref),
        _ => session_ref.borrow_mut().send_status(404),
    }
}

/// `NetDisconnect`: observability only; the session was already closed by
/// the transport hook
fn on_disconnect(_core: &mut Core, _emitter: &mut Emitter<Core>, event: &Event) {
    if event.session().is_some() {
        tracing::debug!("controller disconnected");
    }
}

/// `SdNeededUpdate`: push the current record to the announcer
fn on_sd_needed_update(core: &mut Core, _emitter: &mut Emitter<Core>, _event: &Event) {
    let record = core.service_record();
    if let Some(announcer) = core.announcer.as_mut() {
        if let Err(error) = announcer.update(&record) {
            tracing::error!(%error, "service record update failed");
        }
    }
}
