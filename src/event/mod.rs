//! Cooperative event dispatcher
//!
//! A single-threaded FIFO queue of named events. Each tick dequeues one
//! event, invokes every registered listener for its kind in registration
//! order, then the emit's completion callback, then retires the event.
//! Emits from inside a handler are staged and join the queue tail, so they
//! run in later ticks rather than recursively; everything emitted before an
//! event is fully dispatched before anything emitted after it.
//!
//! Long cryptographic computations are chained through these events so the
//! façade can interleave network polling between steps. There is no
//! cancellation: a closed connection marks its session, and late handlers
//! observe the flag and do nothing.

use std::collections::VecDeque;

use crate::session::SessionRef;

#[cfg(test)]
mod tests;

/// Event identifiers
///
/// The four `Net*`/`Sd*` kinds are the public surface; the remaining kinds
/// sequence private cryptographic work and are only emitted internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A controller connection was established
    NetConnect,
    /// A complete request is available on a session
    NetReceiveRequest,
    /// A controller connection went away
    NetDisconnect,
    /// Pairing count crossed the unpaired/paired boundary; the service
    /// record needs a refresh
    SdNeededUpdate,

    /// SRP salt and verifier are ready
    SrpInitFinishGenSalt,
    /// SRP server keypair is ready; M2 can be sent
    SrpInitComplete,
    /// SRP proof verification context is ready
    SrpProofVerifierCreated,
    /// SRP session key has been derived
    SrpProofSkeyGenerated,
    /// Expected client proof has been computed
    SrpProofSsideGenerated,
    /// Server proof is ready; M4 can be sent
    SrpProofComplete,
    /// An envelope on the session wants decryption
    NeedDecrypt,
}

/// Event argument
#[derive(Clone, Default)]
pub enum EventArg {
    /// No argument
    #[default]
    None,
    /// The session the event concerns
    Session(SessionRef),
}

/// A dispatched event
pub struct Event {
    /// Event identifier
    pub kind: EventKind,
    /// Event argument
    pub arg: EventArg,
}

impl Event {
    /// The session argument, if any
    #[must_use]
    pub fn session(&self) -> Option<&SessionRef> {
        match &self.arg {
            EventArg::Session(session) => Some(session),
            EventArg::None => None,
        }
    }
}

type ListenerFn<C> = Box<dyn FnMut(&mut C, &mut Emitter<C>, &Event)>;
type CompletionFn<C> = Box<dyn FnOnce(&mut C, &mut Emitter<C>, &Event)>;

struct Queued<C> {
    event: Event,
    on_complete: Option<CompletionFn<C>>,
}

/// Staging area handed to listeners for re-entrant emits
pub struct Emitter<C> {
    staged: Vec<Queued<C>>,
}

impl<C> Emitter<C> {
    /// Queue an event for a later tick
    pub fn emit(&mut self, kind: EventKind, arg: EventArg) {
        self.staged.push(Queued {
            event: Event { kind, arg },
            on_complete: None,
        });
    }

    /// Queue an event with a completion callback, invoked after all of the
    /// event's listeners have run
    pub fn emit_then(
        &mut self,
        kind: EventKind,
        arg: EventArg,
        on_complete: impl FnOnce(&mut C, &mut Emitter<C>, &Event) + 'static,
    ) {
        self.staged.push(Queued {
            event: Event { kind, arg },
            on_complete: Some(Box::new(on_complete)),
        });
    }
}

/// The dispatcher: listener table plus pending event queue
pub struct EventLoop<C> {
    queue: VecDeque<Queued<C>>,
    listeners: Vec<(EventKind, ListenerFn<C>)>,
}

impl<C> Default for EventLoop<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> EventLoop<C> {
    /// Create an empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            listeners: Vec::new(),
        }
    }

    /// Register a listener. Registration is append-only; there is no
    /// deregistration.
    pub fn on(
        &mut self,
        kind: EventKind,
        listener: impl FnMut(&mut C, &mut Emitter<C>, &Event) + 'static,
    ) {
        self.listeners.push((kind, Box::new(listener)));
    }

    /// Queue an event
    pub fn emit(&mut self, kind: EventKind, arg: EventArg) {
        self.queue.push_back(Queued {
            event: Event { kind, arg },
            on_complete: None,
        });
    }

    /// Queue an event with a completion callback
    pub fn emit_then(
        &mut self,
        kind: EventKind,
        arg: EventArg,
        on_complete: impl FnOnce(&mut C, &mut Emitter<C>, &Event) + 'static,
    ) {
        self.queue.push_back(Queued {
            event: Event { kind, arg },
            on_complete: Some(Box::new(on_complete)),
        });
    }

    /// Whether any events are pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Dispatch one event. Returns false when the queue is empty.
    pub fn tick(&mut self, ctx: &mut C) -> bool {
        let Some(queued) = self.queue.pop_front() else {
            return false;
        };

        let mut emitter = Emitter { staged: Vec::new() };
        for (kind, listener) in &mut self.listeners {
            if *kind == queued.event.kind {
                listener(ctx, &mut emitter, &queued.event);
            }
        }
        if let Some(on_complete) = queued.on_complete {
            on_complete(ctx, &mut emitter, &queued.event);
        }

        self.queue.extend(emitter.staged);
        true
    }

    /// Dispatch until the queue is empty, including events emitted along
    /// the way
    pub fn drain(&mut self, ctx: &mut C) {
        while self.tick(ctx) {}
    }
}
