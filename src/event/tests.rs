use super::{EventArg, EventKind, EventLoop};

#[derive(Default)]
struct Trace {
    log: Vec<&'static str>,
}

#[test]
fn listeners_run_in_registration_order() {
    let mut events: EventLoop<Trace> = EventLoop::new();
    events.on(EventKind::SdNeededUpdate, |trace: &mut Trace, _, _| {
        trace.log.push("first");
    });
    events.on(EventKind::SdNeededUpdate, |trace: &mut Trace, _, _| {
        trace.log.push("second");
    });

    let mut trace = Trace::default();
    events.emit(EventKind::SdNeededUpdate, EventArg::None);
    events.drain(&mut trace);

    assert_eq!(trace.log, vec!["first", "second"]);
}

#[test]
fn fifo_across_emitters() {
    // Everything emitted before an event is fully dispatched before
    // anything emitted after it
    let mut events: EventLoop<Trace> = EventLoop::new();
    events.on(EventKind::NetConnect, |trace: &mut Trace, emitter, _| {
        trace.log.push("connect");
        emitter.emit(EventKind::SdNeededUpdate, EventArg::None);
        emitter.emit(EventKind::NetDisconnect, EventArg::None);
    });
    events.on(EventKind::SdNeededUpdate, |trace: &mut Trace, _, _| {
        trace.log.push("sd-update");
    });
    events.on(EventKind::NetDisconnect, |trace: &mut Trace, _, _| {
        trace.log.push("disconnect");
    });

    let mut trace = Trace::default();
    events.emit(EventKind::NetConnect, EventArg::None);
    events.emit(EventKind::NetReceiveRequest, EventArg::None);
    events.drain(&mut trace);

    // The already-queued receive-request event has no listener but still
    // precedes the re-entrant emits
    assert_eq!(trace.log, vec!["connect", "sd-update", "disconnect"]);
}

#[test]
fn reentrant_emits_are_not_recursive() {
    let mut events: EventLoop<Trace> = EventLoop::new();
    events.on(EventKind::NetConnect, |trace: &mut Trace, emitter, _| {
        emitter.emit(EventKind::NetDisconnect, EventArg::None);
        // If dispatch were recursive the disconnect would already be logged
        trace.log.push("connect-done");
    });
    events.on(EventKind::NetDisconnect, |trace: &mut Trace, _, _| {
        trace.log.push("disconnect");
    });

    let mut trace = Trace::default();
    events.emit(EventKind::NetConnect, EventArg::None);
    assert!(events.tick(&mut trace));
    assert_eq!(trace.log, vec!["connect-done"]);

    assert!(events.tick(&mut trace));
    assert_eq!(trace.log, vec!["connect-done", "disconnect"]);
    assert!(!events.tick(&mut trace));
}

#[test]
fn completion_runs_after_listeners() {
    let mut events: EventLoop<Trace> = EventLoop::new();
    events.on(EventKind::NeedDecrypt, |trace: &mut Trace, _, _| {
        trace.log.push("listener");
    });

    let mut trace = Trace::default();
    events.emit_then(EventKind::NeedDecrypt, EventArg::None, |trace, _, _| {
        trace.log.push("completion");
    });
    events.emit(EventKind::NeedDecrypt, EventArg::None);
    events.drain(&mut trace);

    assert_eq!(trace.log, vec!["listener", "completion", "listener"]);
}

#[test]
fn completion_can_chain_further_events() {
    let mut events: EventLoop<Trace> = EventLoop::new();
    events.on(EventKind::SdNeededUpdate, |trace: &mut Trace, _, _| {
        trace.log.push("chained");
    });

    let mut trace = Trace::default();
    events.emit_then(EventKind::NeedDecrypt, EventArg::None, |trace, emitter, _| {
        trace.log.push("completion");
        emitter.emit(EventKind::SdNeededUpdate, EventArg::None);
    });
    events.drain(&mut trace);

    assert_eq!(trace.log, vec!["completion", "chained"]);
}
