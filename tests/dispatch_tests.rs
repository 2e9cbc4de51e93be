//! Dispatcher fan-out, handler removal, response framing and halt gating
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use gcode_dispatch::gcode::Args;
use gcode_dispatch::{
    Dispatcher, GCode, GCodeProcessor, HaltFlag, HaltState, HandlerId, HandlerKind, OutputStream,
};

struct Fixture {
    dispatcher: Dispatcher,
    halt: Arc<HaltFlag>,
    cb1: Arc<AtomicBool>,
    cb2: Arc<AtomicBool>,
    cb3: Arc<AtomicBool>,
    h3: HandlerId,
    args: Arc<Mutex<Args>>,
    gcodes: Vec<GCode>,
}

fn flag_handler(flag: &Arc<AtomicBool>) -> impl Fn(&mut GCode, &mut OutputStream) -> bool + Send + Sync + 'static {
    let flag = flag.clone();
    move |_, _| {
        flag.store(true, Ordering::SeqCst);
        true
    }
}

fn setup() -> Fixture {
    let halt = Arc::new(HaltFlag::new());
    let mut dispatcher = Dispatcher::new(halt.clone());
    let cb1 = Arc::new(AtomicBool::new(false));
    let cb2 = Arc::new(AtomicBool::new(false));
    let cb3 = Arc::new(AtomicBool::new(false));
    let args = Arc::new(Mutex::new(Args::new()));

    {
        let cb1 = cb1.clone();
        let args = args.clone();
        dispatcher.add_handler(HandlerKind::GCode, 1, move |gc, _| {
            *args.lock().unwrap() = gc.args().clone();
            cb1.store(true, Ordering::SeqCst);
            true
        });
    }
    dispatcher.add_handler(HandlerKind::MCode, 1, flag_handler(&cb2));
    let h3 = dispatcher.add_handler(HandlerKind::GCode, 1, flag_handler(&cb3));

    let mut gp = GCodeProcessor::new();
    let mut gcodes = Vec::new();
    assert!(gp.parse("G1 X1 Y2 M1 G4 S10", &mut gcodes).is_ok());
    assert_eq!(gcodes.len(), 3);

    Fixture {
        dispatcher,
        halt,
        cb1,
        cb2,
        cb3,
        h3,
        args,
        gcodes,
    }
}

#[test]
fn check_callbacks() {
    let mut f = setup();
    let mut os = OutputStream::buffered();

    assert!(f.dispatcher.dispatch(&mut f.gcodes[0], &mut os));
    assert_eq!(os.take_contents(), "ok\n");
    assert!(f.cb1.load(Ordering::SeqCst));
    assert!(!f.cb2.load(Ordering::SeqCst));
    assert!(f.cb3.load(Ordering::SeqCst));
    {
        let args = f.args.lock().unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[&'X'], 1.0);
        assert_eq!(args[&'Y'], 2.0);
    }

    assert!(f.dispatcher.dispatch(&mut f.gcodes[1], &mut os));
    assert_eq!(os.take_contents(), "ok\n");
    assert!(f.cb2.load(Ordering::SeqCst));

    // nothing registered for G4
    assert!(!f.dispatcher.dispatch(&mut f.gcodes[2], &mut os));
    assert_eq!(os.take_contents(), "");
}

#[test]
fn remove_second_g1_handler() {
    let mut f = setup();
    assert!(f.dispatcher.remove_handler(HandlerKind::GCode, f.h3));
    // the id belongs to the G registry only
    assert!(!f.dispatcher.remove_handler(HandlerKind::MCode, f.h3));

    let mut os = OutputStream::null();
    assert!(f.dispatcher.dispatch(&mut f.gcodes[0], &mut os));
    assert!(f.cb1.load(Ordering::SeqCst));
    assert!(!f.cb3.load(Ordering::SeqCst));
}

#[test]
fn one_off_dispatch() {
    let f = setup();
    let mut os = OutputStream::buffered();
    assert!(f.args.lock().unwrap().is_empty());

    f.dispatcher
        .dispatch_one(&mut os, 'G', 1, 0, &[('X', 456.0), ('Y', -789.0), ('Z', 123.0)]);
    assert_eq!(os.contents(), "ok\n");
    assert!(f.cb1.load(Ordering::SeqCst));

    let args = f.args.lock().unwrap();
    assert_eq!(args.len(), 3);
    assert_eq!(args[&'X'], 456.0);
    assert_eq!(args[&'Y'], -789.0);
    assert_eq!(args[&'Z'], 123.0);
}

#[test]
fn clear_handlers_removes_everything() {
    let mut f = setup();
    f.dispatcher.add_command_handler("version", |_, _| true);
    f.dispatcher.clear_handlers();

    let mut os = OutputStream::buffered();
    assert!(!f.dispatcher.dispatch(&mut f.gcodes[0], &mut os));
    assert!(!f.dispatcher.dispatch_command("version", &mut os));
    assert_eq!(f.dispatcher.commands().count(), 0);
}

#[test]
fn declining_handler_does_not_block_others() {
    let mut f = setup();
    f.dispatcher.add_handler(HandlerKind::MCode, 1, |gc, _| gc.has_arg('S'));

    let mut os = OutputStream::buffered();
    assert!(f.dispatcher.dispatch(&mut f.gcodes[1], &mut os));
    assert_eq!(os.contents(), "ok\n");
}

#[test]
fn halt_round_trip() {
    let mut f = setup();
    let ran_m1 = Arc::new(AtomicBool::new(false));
    f.dispatcher.add_handler(HandlerKind::MCode, 42, |gc, _| {
        gc.set_error("value out of range");
        true
    });
    f.dispatcher.add_handler(HandlerKind::MCode, 1, flag_handler(&ran_m1));

    let mut os = OutputStream::buffered();
    assert!(f.dispatcher.dispatch_one(&mut os, 'M', 42, 0, &[]));
    assert_eq!(
        os.take_contents(),
        "Error: value out of range\nEntering Alarm/Halt state\n"
    );
    assert!(f.halt.is_halted());

    // M1 is not on the allow list
    assert!(f.dispatcher.dispatch(&mut f.gcodes[1], &mut os));
    assert_eq!(os.take_contents(), "!!\n");
    assert!(!ran_m1.load(Ordering::SeqCst));
    assert!(!f.cb2.load(Ordering::SeqCst));

    assert!(f.dispatcher.dispatch_one(&mut os, 'M', 999, 0, &[]));
    assert_eq!(
        os.take_contents(),
        "WARNING: After HALT you should HOME as position is currently unknown\nok\n"
    );
    assert!(!f.halt.is_halted());

    assert!(f.dispatcher.dispatch(&mut f.gcodes[1], &mut os));
    assert_eq!(os.take_contents(), "ok\n");
    assert!(ran_m1.load(Ordering::SeqCst));
}

#[test]
fn external_halt_is_observed() {
    let mut f = setup();
    // e.g. an emergency stop outside the command thread
    f.halt.broadcast_halt(true);

    let mut os = OutputStream::buffered();
    assert!(f.dispatcher.dispatch(&mut f.gcodes[0], &mut os));
    assert_eq!(os.contents(), "!!\n");
    assert!(!f.cb1.load(Ordering::SeqCst));
}

#[test]
fn accepted_commands_always_end_in_ok() {
    let mut dispatcher = Dispatcher::default();
    dispatcher.add_handler(HandlerKind::MCode, 105, |_, os| {
        os.puts("ok T:21.3 /0.0\n");
        os.set_no_response(true);
        true
    });
    dispatcher.add_handler(HandlerKind::GCode, 4, |gc, os| {
        os.printf(format_args!("dwell {}\n", gc.arg('S').unwrap_or(0.0)));
        true
    });

    let mut os = OutputStream::buffered();
    for _ in 0..3 {
        assert!(dispatcher.dispatch_one(&mut os, 'G', 4, 0, &[('S', 1.0)]));
        assert!(os.take_contents().ends_with("ok\n"));
    }
    assert!(dispatcher.dispatch_one(&mut os, 'M', 105, 0, &[]));
    assert_eq!(os.take_contents(), "ok T:21.3 /0.0\n");
    // the flag does not leak into the next dispatch
    assert!(dispatcher.dispatch_one(&mut os, 'G', 4, 0, &[]));
    assert_eq!(os.take_contents(), "dwell 0\nok\n");
}
