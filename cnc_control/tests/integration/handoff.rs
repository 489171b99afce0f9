//! Integration test: loop/interrupt handoff under a real tick thread.
//!
//! Validates: the super-loop and the tick source run concurrently through
//! the atomic busy flag, every block starts exactly once and the machine
//! ends at the programmed position.

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use cnc_control::executor::{MotionExecutor, RealtimeControl};
use cnc_control::queue::MotionAdmission;
use cnc_control::runner::{SuperLoop, spawn_tick_source};

use super::{config, rig_from};

#[test]
fn threaded_stream_reaches_programmed_position() {
    let mut cfg = config();
    cfg.timing.tick_rate_hz = 20_000;
    let rig = rig_from(&cfg);
    let tick_source =
        spawn_tick_source(rig.ticker, rig.pulses, cfg.timing.tick_rate_hz, None).unwrap();

    let program = [
        "G21 G90",
        "G1 X1 Y1 F3000",
        "G1 X2 Y0.5",
        "G0 Z2",
        "G91",
        "G1 X-0.5 Y0.5 Z-1",
        "G1 X-0.5",
    ];

    let mut super_loop = SuperLoop::new(rig.dispatcher);
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut next = 0;
    let mut answered = 0;
    while Instant::now() < deadline {
        // Stream like a sender: one line in flight, resend when unanswered.
        if next < program.len() && super_loop.dispatcher().link().pending_input() == 0 {
            super_loop.dispatcher_mut().link_mut().push_line(program[next]);
        }
        super_loop.step();
        let out = super_loop.dispatcher_mut().link_mut().take_output();
        if out.contains("ok") {
            answered += 1;
            next += 1;
        }
        let d = super_loop.dispatcher();
        if next == program.len() && !d.queue().has_pending() && !d.executor().is_busy() {
            break;
        }
        std::thread::sleep(Duration::from_micros(50));
    }

    let tick_stats = tick_source.stop().unwrap();
    let d = super_loop.dispatcher();
    assert_eq!(answered, program.len());
    assert!(!d.executor().is_busy(), "did not finish before the deadline");
    assert_eq!(d.stats().blocks_started, 5);
    assert_eq!(d.executor().snapshot().position, [10, 10, 10, 0]);
    // X 30, Y 20, Z 30 steps in total.
    assert_eq!(tick_stats.pulses, 80);
}

#[test]
fn super_loop_honours_iteration_limit() {
    let rig = rig_from(&config());
    let mut super_loop = SuperLoop::new(rig.dispatcher);
    let running = AtomicBool::new(true);
    super_loop.run(&running, Some(5), |_| false);
    assert_eq!(super_loop.stats().iterations, 5);
}

#[test]
fn super_loop_stops_when_finished() {
    let rig = rig_from(&config());
    let mut super_loop = SuperLoop::new(rig.dispatcher);
    super_loop.dispatcher_mut().link_mut().push_line("G90");
    let running = AtomicBool::new(true);
    super_loop.run(&running, Some(1000), |d| d.stats().modal_acks == 1);
    assert_eq!(super_loop.stats().iterations, 1);
    assert_eq!(super_loop.dispatcher().link().output(), "ok\r\n");
}
