//! Integration test: realtime control characters.
//!
//! Validates: status query format, feed hold / cycle start ramping through
//! the real executor, soft reset flushing motion and modal state, and
//! line-start-only interception.

use cnc_common::protocol::{RealtimeCommand, StatusCode};
use cnc_control::dispatcher::{LineOutcome, VERSION};
use cnc_control::executor::{MotionExecutor, RealtimeControl};
use cnc_control::queue::MotionAdmission;

use super::rig;

fn x_steps(rig: &super::Rig) -> i32 {
    rig.dispatcher.executor().snapshot().position[0]
}

#[test]
fn status_query_when_idle() {
    let mut rig = rig();
    let report = rig.send_bytes(b"?");
    assert_eq!(
        report.outcome,
        LineOutcome::ControlHandled(RealtimeCommand::StatusReport)
    );
    assert_eq!(rig.take_output(), "<Idle|MPos:0.000,0.000,0.000|Bf:4>\r\n");
}

#[test]
fn status_query_reports_position_after_move() {
    let mut rig = rig();
    rig.send("G1 X1.5 Y-2");
    rig.run_to_idle();
    rig.take_output();
    rig.send_bytes(b"?");
    assert_eq!(rig.take_output(), "<Idle|MPos:1.500,-2.000,0.000|Bf:4>\r\n");
}

#[test]
fn feed_hold_stops_motion_and_cycle_start_resumes() {
    let mut rig = rig();
    rig.send("G1 X10");
    rig.tick(100);
    rig.take_output();

    rig.send_bytes(b"!");
    assert_eq!(rig.take_output(), "", "feed hold is not acknowledged");
    rig.send_bytes(b"?");
    assert!(rig.take_output().starts_with("<Hold:1|"));

    // Decelerates over 10 ticks at 100 per-mille per tick.
    rig.tick(20);
    rig.send_bytes(b"?");
    assert!(rig.take_output().starts_with("<Hold:0|"));

    let frozen = x_steps(&rig);
    assert!((10..100).contains(&frozen));
    rig.tick(200);
    assert_eq!(x_steps(&rig), frozen);
    assert!(rig.dispatcher.executor().is_busy());

    rig.send_bytes(b"~");
    assert_eq!(rig.take_output(), "");
    rig.run_to_idle();
    assert_eq!(x_steps(&rig), 100);
}

#[test]
fn soft_reset_aborts_motion_and_restores_modal_defaults() {
    let mut rig = rig();
    rig.send("G1 X10");
    rig.send("G1 Y1");
    rig.send("G91");
    rig.tick(300);
    assert_eq!(x_steps(&rig), 30);
    rig.take_output();

    let report = rig.send_bytes(&[0x18]);
    assert_eq!(
        report.outcome,
        LineOutcome::ControlHandled(RealtimeCommand::SoftReset)
    );
    assert_eq!(
        rig.take_output(),
        format!("\r\nCNC control {VERSION} ['?' for status]\r\n")
    );
    assert_eq!(rig.dispatcher.queue().len(), 0);

    rig.tick(1);
    assert!(!rig.dispatcher.executor().is_busy());
    assert_eq!(x_steps(&rig), 30);

    // Absolute mode again, planned from the machine position.
    rig.send("G1 X5");
    rig.run_to_idle();
    assert_eq!(x_steps(&rig), 50);
    assert_eq!(rig.dispatcher.executor().snapshot().position[1], 0);
}

#[test]
fn realtime_byte_at_line_start_is_not_part_of_line() {
    let mut rig = rig();
    rig.dispatcher.link_mut().push_bytes(b"?G1 X5\n");
    assert_eq!(
        rig.dispatcher.poll().outcome,
        LineOutcome::ControlHandled(RealtimeCommand::StatusReport)
    );
    assert_eq!(rig.dispatcher.poll().outcome, LineOutcome::Admitted);
    let out = rig.take_output();
    assert!(out.starts_with("<Idle|"));
    assert!(out.ends_with("ok\r\n"));
}

#[test]
fn realtime_byte_mid_line_is_line_content() {
    let mut rig = rig();
    let report = rig.send("G1 X1!");
    assert_eq!(
        report.outcome,
        LineOutcome::ParseError(StatusCode::ExpectedCommandLetter)
    );
    assert!(!rig.dispatcher.executor().snapshot().feed_hold);
}

#[test]
fn realtime_handling_ends_the_iteration() {
    let mut rig = rig();
    rig.send("G1 X10");
    rig.send("G1 X20");
    rig.tick(1000);
    assert_eq!(rig.dispatcher.queue().len(), 1);

    // Executor idle and a block pending, but the status query ends the
    // iteration before the drain step.
    let report = rig.send_bytes(b"?");
    assert!(!report.started_block);
    assert!(rig.dispatcher.poll().started_block);
}
