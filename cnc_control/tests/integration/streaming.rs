//! Integration test: ok/error streaming flow control.
//!
//! Validates: one answer per line, silent deferral on a full queue,
//! modal lines bypassing the queue, overflow and parse error recovery,
//! refusal of moves outside the step range.

use cnc_common::protocol::StatusCode;
use cnc_control::dispatcher::LineOutcome;
use cnc_control::executor::MotionExecutor;
use cnc_control::queue::MotionAdmission;

use super::rig;

// ── Flow Control ────────────────────────────────────────────────────

#[test]
fn full_queue_defers_until_a_block_drains() {
    let mut rig = rig();
    // 10 mm at 600 mm/min: 1000 ticks, keeps the executor busy.
    assert_eq!(rig.send("G1 X10").outcome, LineOutcome::Admitted);
    assert!(rig.dispatcher.executor().is_busy());
    assert_eq!(rig.dispatcher.queue().len(), 0);
    rig.take_output();

    for y in 1..=4 {
        let report = rig.send(&format!("G1 Y{y}"));
        assert_eq!(report.outcome, LineOutcome::Admitted);
    }
    assert_eq!(rig.take_output(), "ok\r\n".repeat(4));
    assert_eq!(rig.dispatcher.queue().len(), 4);

    // Fifth line: queue full, no answer at all.
    let report = rig.send("G1 Y5");
    assert_eq!(report.outcome, LineOutcome::RejectedSilent);
    assert_eq!(rig.take_output(), "");
    assert_eq!(rig.dispatcher.queue().len(), 4);

    // Finish the running block; the next iteration drains one.
    rig.tick(1000);
    assert!(!rig.dispatcher.executor().is_busy());
    let report = rig.dispatcher.poll();
    assert_eq!(report.outcome, LineOutcome::NoInput);
    assert!(report.started_block);
    assert_eq!(rig.dispatcher.queue().len(), 3);

    // The sender resends the unanswered line.
    assert_eq!(rig.send("G1 Y5").outcome, LineOutcome::Admitted);
    assert_eq!(rig.take_output(), "ok\r\n");
    assert_eq!(rig.dispatcher.queue().len(), 4);

    let stats = rig.dispatcher.stats();
    assert_eq!(stats.motion_acks, 6);
    assert_eq!(stats.deferred, 1);
}

#[test]
fn deferred_line_leaves_modal_state_untouched() {
    let mut rig = rig();
    rig.send("G1 X10");
    for y in 1..=4 {
        rig.send(&format!("G1 Y{y}"));
    }
    rig.take_output();

    // Rejected: its G91 must not leak into later lines.
    assert_eq!(rig.send("G91 G1 X1").outcome, LineOutcome::RejectedSilent);
    rig.run_to_idle();

    rig.send("G1 X2");
    rig.run_to_idle();
    let pos = rig.dispatcher.status_report().position;
    assert!((pos[0] - 2.0).abs() < 1e-9, "absolute mode kept, got {pos:?}");
}

// ── Modal Lines ─────────────────────────────────────────────────────

#[test]
fn modal_line_acks_without_queue_interaction() {
    let mut rig = rig();
    rig.send("G1 X10");
    for y in 1..=4 {
        rig.send(&format!("G1 Y{y}"));
    }
    assert_eq!(rig.dispatcher.queue().len(), 4);
    rig.take_output();

    // Queue is full, yet a modal line is answered immediately.
    assert_eq!(rig.send("G90").outcome, LineOutcome::ModalAck);
    assert_eq!(rig.take_output(), "ok\r\n");
    assert_eq!(rig.dispatcher.queue().len(), 4);
}

#[test]
fn empty_and_comment_lines_are_acknowledged() {
    let mut rig = rig();
    assert_eq!(rig.send("").outcome, LineOutcome::ModalAck);
    assert_eq!(rig.send("(probe setup)").outcome, LineOutcome::ModalAck);
    assert_eq!(rig.send("; nothing").outcome, LineOutcome::ModalAck);
    assert_eq!(rig.take_output(), "ok\r\n".repeat(3));
    assert_eq!(rig.dispatcher.queue().len(), 0);
}

#[test]
fn crlf_terminated_lines_are_answered_once() {
    let mut rig = rig();
    rig.send_bytes(b"G21\r\n");
    assert_eq!(rig.dispatcher.poll().outcome, LineOutcome::NoInput);
    assert_eq!(rig.take_output(), "ok\r\n");
}

// ── Errors ──────────────────────────────────────────────────────────

#[test]
fn malformed_line_gets_one_error_with_cause() {
    let mut rig = rig();
    let report = rig.send("G1 X1.2.3");
    assert_eq!(report.outcome, LineOutcome::ParseError(StatusCode::BadNumberFormat));

    let out = rig.take_output();
    assert_eq!(out.lines().count(), 1);
    let cause = out
        .strip_prefix("error:2 (")
        .and_then(|s| s.strip_suffix(")\r\n"))
        .unwrap();
    assert!(!cause.is_empty());

    assert_eq!(rig.dispatcher.queue().len(), 0);
    assert!(!rig.dispatcher.executor().is_busy());
    assert_eq!(rig.dispatcher.stats().errors, 1);

    // The next line is unaffected.
    assert_eq!(rig.send("G1 X1").outcome, LineOutcome::Admitted);
}

#[test]
fn unconfigured_axis_is_rejected() {
    let mut rig = rig();
    let report = rig.send("G1 A10");
    assert_eq!(report.outcome, LineOutcome::ParseError(StatusCode::AxisNotConfigured));
    assert!(rig.take_output().starts_with("error:14 ("));
}

#[test]
fn unreachable_target_is_answered_with_error() {
    let mut rig = rig();
    // 10 steps/mm: 3e8 mm is beyond the step counter range.
    let report = rig.send("G1 X300000000");
    assert_eq!(report.outcome, LineOutcome::Refused(StatusCode::InvalidTarget));
    assert_eq!(rig.take_output(), "error:33 (Target out of range on axis X)\r\n");
    assert!(!rig.dispatcher.executor().is_busy());
    assert_eq!(rig.dispatcher.queue().planner().state().position[0], 0);
}

#[test]
fn refused_move_keeps_planned_position_consistent() {
    let mut rig = rig();
    assert_eq!(rig.send("G1 X200000000").outcome, LineOutcome::Admitted);
    rig.take_output();

    // Reachable endpoint, but the step delta overflows a block.
    let report = rig.send("G1 X-200000000");
    assert_eq!(report.outcome, LineOutcome::Refused(StatusCode::InvalidTarget));
    assert!(rig.take_output().starts_with("error:33 ("));

    assert_eq!(rig.send("G1 X199999999").outcome, LineOutcome::Admitted);
    assert_eq!(rig.take_output(), "ok\r\n");
    assert_eq!(
        rig.dispatcher.queue().planner().state().position[0],
        1_999_999_990
    );
}

#[test]
fn overflow_reports_once_then_recovers() {
    let mut rig = rig();
    let long = format!("G1 X{}", "1".repeat(120));
    rig.dispatcher.link_mut().push_line(&long);
    rig.dispatcher.link_mut().push_line("G1 X1");

    let mut outcomes = Vec::new();
    for _ in 0..8 {
        let outcome = rig.dispatcher.poll().outcome;
        if outcome != LineOutcome::NoInput {
            outcomes.push(outcome);
        }
    }
    assert_eq!(outcomes, [LineOutcome::Overflow, LineOutcome::Admitted]);
    assert_eq!(rig.take_output(), "error:11 (Line overflow)\r\nok\r\n");
    assert_eq!(rig.dispatcher.stats().overflows, 1);
}

#[test]
fn answers_match_completed_lines() {
    let mut rig = rig();
    let program = ["G21", "G90", "G1 X1 F1200", "G1 Y1", "G0 Z1", "G1 X", "M3", "G1 X0 Y0 Z0"];
    for line in program {
        rig.send(line);
        rig.run_to_idle();
    }
    let out = rig.take_output();
    let oks = out.matches("ok\r\n").count();
    let errors = out.matches("error:").count();
    assert_eq!(oks, 6);
    assert_eq!(errors, 2);
    assert_eq!(rig.dispatcher.stats().blocks_started, 4);
}
