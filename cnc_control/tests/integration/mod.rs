//! Shared rig for the integration scenarios.

mod handoff;
mod realtime;
mod streaming;

use cnc_control::config::{ControllerConfig, load_config_from_str};
use cnc_control::dispatcher::{Dispatcher, PollReport};
use cnc_control::executor::{
    PulseEdgeHandler, StepperExecutor, TrajectoryTicker, service_tick, stepper,
};
use cnc_control::parser::GcodeParser;
use cnc_control::planner::Planner;
use cnc_control::queue::MotionQueue;
use cnc_control::serial::MemorySerial;

pub const MACHINE_TOML: &str = r#"
[shared]
service_name = "cnc-it"

[stream]
queue_capacity = 4

[timing]
tick_rate_hz = 1000
hold_decel_per_tick = 100
resume_accel_per_tick = 100

[motion]
default_feed_rate = 600.0

[[axes]]
axis = "X"
steps_per_mm = 10.0
max_rate = 6000.0

[[axes]]
axis = "Y"
steps_per_mm = 10.0
max_rate = 6000.0

[[axes]]
axis = "Z"
steps_per_mm = 10.0
max_rate = 600.0
"#;

pub type TestDispatcher = Dispatcher<MemorySerial, GcodeParser, MotionQueue, StepperExecutor>;

/// Dispatcher plus the interrupt-side handlers.
pub struct Rig {
    pub dispatcher: TestDispatcher,
    pub ticker: TrajectoryTicker,
    pub pulses: PulseEdgeHandler,
}

pub fn config() -> ControllerConfig {
    load_config_from_str(MACHINE_TOML).unwrap()
}

pub fn rig() -> Rig {
    rig_from(&config())
}

pub fn rig_from(config: &ControllerConfig) -> Rig {
    let axes = config.axis_settings();
    let (executor, ticker, pulses) = stepper(&config.timing);
    let dispatcher = Dispatcher::new(
        MemorySerial::new(),
        GcodeParser::new(axes.axis_count),
        MotionQueue::new(config.stream.queue_capacity, Planner::from_config(config)),
        executor,
        axes,
    );
    Rig {
        dispatcher,
        ticker,
        pulses,
    }
}

impl Rig {
    /// Push one line and run one loop iteration.
    pub fn send(&mut self, line: &str) -> PollReport {
        self.dispatcher.link_mut().push_line(line);
        self.dispatcher.poll()
    }

    /// Push raw bytes and run one loop iteration.
    pub fn send_bytes(&mut self, bytes: &[u8]) -> PollReport {
        self.dispatcher.link_mut().push_bytes(bytes);
        self.dispatcher.poll()
    }

    pub fn take_output(&mut self) -> String {
        self.dispatcher.link_mut().take_output()
    }

    /// Run `n` ticks with their pulse edges.
    pub fn tick(&mut self, n: u32) {
        for _ in 0..n {
            service_tick(&mut self.ticker, &mut self.pulses);
        }
    }

    /// Interleave ticks and loop iterations until queue and executor are idle.
    pub fn run_to_idle(&mut self) {
        use cnc_control::executor::MotionExecutor;
        use cnc_control::queue::MotionAdmission;
        for _ in 0..1_000_000 {
            self.dispatcher.poll();
            if !self.dispatcher.executor().is_busy() && !self.dispatcher.queue().has_pending() {
                return;
            }
            self.tick(1);
        }
        panic!("machine never went idle");
    }
}
