//! Real-time thread setup and pacing for the tick source.
//!
//! With the `rt` feature the calling thread locks memory, prefaults its
//! stack, pins itself to one core and switches to `SCHED_FIFO`, and
//! [`TickPacer`] sleeps with `clock_nanosleep(TIMER_ABSTIME)` on
//! `CLOCK_MONOTONIC`. Without it setup is a no-op and pacing falls back to
//! `std::thread::sleep`, so the simulator runs unprivileged.

use std::time::Duration;

use crate::error::RunError;

/// Stack prefaulted before entering the tick loop.
const PREFAULT_STACK_BYTES: usize = 256 * 1024;

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RunError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RunError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), RunError> {
    Ok(())
}

fn prefault_stack() {
    let mut buf = [0u8; PREFAULT_STACK_BYTES];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into a local array.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), RunError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| RunError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| RunError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), RunError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), RunError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pid 0 targets the calling thread; `param` outlives the call.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(RunError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), RunError> {
    Ok(())
}

/// CPU placement of the tick source thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtSettings {
    pub cpu_core: usize,
    pub priority: i32,
}

impl Default for RtSettings {
    fn default() -> Self {
        Self {
            cpu_core: 1,
            priority: 80,
        }
    }
}

/// Prepare the calling thread for the tick loop.
pub fn rt_setup(settings: RtSettings) -> Result<(), RunError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(settings.cpu_core)?;
    rt_set_scheduler(settings.priority)
}

// ─── Tick Pacing ────────────────────────────────────────────────────

/// Absolute-deadline pacing: each wait targets the previous deadline plus
/// one period, so work time does not accumulate as drift.
#[cfg(feature = "rt")]
pub struct TickPacer {
    period: nix::sys::time::TimeSpec,
    next_wake: nix::sys::time::TimeSpec,
}

#[cfg(feature = "rt")]
impl TickPacer {
    const CLOCK: nix::time::ClockId = nix::time::ClockId::CLOCK_MONOTONIC;

    pub fn new(period: Duration) -> Result<Self, RunError> {
        Ok(Self {
            period: nix::sys::time::TimeSpec::from_duration(period),
            next_wake: Self::now()?,
        })
    }

    fn now() -> Result<nix::sys::time::TimeSpec, RunError> {
        nix::time::clock_gettime(Self::CLOCK)
            .map_err(|e| RunError::RtSetup(format!("clock_gettime: {e}")))
    }

    /// Sleep until the next deadline. Returns `false` when the deadline had
    /// already passed; a miss of more than one period re-anchors on now.
    pub fn wait(&mut self) -> Result<bool, RunError> {
        use nix::time::{ClockNanosleepFlags, clock_nanosleep};

        self.next_wake = self.next_wake + self.period;
        let now = Self::now()?;
        if now < self.next_wake {
            // EINTR only shortens one period.
            let _ = clock_nanosleep(Self::CLOCK, ClockNanosleepFlags::TIMER_ABSTIME, &self.next_wake);
            return Ok(true);
        }
        if now - self.next_wake > self.period {
            self.next_wake = now;
        }
        Ok(false)
    }
}

/// Absolute-deadline pacing: each wait targets the previous deadline plus
/// one period, so work time does not accumulate as drift.
#[cfg(not(feature = "rt"))]
pub struct TickPacer {
    period: Duration,
    next_wake: std::time::Instant,
}

#[cfg(not(feature = "rt"))]
impl TickPacer {
    pub fn new(period: Duration) -> Result<Self, RunError> {
        Ok(Self {
            period,
            next_wake: std::time::Instant::now(),
        })
    }

    /// Sleep until the next deadline. Returns `false` when the deadline had
    /// already passed; a miss of more than one period re-anchors on now.
    pub fn wait(&mut self) -> Result<bool, RunError> {
        self.next_wake += self.period;
        let now = std::time::Instant::now();
        match self.next_wake.checked_duration_since(now) {
            Some(remaining) => {
                std::thread::sleep(remaining);
                Ok(true)
            }
            None => {
                if now.duration_since(self.next_wake) > self.period {
                    self.next_wake = now;
                }
                Ok(false)
            }
        }
    }
}
