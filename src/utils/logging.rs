use log::{log_enabled, trace, warn, Level};
use std::time::{Duration, Instant};

/// Phases of a world step, used to label trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStage {
    Step,
    FindNewContacts,
    Collide,
    Solve,
    SolveToi,
}

impl StepStage {
    pub fn label(self) -> &'static str {
        match self {
            StepStage::Step => "step",
            StepStage::FindNewContacts => "find_new_contacts",
            StepStage::Collide => "collide",
            StepStage::Solve => "solve",
            StepStage::SolveToi => "solve_toi",
        }
    }
}

/// Traces entry and exit of a step stage when `trace` logging is on.
pub struct StageTimer {
    stage: StepStage,
    start: Instant,
}

impl StageTimer {
    pub fn new(stage: StepStage) -> Self {
        if log_enabled!(Level::Trace) {
            trace!("enter {}", stage.label());
        }
        Self {
            stage,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            trace!(
                "leave {} after {} us",
                self.stage.label(),
                self.start.elapsed().as_micros()
            );
        }
    }
}

/// Warns when simulating a step took longer than the simulated time itself,
/// i.e. the world cannot keep up with real time.
pub fn warn_if_slower_than_real_time(elapsed: Duration, dt: f32) -> bool {
    if dt <= 0.0 {
        return false;
    }
    let elapsed_ms = elapsed.as_secs_f32() * 1000.0;
    let budget_ms = dt * 1000.0;
    if elapsed_ms > budget_ms {
        warn!("step took {elapsed_ms:.2} ms to simulate {budget_ms:.2} ms");
        return true;
    }
    false
}
