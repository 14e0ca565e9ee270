use std::time::{Duration, Instant};

/// Timing and population counters collected during one [`World::step`](crate::world::World::step).
#[derive(Debug, Default, Clone, Copy)]
pub struct StepProfile {
    pub collide_time: Duration,
    pub solve_time: Duration,
    pub solve_toi_time: Duration,
    pub broad_phase_time: Duration,
    pub total_step_time: Duration,

    pub body_count: usize,
    pub contact_count: usize,
    pub joint_count: usize,
    pub island_count: usize,
    pub toi_event_count: usize,
}

impl StepProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Logs the profile at `debug` level.
    pub fn report(&self) {
        let total_us = self.total_step_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        log::debug!(
            "bodies: {}, contacts: {}, joints: {}, islands: {}, toi events: {}",
            self.body_count,
            self.contact_count,
            self.joint_count,
            self.island_count,
            self.toi_event_count
        );
        log::debug!(
            "step {:.2} ms | collide {:.1}% | solve {:.1}% | toi {:.1}% | broad-phase {:.1}%",
            self.total_step_time.as_secs_f32() * 1000.0,
            (self.collide_time.as_micros() as f32 / total_us) * 100.0,
            (self.solve_time.as_micros() as f32 / total_us) * 100.0,
            (self.solve_toi_time.as_micros() as f32 / total_us) * 100.0,
            (self.broad_phase_time.as_micros() as f32 / total_us) * 100.0,
        );
    }
}

/// Accumulates the elapsed time of a scope into a profile slot.
pub struct ProfileTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> ProfileTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for ProfileTimer<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_accumulates_into_slot() {
        let mut slot = Duration::ZERO;
        {
            let _timer = ProfileTimer::new(&mut slot);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(slot >= Duration::from_millis(1));

        let mut profile = StepProfile {
            solve_time: slot,
            ..StepProfile::default()
        };
        profile.reset();
        assert_eq!(profile.solve_time, Duration::ZERO);
    }
}
