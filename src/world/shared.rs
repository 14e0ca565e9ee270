use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::world::World;

/// A world shared between a simulation thread and any number of readers.
///
/// Stepping takes the write lock; readers take the read lock between steps.
/// Each completed step bumps a frame counter that other threads can block on.
#[derive(Debug)]
pub struct SharedWorld {
    world: RwLock<World>,
    frame: Mutex<u64>,
    frame_done: Condvar,
}

impl SharedWorld {
    pub fn new(world: World) -> Self {
        Self {
            world: RwLock::new(world),
            frame: Mutex::new(0),
            frame_done: Condvar::new(),
        }
    }

    /// Steps the world and returns the number of the finished frame.
    pub fn step(&self, dt: f32, velocity_iterations: u32, position_iterations: u32) -> u64 {
        self.world
            .write()
            .step(dt, velocity_iterations, position_iterations);

        let mut frame = self.frame.lock();
        *frame += 1;
        let finished = *frame;
        self.frame_done.notify_all();
        finished
    }

    pub fn read(&self) -> RwLockReadGuard<'_, World> {
        self.world.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, World> {
        self.world.write()
    }

    /// Number of steps completed so far.
    pub fn frame(&self) -> u64 {
        *self.frame.lock()
    }

    /// Blocks until a frame later than `after` has finished and returns it.
    pub fn wait_for_frame(&self, after: u64) -> u64 {
        let mut frame = self.frame.lock();
        while *frame <= after {
            self.frame_done.wait(&mut frame);
        }
        *frame
    }

    /// Like [`wait_for_frame`](Self::wait_for_frame) but gives up after
    /// `timeout`, returning `None`.
    pub fn wait_for_frame_timeout(&self, after: u64, timeout: Duration) -> Option<u64> {
        let mut frame = self.frame.lock();
        while *frame <= after {
            if self.frame_done.wait_for(&mut frame, timeout).timed_out() {
                return (*frame > after).then_some(*frame);
            }
        }
        Some(*frame)
    }

    pub fn into_inner(self) -> World {
        self.world.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use std::{sync::Arc, thread};

    #[test]
    fn readers_observe_finished_frames() {
        let shared = Arc::new(SharedWorld::new(World::new(Vec2::new(0.0, -10.0))));
        let waiter = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.wait_for_frame(2))
        };
        for _ in 0..3 {
            shared.step(1.0 / 60.0, 8, 3);
        }
        assert_eq!(waiter.join().unwrap(), 3);
        assert_eq!(shared.frame(), 3);
        assert_eq!(shared.read().body_count(), 0);
    }

    #[test]
    fn waiting_times_out_without_steps() {
        let shared = SharedWorld::new(World::default());
        assert_eq!(shared.wait_for_frame_timeout(0, Duration::from_millis(10)), None);
    }
}
