//! Hand oscillator.
//!
//! While a hand is marked active, a background thread swings its shaking
//! joint back and forth so the held tool keeps moving in the camera image.
//! Each tick reads the joint and commands a fixed speed towards the current
//! turning point, flipping the turning point once the joint passes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use karma_hal::Devices;
use tracing::{debug, warn};

use crate::session::{ActiveHand, InterruptFlag, ShakingHand};

/// Turning point of the oscillation, degrees.
pub const SHAKE_AMPLITUDE: f64 = 6.0;

/// Joint speed while shaking, degrees per second.
pub const SHAKE_SPEED: f64 = 120.0;

/// Tick period.
pub const SHAKE_PERIOD: Duration = Duration::from_millis(20);

pub struct Oscillator {
    devices: Devices,
    active: ActiveHand,
    interrupt: InterruptFlag,
    turn: f64,
}

impl Oscillator {
    pub fn new(devices: Devices, active: ActiveHand, interrupt: InterruptFlag) -> Self {
        Self {
            devices,
            active,
            interrupt,
            turn: SHAKE_AMPLITUDE,
        }
    }

    /// One oscillation step. Returns the commanded velocity, or `None` when
    /// nothing was commanded.
    pub fn tick(&mut self) -> Option<f64> {
        if self.interrupt.is_raised() {
            return None;
        }
        let active = self.active.clone();
        active.drive(|shaking| self.swing(shaking)).flatten()
    }

    fn swing(&mut self, shaking: ShakingHand) -> Option<f64> {
        let hand = self.devices.hand(shaking.arm);

        let pos = match hand.joint_position(shaking.joint) {
            Ok(pos) => pos,
            Err(e) => {
                warn!(hand = hand.id(), error = %e, "encoder read failed");
                return None;
            }
        };

        let mut e = self.turn - pos;
        if (self.turn > 0.0 && e < 0.0) || (self.turn < 0.0 && e > 0.0) {
            self.turn = -self.turn;
            e = self.turn - pos;
        }

        let velocity = SHAKE_SPEED * e.signum();
        if let Err(e) = hand.velocity_move(shaking.joint, velocity) {
            warn!(hand = hand.id(), error = %e, "velocity command failed");
            return None;
        }
        Some(velocity)
    }

    /// Run [`tick`][Self::tick] every `period` on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot be spawned.
    pub fn spawn(mut self, period: Duration) -> std::io::Result<OscillatorHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("karma-oscillator".into())
            .spawn(move || {
                debug!("oscillator started");
                while flag.load(Ordering::SeqCst) {
                    self.tick();
                    std::thread::sleep(period);
                }
                debug!("oscillator stopped");
            })?;
        Ok(OscillatorHandle {
            running,
            thread: Some(thread),
        })
    }
}

/// Stops and joins the oscillator thread when dropped.
pub struct OscillatorHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for OscillatorHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("oscillator thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sim_devices;
    use karma_types::Arm;

    #[test]
    fn idle_without_an_active_hand() {
        let sim = sim_devices();
        let mut osc = Oscillator::new(sim.devices(), ActiveHand::new(), InterruptFlag::new());
        assert_eq!(osc.tick(), None);
        assert!(sim.left_hand.velocities().is_empty());
    }

    #[test]
    fn swings_between_turning_points() {
        let sim = sim_devices();
        let active = ActiveHand::new();
        active.set(ShakingHand {
            arm: Arm::Left,
            joint: 4,
        });
        let mut osc = Oscillator::new(sim.devices(), active, InterruptFlag::new());

        sim.left_hand.set_joint_position(4, 0.0);
        assert_eq!(osc.tick(), Some(120.0));
        sim.left_hand.set_joint_position(4, 7.0);
        assert_eq!(osc.tick(), Some(-120.0));
        sim.left_hand.set_joint_position(4, 0.0);
        assert_eq!(osc.tick(), Some(-120.0));
        sim.left_hand.set_joint_position(4, -6.5);
        assert_eq!(osc.tick(), Some(120.0));

        assert!(sim.right_hand.velocities().is_empty());
        assert!(sim.left_hand.velocities().iter().all(|&(joint, _)| joint == 4));
    }

    #[test]
    fn interrupt_suspends_shaking() {
        let sim = sim_devices();
        let active = ActiveHand::new();
        active.set(ShakingHand {
            arm: Arm::Right,
            joint: 6,
        });
        let interrupt = InterruptFlag::new();
        interrupt.raise();
        let mut osc = Oscillator::new(sim.devices(), active, interrupt);
        assert_eq!(osc.tick(), None);
    }

    #[test]
    fn background_thread_drives_the_active_hand() {
        let sim = sim_devices();
        let active = ActiveHand::new();
        active.set(ShakingHand {
            arm: Arm::Right,
            joint: 6,
        });
        let handle = Oscillator::new(sim.devices(), active, InterruptFlag::new())
            .spawn(Duration::from_millis(1))
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while sim.right_hand.velocities().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        drop(handle);
        assert!(!sim.right_hand.velocities().is_empty());
    }
}
