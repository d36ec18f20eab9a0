//! Process-wide session flags and the stop switch.
//!
//! Two pieces of state outlive a single command: the interrupt flag raised
//! by the stop port and polled by every motion loop, and the hand currently
//! being shaken for tool discovery. Both are cheap clonable handles over
//! shared atomics/mutexes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use karma_hal::Devices;
use karma_middleware::StopSignal;
use karma_types::Arm;
use tracing::{info, warn};

// ────────────────────────────────────────────────────────────────────────────
// InterruptFlag
// ────────────────────────────────────────────────────────────────────────────

/// Set by a stop request, cleared once the current command has replied.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ActiveHand
// ────────────────────────────────────────────────────────────────────────────

/// The hand joint being oscillated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShakingHand {
    pub arm: Arm,
    pub joint: usize,
}

/// Which hand, if any, the oscillator should drive.
///
/// Driving and releasing both hold the same lock: once
/// [`release_with`][Self::release_with] has returned, no oscillator command
/// can follow the final stop.
#[derive(Debug, Clone, Default)]
pub struct ActiveHand(Arc<Mutex<Option<ShakingHand>>>);

impl ActiveHand {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ShakingHand>> {
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn get(&self) -> Option<ShakingHand> {
        *self.lock()
    }

    pub fn set(&self, hand: ShakingHand) {
        *self.lock() = Some(hand);
    }

    /// Run `step` on the active hand, if any, holding it for the duration.
    pub fn drive<R>(&self, step: impl FnOnce(ShakingHand) -> R) -> Option<R> {
        let active = self.lock();
        active.map(step)
    }

    /// Wait for any step in progress, run `halt`, then mark no hand active.
    pub fn release_with<R>(&self, halt: impl FnOnce() -> R) -> R {
        let mut active = self.lock();
        let halted = halt();
        *active = None;
        halted
    }
}

// ────────────────────────────────────────────────────────────────────────────
// StopSwitch
// ────────────────────────────────────────────────────────────────────────────

/// Halts everything the module may be moving.
///
/// Raising it sets the interrupt flag, stops the gaze and both arm
/// controllers and, while a hand is being shaken, stops the shaking joint on
/// both hands. Collaborator failures are logged and do not prevent the
/// remaining stops.
#[derive(Clone)]
pub struct StopSwitch {
    devices: Devices,
    interrupt: InterruptFlag,
    active_hand: ActiveHand,
}

impl StopSwitch {
    pub fn new(devices: Devices, interrupt: InterruptFlag, active_hand: ActiveHand) -> Self {
        Self {
            devices,
            interrupt,
            active_hand,
        }
    }
}

impl StopSignal for StopSwitch {
    fn raise(&self) {
        self.interrupt.raise();
        info!("interrupting: stopping gaze and arms");

        if let Err(e) = self.devices.gaze.stop() {
            warn!(error = %e, "gaze stop failed");
        }
        for arm in [Arm::Left, Arm::Right] {
            if let Err(e) = self.devices.arm(arm).stop() {
                warn!(%arm, error = %e, "arm stop failed");
            }
        }

        if let Some(shaking) = self.active_hand.get() {
            for arm in [Arm::Left, Arm::Right] {
                if let Err(e) = self.devices.hand(arm).stop_joint(shaking.joint) {
                    warn!(%arm, joint = shaking.joint, error = %e, "hand stop failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sim_devices;
    use karma_hal::sim::GazeCall;

    #[test]
    fn interrupt_flag_is_shared_between_clones() {
        let flag = InterruptFlag::new();
        let other = flag.clone();
        other.raise();
        assert!(flag.is_raised());
        flag.clear();
        assert!(!other.is_raised());
    }

    #[test]
    fn release_waits_for_the_step_in_progress() {
        let hand = ActiveHand::new();
        hand.set(ShakingHand {
            arm: Arm::Left,
            joint: 4,
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();

        let stepping = {
            let hand = hand.clone();
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                hand.drive(|_| {
                    entered_tx.send(()).unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(100));
                    log.lock().unwrap().push("move");
                })
            })
        };
        entered_rx.recv().unwrap();
        hand.release_with(|| log.lock().unwrap().push("stop"));
        stepping.join().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["move", "stop"]);
        assert_eq!(hand.get(), None);
        assert_eq!(hand.drive(|_| ()), None);
    }

    #[test]
    fn stop_switch_halts_gaze_and_both_arms() {
        let sim = sim_devices();
        let interrupt = InterruptFlag::new();
        let switch = StopSwitch::new(sim.devices(), interrupt.clone(), ActiveHand::new());

        switch.raise();

        assert!(interrupt.is_raised());
        assert_eq!(sim.gaze.calls(), vec![GazeCall::Stop]);
        assert_eq!(sim.left_arm.stops(), 1);
        assert_eq!(sim.right_arm.stops(), 1);
        assert!(sim.left_hand.stopped_joints().is_empty());
        assert!(sim.right_hand.stopped_joints().is_empty());
    }

    #[test]
    fn stop_switch_stops_the_shaking_joint_on_both_hands() {
        let sim = sim_devices();
        let hand = ActiveHand::new();
        hand.set(ShakingHand {
            arm: Arm::Right,
            joint: 6,
        });
        let switch = StopSwitch::new(sim.devices(), InterruptFlag::new(), hand.clone());

        switch.raise();

        assert_eq!(sim.left_hand.stopped_joints(), vec![6]);
        assert_eq!(sim.right_hand.stopped_joints(), vec![6]);
        assert_eq!(hand.get().map(|h| h.arm), Some(Arm::Right));
    }
}
