//! Shared fixtures for the runtime tests.

use std::sync::Arc;

use karma_hal::Devices;
use karma_hal::sim::{SimArm, SimGaze, SimHand};

/// Simulated controllers kept typed so tests can inspect them.
pub struct SimRig {
    pub gaze: Arc<SimGaze>,
    pub left_arm: Arc<SimArm>,
    pub right_arm: Arc<SimArm>,
    pub left_hand: Arc<SimHand>,
    pub right_hand: Arc<SimHand>,
}

impl SimRig {
    pub fn with_arms(left_arm: SimArm, right_arm: SimArm) -> Self {
        Self {
            gaze: Arc::new(SimGaze::new()),
            left_arm: Arc::new(left_arm),
            right_arm: Arc::new(right_arm),
            left_hand: Arc::new(SimHand::new("left_hand")),
            right_hand: Arc::new(SimHand::new("right_hand")),
        }
    }

    pub fn devices(&self) -> Devices {
        Devices::from_controllers(
            self.gaze.clone(),
            self.left_arm.clone(),
            self.right_arm.clone(),
            self.left_hand.clone(),
            self.right_hand.clone(),
        )
    }
}

pub fn sim_devices() -> SimRig {
    SimRig::with_arms(SimArm::new("left_arm"), SimArm::new("right_arm"))
}
