//! [`Devices`] – ordered opening of the motor module's device set.
//!
//! The module needs five devices: the gaze controller, one Cartesian
//! controller per arm and one joint-level control board per arm. They are
//! opened in that order through a [`DeviceBackend`]. If any open fails, every
//! device opened so far is closed again in reverse order and the failure is
//! returned, so a half-initialised module never survives startup.

use std::sync::Arc;

use karma_types::{Arm, KarmaError};
use tracing::{info, warn};

use crate::cartesian::CartesianController;
use crate::gaze::GazeController;
use crate::hand::HandController;

/// What a device provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Gaze,
    CartesianArm(Arm),
    Hand(Arm),
}

/// Remote/local endpoint pair for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub kind: DeviceKind,
    /// Server endpoint, e.g. `/icub/cartesianController/left_arm`.
    pub remote: String,
    /// Client endpoint opened by this module, e.g. `/karmaMotor/cart_ctrl/left_arm`.
    pub local: String,
}

impl DeviceSpec {
    /// The full device list for module `name` on `robot`, in opening order.
    pub fn all(name: &str, robot: &str) -> Vec<DeviceSpec> {
        let mut specs = vec![DeviceSpec {
            kind: DeviceKind::Gaze,
            remote: "/iKinGazeCtrl".to_string(),
            local: format!("/{name}/gaze_ctrl"),
        }];
        for arm in [Arm::Left, Arm::Right] {
            specs.push(DeviceSpec {
                kind: DeviceKind::CartesianArm(arm),
                remote: format!("/{robot}/cartesianController/{arm}_arm"),
                local: format!("/{name}/cart_ctrl/{arm}_arm"),
            });
        }
        for arm in [Arm::Left, Arm::Right] {
            specs.push(DeviceSpec {
                kind: DeviceKind::Hand(arm),
                remote: format!("/{robot}/{arm}_arm"),
                local: format!("/{name}/hand_ctrl/{arm}_arm"),
            });
        }
        specs
    }
}

/// An opened device.
#[derive(Clone)]
pub enum DeviceHandle {
    Gaze(Arc<dyn GazeController>),
    CartesianArm(Arc<dyn CartesianController>),
    Hand(Arc<dyn HandController>),
}

/// Driver backend able to open and close devices.
pub trait DeviceBackend {
    /// Open the device described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`KarmaError::DeviceOpen`] when the remote endpoint is not
    /// reachable.
    fn open(&self, spec: &DeviceSpec) -> Result<DeviceHandle, KarmaError>;

    /// Release a device previously returned by [`open`][Self::open].
    fn close(&self, spec: &DeviceSpec);
}

/// The opened device set.
#[derive(Clone)]
pub struct Devices {
    pub gaze: Arc<dyn GazeController>,
    pub left_arm: Arc<dyn CartesianController>,
    pub right_arm: Arc<dyn CartesianController>,
    pub left_hand: Arc<dyn HandController>,
    pub right_hand: Arc<dyn HandController>,
    specs: Vec<DeviceSpec>,
}

impl Devices {
    /// Open every device for module `name` on `robot`.
    ///
    /// # Errors
    ///
    /// Returns the first open failure after closing, in reverse order, every
    /// device that had already been opened.
    pub fn open(backend: &dyn DeviceBackend, name: &str, robot: &str) -> Result<Self, KarmaError> {
        let specs = DeviceSpec::all(name, robot);
        let mut opened: Vec<(DeviceSpec, DeviceHandle)> = Vec::with_capacity(specs.len());

        for spec in specs {
            match backend.open(&spec) {
                Ok(handle) => {
                    info!(remote = %spec.remote, local = %spec.local, "device opened");
                    opened.push((spec, handle));
                }
                Err(e) => {
                    warn!(remote = %spec.remote, error = %e, "device open failed; unwinding");
                    for (done, _) in opened.iter().rev() {
                        backend.close(done);
                    }
                    return Err(e);
                }
            }
        }

        match Self::assemble(opened) {
            Ok(devices) => Ok(devices),
            Err((specs, e)) => {
                for spec in specs.iter().rev() {
                    backend.close(spec);
                }
                Err(e)
            }
        }
    }

    /// Assemble a device set from already-running controllers.
    ///
    /// Nothing is closed through a backend for a set built this way.
    pub fn from_controllers(
        gaze: Arc<dyn GazeController>,
        left_arm: Arc<dyn CartesianController>,
        right_arm: Arc<dyn CartesianController>,
        left_hand: Arc<dyn HandController>,
        right_hand: Arc<dyn HandController>,
    ) -> Self {
        Self {
            gaze,
            left_arm,
            right_arm,
            left_hand,
            right_hand,
            specs: Vec::new(),
        }
    }

    /// The Cartesian controller of `arm`.
    pub fn arm(&self, arm: Arm) -> &Arc<dyn CartesianController> {
        match arm {
            Arm::Left => &self.left_arm,
            Arm::Right => &self.right_arm,
        }
    }

    /// The joint-level control board of `arm`.
    pub fn hand(&self, arm: Arm) -> &Arc<dyn HandController> {
        match arm {
            Arm::Left => &self.left_hand,
            Arm::Right => &self.right_hand,
        }
    }

    /// Close every device, last opened first.
    pub fn close(self, backend: &dyn DeviceBackend) {
        for spec in self.specs.iter().rev() {
            backend.close(spec);
        }
    }

    #[allow(clippy::type_complexity)]
    fn assemble(
        opened: Vec<(DeviceSpec, DeviceHandle)>,
    ) -> Result<Self, (Vec<DeviceSpec>, KarmaError)> {
        let mut gaze = None;
        let (mut left_arm, mut right_arm) = (None, None);
        let (mut left_hand, mut right_hand) = (None, None);
        let mut specs = Vec::with_capacity(opened.len());
        let mut mismatch = None;

        for (spec, handle) in opened {
            match (spec.kind, handle) {
                (DeviceKind::Gaze, DeviceHandle::Gaze(g)) => gaze = Some(g),
                (DeviceKind::CartesianArm(Arm::Left), DeviceHandle::CartesianArm(c)) => {
                    left_arm = Some(c)
                }
                (DeviceKind::CartesianArm(Arm::Right), DeviceHandle::CartesianArm(c)) => {
                    right_arm = Some(c)
                }
                (DeviceKind::Hand(Arm::Left), DeviceHandle::Hand(h)) => left_hand = Some(h),
                (DeviceKind::Hand(Arm::Right), DeviceHandle::Hand(h)) => right_hand = Some(h),
                _ => {
                    mismatch.get_or_insert_with(|| spec.remote.clone());
                }
            }
            specs.push(spec);
        }

        match (gaze, left_arm, right_arm, left_hand, right_hand, mismatch) {
            (Some(gaze), Some(left_arm), Some(right_arm), Some(left_hand), Some(right_hand), None) => {
                Ok(Self {
                    gaze,
                    left_arm,
                    right_arm,
                    left_hand,
                    right_hand,
                    specs,
                })
            }
            (.., mismatch) => {
                let device = mismatch.unwrap_or_else(|| "device set".to_string());
                Err((
                    specs,
                    KarmaError::DeviceOpen {
                        device,
                        details: "backend returned an unexpected device type".to_string(),
                    },
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBackend;

    #[test]
    fn specs_follow_opening_order_and_naming() {
        let specs = DeviceSpec::all("karmaMotor", "icub");
        let remotes: Vec<&str> = specs.iter().map(|s| s.remote.as_str()).collect();
        assert_eq!(
            remotes,
            vec![
                "/iKinGazeCtrl",
                "/icub/cartesianController/left_arm",
                "/icub/cartesianController/right_arm",
                "/icub/left_arm",
                "/icub/right_arm",
            ]
        );
        assert_eq!(specs[0].local, "/karmaMotor/gaze_ctrl");
        assert_eq!(specs[4].local, "/karmaMotor/hand_ctrl/right_arm");
    }

    #[test]
    fn open_all_devices_and_close_in_reverse() {
        let backend = SimBackend::new();
        let devices = Devices::open(&backend, "karmaMotor", "icub").expect("sim open");
        assert_eq!(devices.arm(Arm::Left).id(), "left_arm");
        assert_eq!(devices.hand(Arm::Right).id(), "right_hand");

        devices.close(&backend);
        let closed = backend.closed();
        assert_eq!(closed.first().map(String::as_str), Some("/icub/right_arm"));
        assert_eq!(closed.last().map(String::as_str), Some("/iKinGazeCtrl"));
    }

    #[test]
    fn failed_open_unwinds_already_opened_devices() {
        let backend = SimBackend::new().failing_on("/icub/left_arm");
        let result = Devices::open(&backend, "karmaMotor", "icub");
        assert!(matches!(result, Err(KarmaError::DeviceOpen { .. })));

        assert_eq!(
            backend.closed(),
            vec![
                "/icub/cartesianController/right_arm".to_string(),
                "/icub/cartesianController/left_arm".to_string(),
                "/iKinGazeCtrl".to_string(),
            ]
        );
    }

    #[test]
    fn first_device_failure_closes_nothing() {
        let backend = SimBackend::new().failing_on("/iKinGazeCtrl");
        assert!(Devices::open(&backend, "karmaMotor", "icub").is_err());
        assert!(backend.closed().is_empty());
    }
}
