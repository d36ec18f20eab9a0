//! [`MotorModule`] – command handling for the motor module.
//!
//! Owns the session state that outlives a command (the attached tool, the
//! interrupt flag, the shaking hand) and turns each parsed [`Command`] into
//! planning, execution or discovery against the opened [`Devices`]. The
//! interrupt flag is cleared once every command has been answered, so a stop
//! only affects the command it interrupted.

use std::sync::{Arc, Mutex, MutexGuard};

use karma_geometry::Vec3;
use karma_hal::{Clock, Devices, PixelSource, ToolSolver};
use karma_middleware::{Command, CommandHandler, Reply, Target, ToolKind, ToolOp};
use karma_planner::{
    ActionProfile, ActionTask, DrawPlan, PoseStyle, PushPlan, ToolFrame, plan_hand_push,
};
use karma_types::{Arm, Eye, HandPose, KarmaError};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::discovery::Discovery;
use crate::executor::{ActionContext, ElbowTask, Executor};
use crate::oscillator::Oscillator;
use crate::session::{ActiveHand, InterruptFlag, StopSwitch};

/// Tunables of the motor module.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Duration of the pushing leg of hand-pose pushes and of the drawing
    /// leg of hand-pose draws, seconds.
    pub mov_time: f64,
    /// Elbow-height task for neutral-frame actions, if any.
    pub elbow: Option<ElbowTask>,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            mov_time: 1.0,
            elbow: None,
        }
    }
}

/// Vision feed and solver link used by tool discovery.
pub struct DiscoveryLink {
    pub solver: Box<dyn ToolSolver>,
    pub pixels: Box<dyn PixelSource>,
}

pub struct MotorModule {
    devices: Devices,
    clock: Arc<dyn Clock>,
    config: MotorConfig,
    interrupt: InterruptFlag,
    active_hand: ActiveHand,
    tool: Mutex<ToolFrame>,
    link: Mutex<DiscoveryLink>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MotorModule {
    pub fn new(devices: Devices, clock: Arc<dyn Clock>, config: MotorConfig, link: DiscoveryLink) -> Self {
        Self {
            devices,
            clock,
            config,
            interrupt: InterruptFlag::new(),
            active_hand: ActiveHand::new(),
            tool: Mutex::new(ToolFrame::default()),
            link: Mutex::new(link),
        }
    }

    pub fn interrupt(&self) -> &InterruptFlag {
        &self.interrupt
    }

    /// Stop switch wired to this module's session.
    pub fn stop_switch(&self) -> StopSwitch {
        StopSwitch::new(self.devices.clone(), self.interrupt.clone(), self.active_hand.clone())
    }

    /// Oscillator shaking whichever hand discovery marks active.
    pub fn oscillator(&self) -> Oscillator {
        Oscillator::new(self.devices.clone(), self.active_hand.clone(), self.interrupt.clone())
    }

    pub fn tool(&self) -> ToolFrame {
        *lock(&self.tool)
    }

    fn task(&self, target: &Target, style: PoseStyle) -> ActionTask {
        ActionTask::new(target.centroid, target.theta, target.radius)
            .with_style(style)
            .with_arm(self.tool().arm())
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(self.clock.as_ref(), &self.interrupt)
    }

    // ── actions ────────────────────────────────────────────────────────────

    /// Neutral-frame push.
    pub fn push(&self, target: &Target) -> Result<(), KarmaError> {
        let task = self.task(target, PoseStyle::Neutral);
        let plan = PushPlan::new(&task, &self.tool());
        let ctrl = self.devices.arm(plan.arm()).as_ref();

        let context = ActionContext::for_action(ctrl, &ActionProfile::push(task.style), self.config.elbow)?;
        let selection = plan.select(ctrl)?;
        let report = self.executor().run(&context, &plan.waypoints(&selection));
        info!(arm = %plan.arm(), ?report, "push done");
        Ok(())
    }

    /// Push with a fixed hand pose.
    pub fn hand_push(&self, pose: HandPose, target: &Target) -> Result<(), KarmaError> {
        let task = self.task(target, PoseStyle::Hand(pose));
        let planned = plan_hand_push(&task, &self.tool(), self.config.mov_time)?;
        let ctrl = self.devices.arm(planned.arm).as_ref();

        let context = ActionContext::for_action(ctrl, &planned.profile, self.config.elbow)?;
        let report = self.executor().run(&context, &planned.waypoints);
        info!(arm = %planned.arm, ?pose, ?report, "hand push done");
        Ok(())
    }

    /// Draw, or only score the draw when `simulate` is set.
    ///
    /// Returns the quality (lower is better) of a simulated draw.
    pub fn draw(
        &self,
        style: PoseStyle,
        target: &Target,
        dist: f64,
        simulate: bool,
    ) -> Result<Option<f64>, KarmaError> {
        let task = self.task(target, style);
        let plan = DrawPlan::new(&task, dist, &self.tool());
        let ctrl = self.devices.arm(plan.arm()).as_ref();

        let context = ActionContext::for_action(ctrl, &plan.profile(), self.config.elbow)?;
        if simulate {
            return plan.simulate(ctrl).map(Some);
        }
        let report = self.executor().run(&context, &plan.waypoints(self.config.mov_time));
        info!(arm = %plan.arm(), ?style, ?report, "draw done");
        Ok(None)
    }

    // ── tool ───────────────────────────────────────────────────────────────

    fn tool_command(&self, kind: ToolKind, op: ToolOp) -> Reply {
        let mut tool = lock(&self.tool);
        match op {
            ToolOp::Attach { arm, tip } => {
                *tool = match kind {
                    ToolKind::Oriented => ToolFrame::oriented(arm, tip),
                    ToolKind::Translated => ToolFrame::translated(arm, tip),
                };
                info!(%arm, x = tip.x, y = tip.y, z = tip.z, ?kind, "tool attached");
                Reply::Ack
            }
            ToolOp::Get => Reply::AckTool {
                arm: tool.arm(),
                tip: tool.tip(),
            },
            ToolOp::Remove => {
                *tool = ToolFrame::default();
                info!("tool removed");
                Reply::Ack
            }
        }
    }

    // ── discovery ──────────────────────────────────────────────────────────

    /// Discover the tip of the tool held by `arm`. `Ok(None)` when
    /// interrupted.
    pub fn find(&self, arm: Arm, eye: Eye) -> Result<Option<Vec3>, KarmaError> {
        let mut link = lock(&self.link);
        let DiscoveryLink { solver, pixels } = &mut *link;
        Discovery::new(&self.devices, self.clock.as_ref(), &self.interrupt, &self.active_hand).run(
            arm,
            eye,
            solver.as_mut(),
            pixels.as_mut(),
        )
    }

    fn dispatch(&self, command: Command) -> Reply {
        let outcome = match command {
            Command::Push(target) => self.push(&target).map(|()| Reply::Ack),
            Command::HandPush { pose, target } => self.hand_push(pose, &target).map(|()| Reply::Ack),
            Command::Draw {
                simulate,
                target,
                dist,
            } => self
                .draw(PoseStyle::Neutral, &target, dist, simulate)
                .map(quality_reply),
            Command::HandDraw {
                simulate,
                pose,
                target,
                dist,
            } => self
                .draw(PoseStyle::Hand(pose), &target, dist, simulate)
                .map(quality_reply),
            Command::Tool { kind, op } => Ok(self.tool_command(kind, op)),
            Command::Find { arm: None, .. } => Ok(Reply::Nack),
            Command::Find { arm: Some(arm), eye } => self.find(arm, eye).map(|tip| match tip {
                Some(tip) => Reply::AckPoint(tip),
                None => Reply::Ack,
            }),
            Command::Quit => Ok(Reply::Bye),
        };

        outcome.unwrap_or_else(|e| {
            error!(?command, error = %e, "command failed");
            Reply::Nack
        })
    }
}

fn quality_reply(quality: Option<f64>) -> Reply {
    match quality {
        Some(q) => Reply::AckQuality(q),
        None => Reply::Ack,
    }
}

impl CommandHandler for MotorModule {
    fn handle(&self, command: Command) -> Reply {
        let reply = self.dispatch(command);
        self.interrupt.clear();
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SimRig, sim_devices};
    use karma_hal::SimClock;
    use karma_hal::TaskTweak;
    use karma_hal::sim::{ScriptedPixels, SimArm, SimSolver};
    use karma_middleware::StopSignal;
    use karma_types::{ArmPreference, Pixel};

    fn module(sim: &SimRig, config: MotorConfig) -> MotorModule {
        MotorModule::new(
            sim.devices(),
            Arc::new(SimClock::new()),
            config,
            DiscoveryLink {
                solver: Box::new(SimSolver::new(Vec3::new(0.1, 0.0, 0.15))),
                pixels: Box::new(ScriptedPixels::constant(Pixel::new(160.0, 70.0))),
            },
        )
    }

    fn cmd(line: &str) -> Command {
        Command::parse(line).unwrap()
    }

    fn total_goals(sim: &SimRig) -> usize {
        sim.left_arm.goals().len() + sim.right_arm.goals().len()
    }

    #[test]
    fn push_runs_four_legs_on_one_arm() {
        let sim = sim_devices();
        let motor = module(&sim, MotorConfig::default());

        assert_eq!(motor.handle(cmd("push -0.35 0.1 -0.05 30 0.08")), Reply::Ack);

        assert_eq!(total_goals(&sim), 4);
        assert!(sim.left_arm.goals().is_empty() || sim.right_arm.goals().is_empty());
        let moved = if sim.left_arm.goals().is_empty() {
            &sim.right_arm
        } else {
            &sim.left_arm
        };
        assert_eq!(moved.restored_contexts(), moved.stored_contexts());
        assert_eq!(moved.tweaks(), vec![TaskTweak::Straightness(10.0)]);
    }

    #[test]
    fn configured_elbow_biases_neutral_push_only() {
        let sim = sim_devices();
        let config = MotorConfig {
            elbow: Some(ElbowTask::default()),
            ..MotorConfig::default()
        };
        let motor = module(&sim, config);

        motor.handle(cmd("push -0.35 0.1 -0.05 30 0.08"));
        motor.handle(cmd("pusp 1 -0.35 0.1 -0.05 30 0.08"));

        let tweaks: Vec<TaskTweak> = sim
            .left_arm
            .tweaks()
            .into_iter()
            .chain(sim.right_arm.tweaks())
            .collect();
        let elbows = tweaks
            .iter()
            .filter(|t| matches!(t, TaskTweak::ElbowHeight { .. }))
            .count();
        assert_eq!(elbows, 1);
        assert_eq!(total_goals(&sim), 8);
    }

    #[test]
    fn hand_push_uses_mov_time_for_the_pushing_leg() {
        let sim = sim_devices();
        let config = MotorConfig {
            mov_time: 2.5,
            ..MotorConfig::default()
        };
        let motor = module(&sim, config);

        motor.handle(cmd("pusp 0 -0.35 0.1 -0.05 0 0.08"));

        // Centroid on the right half: right arm.
        let durations: Vec<f64> = sim.right_arm.goals().iter().map(|(_, d)| *d).collect();
        assert_eq!(durations, vec![1.0, 1.0, 2.5, 1.0]);
    }

    #[test]
    fn simulated_draw_replies_quality_without_moving() {
        let sim = sim_devices();
        let motor = module(&sim, MotorConfig::default());

        match motor.handle(cmd("vdra -0.35 0.0 -0.05 0 0.1 0.1")) {
            Reply::AckQuality(q) => assert!(q.abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(total_goals(&sim), 0);
    }

    #[test]
    fn draw_runs_three_legs() {
        let sim = sim_devices();
        let motor = module(&sim, MotorConfig::default());
        assert_eq!(motor.handle(cmd("draw -0.35 0.0 -0.05 0 0.1 0.1")), Reply::Ack);
        assert_eq!(total_goals(&sim), 3);
    }

    #[test]
    fn tool_attach_get_remove_roundtrip() {
        let sim = sim_devices();
        let motor = module(&sim, MotorConfig::default());

        assert_eq!(motor.handle(cmd("tool attach left 0.02 0 0.05")), Reply::Ack);
        match motor.handle(cmd("tool get")) {
            Reply::AckTool { arm, tip } => {
                assert_eq!(arm, ArmPreference::Pinned(Arm::Left));
                assert!((tip - Vec3::new(0.02, 0.0, 0.05)).norm() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(motor.handle(cmd("toop remove")), Reply::Ack);
        assert_eq!(
            motor.handle(cmd("toop get")),
            Reply::AckTool {
                arm: ArmPreference::Auto,
                tip: Vec3::zero(),
            }
        );
    }

    #[test]
    fn attached_tool_pins_the_arm() {
        let sim = sim_devices();
        let motor = module(&sim, MotorConfig::default());

        motor.handle(cmd("toop attach left 0.1 0 0"));
        // Centroid on the right half, but the tool is in the left hand.
        motor.handle(cmd("push -0.35 0.2 -0.05 30 0.08"));

        assert_eq!(sim.left_arm.goals().len(), 4);
        assert!(sim.right_arm.goals().is_empty());
    }

    #[test]
    fn find_rejects_unknown_arms() {
        let sim = sim_devices();
        let motor = module(&sim, MotorConfig::default());
        assert_eq!(motor.handle(cmd("find torso left")), Reply::Nack);
        assert_eq!(total_goals(&sim), 0);
    }

    #[test]
    fn find_replies_the_solved_tip() {
        let sim = sim_devices();
        let motor = module(&sim, MotorConfig::default());
        assert_eq!(
            motor.handle(cmd("find right left")),
            Reply::AckPoint(Vec3::new(0.1, 0.0, 0.15))
        );
        assert_eq!(sim.right_arm.goals().len(), 6);
    }

    #[test]
    fn interrupted_command_still_acks_and_clears_the_flag() {
        let sim = sim_devices();
        let motor = module(&sim, MotorConfig::default());

        motor.stop_switch().raise();
        assert_eq!(motor.handle(cmd("push -0.35 0.1 -0.05 30 0.08")), Reply::Ack);

        assert_eq!(total_goals(&sim), 0);
        assert!(!motor.interrupt().is_raised());
        assert_eq!(sim.left_arm.stops() + sim.right_arm.stops(), 2);
    }

    #[test]
    fn quit_says_bye() {
        let sim = SimRig::with_arms(SimArm::new("left_arm"), SimArm::new("right_arm"));
        let motor = module(&sim, MotorConfig::default());
        assert_eq!(motor.handle(Command::Quit), Reply::Bye);
    }
}
