//! Robot power vector.
//!
//! Float power demands in [-1, +1] for every actuator, plus the attached
//! tool's own demands. The attached tool is a tagged variant: the arm
//! coupler can carry nothing, the rock grinder, or the five-joint
//! manipulator arm. Values are only range-checked at the wire boundary
//! (see [`crate::bridge::motor_scale`]).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exch_if::state::PowerPod;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What is attached to the tool coupler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AttachedTool {
    /// Nothing attached.
    None,

    /// Rock grinder mining head.
    Grinder {
        /// Mining head rate, 0-1.
        tool: f64,
    },

    /// Five-joint manipulator arm, torque per joint.
    Arm { joint: [f64; 5] },
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Per-actuator power demands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Power {
    /// Drive tracks.
    pub left: f64,
    pub right: f64,

    /// Front scoop actuators.
    pub fork: f64,
    pub dump: f64,

    /// Arm actuators.
    pub boom: f64,
    pub stick: f64,
    pub tilt: f64,

    /// If true, the load-cell slots read their left channel.
    pub read_l: bool,

    pub attached: AttachedTool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Power {
    fn default() -> Self {
        Self {
            left: 0.0,
            right: 0.0,
            fork: 0.0,
            dump: 0.0,
            boom: 0.0,
            stick: 0.0,
            tilt: 0.0,
            read_l: false,
            attached: AttachedTool::None,
        }
    }
}

impl Power {
    /// Zero every power demand, keeping the attach mode.
    pub fn stop(&mut self) {
        let attached = match self.attached {
            AttachedTool::None => AttachedTool::None,
            AttachedTool::Grinder { .. } => AttachedTool::Grinder { tool: 0.0 },
            AttachedTool::Arm { .. } => AttachedTool::Arm { joint: [0.0; 5] },
        };

        *self = Self {
            attached,
            ..Self::default()
        };
    }

    pub fn attached_grinder(&self) -> bool {
        matches!(self.attached, AttachedTool::Grinder { .. })
    }

    pub fn attached_arm(&self) -> bool {
        matches!(self.attached, AttachedTool::Arm { .. })
    }

    /// The grinder rate, or 0 if no grinder is attached.
    pub fn tool_rate(&self) -> f64 {
        match self.attached {
            AttachedTool::Grinder { tool } => tool,
            _ => 0.0,
        }
    }

    /// Set the grinder rate. No effect unless the grinder is attached.
    pub fn set_tool_rate(&mut self, rate: f64) {
        if let AttachedTool::Grinder { ref mut tool } = self.attached {
            *tool = rate;
        }
    }

    /// The arm joint torques, or zeros if no arm is attached.
    pub fn arm_torques(&self) -> [f64; 5] {
        match self.attached {
            AttachedTool::Arm { joint } => joint,
            _ => [0.0; 5],
        }
    }

    /// Flatten into the fixed wire struct.
    pub fn to_pod(&self) -> PowerPod {
        let (attach_mode, tool, arm_joint) = match self.attached {
            AttachedTool::None => (0, 0.0, [0.0; 5]),
            AttachedTool::Grinder { tool } => (1, tool, [0.0; 5]),
            AttachedTool::Arm { joint } => (2, 0.0, joint),
        };

        PowerPod {
            left: self.left as f32,
            right: self.right as f32,
            fork: self.fork as f32,
            dump: self.dump as f32,
            boom: self.boom as f32,
            stick: self.stick as f32,
            tilt: self.tilt as f32,
            attach_mode,
            read_l: self.read_l as u8,
            tool: tool as f32,
            arm_joint: {
                let mut a = [0.0f32; 5];
                for (dst, src) in a.iter_mut().zip(arm_joint.iter()) {
                    *dst = *src as f32;
                }
                a
            },
        }
    }

    /// Rebuild from the fixed wire struct.
    pub fn from_pod(pod: &PowerPod) -> Self {
        let attached = match pod.attach_mode {
            1 => AttachedTool::Grinder {
                tool: pod.tool as f64,
            },
            2 => {
                let mut joint = [0.0f64; 5];
                for (dst, src) in joint.iter_mut().zip(pod.arm_joint.iter()) {
                    *dst = *src as f64;
                }
                AttachedTool::Arm { joint }
            }
            _ => AttachedTool::None,
        };

        Self {
            left: pod.left as f64,
            right: pod.right as f64,
            fork: pod.fork as f64,
            dump: pod.dump as f64,
            boom: pod.boom as f64,
            stick: pod.stick as f64,
            tilt: pod.tilt as f64,
            read_l: pod.read_l != 0,
            attached,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stop_keeps_attach_mode() {
        let mut power = Power {
            left: 0.5,
            attached: AttachedTool::Grinder { tool: 0.7 },
            ..Default::default()
        };

        power.stop();

        assert_eq!(power.left, 0.0);
        assert_eq!(power.tool_rate(), 0.0);
        assert!(power.attached_grinder());
    }

    #[test]
    fn test_pod_roundtrip() {
        let power = Power {
            left: 0.25,
            right: -0.25,
            boom: 0.1,
            read_l: true,
            attached: AttachedTool::Arm {
                joint: [0.1, 0.2, 0.3, 0.4, 0.5],
            },
            ..Default::default()
        };

        let back = Power::from_pod(&power.to_pod());
        assert!((back.left - 0.25).abs() < 1e-6);
        assert!(back.read_l);
        assert!(back.attached_arm());
        assert!((back.arm_torques()[4] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_tool_rate_requires_grinder() {
        let mut power = Power::default();
        power.set_tool_rate(0.5);
        assert_eq!(power.tool_rate(), 0.0);

        power.attached = AttachedTool::Grinder { tool: 0.0 };
        power.set_tool_rate(0.5);
        assert_eq!(power.tool_rate(), 0.5);
    }
}
