//! Static geometry of every link on the robot.
//!
//! The links form a tree rooted at `pit` (the field coordinate anchor):
//! `pit -> frame -> {fork -> dump, boom -> stick -> tilt -> spin ->
//! coupler -> grinder, depthcam, drivecamflip -> drivecam}`. The table is
//! ordered parents-first so forward kinematics is a single pass.

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Index of every link on the robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Link {
    /// Anchor of the robot coordinate system.
    Pit,

    /// Drive frame, rotating about Z relative to the pit.
    Frame,

    /// Lifts the whole front scoop assembly.
    Fork,

    /// Tips the front scoop out.
    Dump,

    /// First arm link.
    Boom,

    /// Second arm link.
    Stick,

    /// Wrist pitch at the end of the stick.
    Tilt,

    /// Wrist roll (hardware locked at 0 on the current robot).
    Spin,

    /// Tool coupler plate.
    Coupler,

    /// Rock grinder mining head.
    Grinder,

    /// Depth camera on top of the stick.
    DepthCam,

    /// Mounting flip for the rear drive camera.
    DriveCamFlip,

    /// Rear drive camera.
    DriveCam,
}

/// Number of links in the table.
pub const LINK_COUNT: usize = 13;

/// Rotation axis of a link's joint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
    None,
}

/// Whether the link articulates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    Fixed,
    Revolute,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Static geometry of one link.
pub struct LinkGeometry {
    pub name: &'static str,
    pub link: Link,
    pub kind: LinkKind,

    /// Parent link; the root points at itself.
    pub parent: Link,

    /// Offset of this link's origin from its parent's origin, meters, in
    /// the parent's frame.
    pub origin: [f64; 3],

    pub axis: Axis,

    /// Fixed rotation offset, degrees, applied whether or not the link has
    /// a joint.
    pub fixed_angle: f64,

    /// Index into the joint state vector, or -1 for non-commanded links.
    pub joint_index: i8,

    /// Commanded angle limits, degrees. Only meaningful when
    /// `joint_index >= 0`.
    pub angle_min: f64,
    pub angle_max: f64,
}

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static LINK_TABLE: [LinkGeometry; LINK_COUNT] = [
    LinkGeometry {
        name: "pit",
        link: Link::Pit,
        kind: LinkKind::Fixed,
        parent: Link::Pit,
        origin: [0.0, 0.0, 0.0],
        axis: Axis::None,
        fixed_angle: 0.0,
        joint_index: -1,
        angle_min: 0.0,
        angle_max: 0.0,
    },
    LinkGeometry {
        name: "frame",
        link: Link::Frame,
        kind: LinkKind::Revolute,
        parent: Link::Pit,
        origin: [0.0, 0.0, 0.0],
        axis: Axis::Z,
        fixed_angle: 0.0,
        joint_index: -1,
        angle_min: 0.0,
        angle_max: 0.0,
    },
    LinkGeometry {
        name: "fork",
        link: Link::Fork,
        kind: LinkKind::Revolute,
        parent: Link::Frame,
        origin: [0.0, 0.455, 0.150],
        axis: Axis::X,
        fixed_angle: 0.0,
        joint_index: 0,
        angle_min: -58.7,
        angle_max: 10.0,
    },
    LinkGeometry {
        name: "dump",
        link: Link::Dump,
        kind: LinkKind::Revolute,
        parent: Link::Fork,
        origin: [0.0, 0.250, 0.020],
        axis: Axis::X,
        fixed_angle: 0.0,
        joint_index: 1,
        angle_min: -80.0,
        angle_max: -10.0,
    },
    LinkGeometry {
        name: "boom",
        link: Link::Boom,
        kind: LinkKind::Revolute,
        parent: Link::Frame,
        origin: [0.0, 0.570, 0.215],
        axis: Axis::X,
        fixed_angle: 0.0,
        joint_index: 2,
        angle_min: -58.0,
        angle_max: 52.0,
    },
    LinkGeometry {
        name: "stick",
        link: Link::Stick,
        kind: LinkKind::Revolute,
        parent: Link::Boom,
        origin: [0.0, -0.312, 0.750],
        axis: Axis::X,
        fixed_angle: 0.0,
        joint_index: 3,
        angle_min: -32.0,
        angle_max: 60.0,
    },
    LinkGeometry {
        name: "tilt",
        link: Link::Tilt,
        kind: LinkKind::Revolute,
        parent: Link::Stick,
        origin: [0.0, 0.735, 0.012],
        axis: Axis::X,
        fixed_angle: 0.0,
        joint_index: 4,
        angle_min: -75.0,
        angle_max: 52.0,
    },
    LinkGeometry {
        name: "spin",
        link: Link::Spin,
        kind: LinkKind::Revolute,
        parent: Link::Tilt,
        origin: [0.0, 0.0, -0.075],
        axis: Axis::Y,
        fixed_angle: 0.0,
        joint_index: 5,
        angle_min: -30.0,
        angle_max: 30.0,
    },
    LinkGeometry {
        name: "coupler",
        link: Link::Coupler,
        kind: LinkKind::Fixed,
        parent: Link::Spin,
        origin: [0.0, 0.0, 0.035],
        axis: Axis::None,
        fixed_angle: 0.0,
        joint_index: -1,
        angle_min: 0.0,
        angle_max: 0.0,
    },
    LinkGeometry {
        name: "grinder",
        link: Link::Grinder,
        kind: LinkKind::Fixed,
        parent: Link::Coupler,
        origin: [0.0, 0.475, -0.311],
        axis: Axis::None,
        fixed_angle: 0.0,
        joint_index: -1,
        angle_min: 0.0,
        angle_max: 0.0,
    },
    LinkGeometry {
        name: "depthcam",
        link: Link::DepthCam,
        kind: LinkKind::Revolute,
        parent: Link::Stick,
        origin: [0.0, 0.490, 0.500],
        axis: Axis::X,
        fixed_angle: -180.0 + 57.0 + 1.0,
        joint_index: -1,
        angle_min: 0.0,
        angle_max: 0.0,
    },
    LinkGeometry {
        name: "drivecamflip",
        link: Link::DriveCamFlip,
        kind: LinkKind::Revolute,
        parent: Link::Frame,
        origin: [0.0, -0.575, 0.485],
        axis: Axis::Z,
        fixed_angle: 180.0,
        joint_index: -1,
        angle_min: 0.0,
        angle_max: 0.0,
    },
    LinkGeometry {
        name: "drivecam",
        link: Link::DriveCam,
        kind: LinkKind::Revolute,
        parent: Link::DriveCamFlip,
        origin: [0.0, 0.0, 0.0],
        axis: Axis::X,
        fixed_angle: -90.0,
        joint_index: -1,
        angle_min: 0.0,
        angle_max: 0.0,
    },
];

/// Links which carry commanded revolute joints.
pub static LINKS_WITH_REVOLUTE_JOINTS: [Link; 6] = [
    Link::Fork,
    Link::Dump,
    Link::Boom,
    Link::Stick,
    Link::Tilt,
    Link::Spin,
];

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Link {
    pub fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the static geometry of a link.
pub fn link_geometry(link: Link) -> &'static LinkGeometry {
    &LINK_TABLE[link.index()]
}

/// Iterate the whole table, parents first.
pub fn link_table() -> &'static [LinkGeometry; LINK_COUNT] {
    &LINK_TABLE
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_table_indices_match_enum() {
        for (i, geometry) in link_table().iter().enumerate() {
            assert_eq!(geometry.link.index(), i, "bad order: {}", geometry.name);
        }
    }

    #[test]
    fn test_parents_precede_children() {
        for geometry in link_table().iter() {
            if geometry.link != Link::Pit {
                assert!(
                    geometry.parent.index() < geometry.link.index(),
                    "parent of {} does not precede it",
                    geometry.name
                );
            }
        }
    }

    #[test]
    fn test_joint_indices_unique() {
        let mut seen = [false; 6];
        for geometry in link_table().iter() {
            if geometry.joint_index >= 0 {
                let i = geometry.joint_index as usize;
                assert!(!seen[i], "joint index {} duplicated", i);
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }
}
