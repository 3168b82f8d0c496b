//! Kinematic link model.
//!
//! Forward kinematics over the static link table, and the planar inverse
//! kinematic solver for the arm. The robot coordinate frame ("frame
//! space") has +Y forward and +Z up; all arm motion is in the YZ plane.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod ik;
pub mod links;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

// Internal
pub use ik::ExcahaulerIk;
pub use links::{
    link_geometry, link_table, Axis, Link, LinkGeometry, LinkKind, LINK_COUNT,
    LINKS_WITH_REVOLUTE_JOINTS,
};

use exch_if::state::JointAngles;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Revolute joint angles in degrees.
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct JointState {
    pub fork: f64,
    pub dump: f64,
    pub boom: f64,
    pub stick: f64,
    pub tilt: f64,
    pub spin: f64,
}

/// Per-link coordinate frames computed from one joint state.
///
/// Each entry maps link-local coordinates into frame space. The chain
/// depth is at most six so the whole table is recomputed from scratch
/// whenever the joint state changes.
pub struct LinkCoords {
    coords: [Isometry3<f64>; LINK_COUNT],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl JointState {
    pub const COUNT: usize = 6;

    /// Joint angle by joint index (the link table's `joint_index`).
    pub fn get(&self, index: usize) -> f64 {
        match index {
            0 => self.fork,
            1 => self.dump,
            2 => self.boom,
            3 => self.stick,
            4 => self.tilt,
            5 => self.spin,
            _ => panic!("Invalid joint index {}", index),
        }
    }

    pub fn set(&mut self, index: usize, angle: f64) {
        match index {
            0 => self.fork = angle,
            1 => self.dump = angle,
            2 => self.boom = angle,
            3 => self.stick = angle,
            4 => self.tilt = angle,
            5 => self.spin = angle,
            _ => panic!("Invalid joint index {}", index),
        }
    }

    /// Convert from the f32 wire record.
    pub fn from_angles(angles: &JointAngles) -> Self {
        Self {
            fork: angles.fork as f64,
            dump: angles.dump as f64,
            boom: angles.boom as f64,
            stick: angles.stick as f64,
            tilt: angles.tilt as f64,
            spin: angles.spin as f64,
        }
    }

    /// Convert to the f32 wire record.
    pub fn to_angles(&self) -> JointAngles {
        JointAngles {
            fork: self.fork as f32,
            dump: self.dump as f32,
            boom: self.boom as f32,
            stick: self.stick as f32,
            tilt: self.tilt as f32,
            spin: self.spin as f32,
        }
    }
}

impl LinkCoords {
    /// Compute every link frame for this joint state.
    pub fn new(joint: &JointState) -> Self {
        let mut coords = [Isometry3::identity(); LINK_COUNT];

        for geometry in link_table().iter() {
            if geometry.link == Link::Pit {
                continue;
            }

            let local = local_transform(geometry, joint);
            coords[geometry.link.index()] =
                coords[geometry.parent.index()] * local;
        }

        Self { coords }
    }

    /// The link's coordinate frame in frame space.
    pub fn coord(&self, link: Link) -> &Isometry3<f64> {
        &self.coords[link.index()]
    }

    /// Origin of the link in frame space.
    pub fn origin(&self, link: Link) -> Vector3<f64> {
        self.coords[link.index()].translation.vector
    }

    /// Map a link-local point into frame space.
    pub fn world_from_local(&self, link: Link, point: &Point3<f64>) -> Point3<f64> {
        self.coord(link) * point
    }

    /// Map a frame-space point into link-local coordinates.
    pub fn local_from_world(&self, link: Link, point: &Point3<f64>) -> Point3<f64> {
        self.coord(link).inverse_transform_point(point)
    }

    /// Given the frame the child link should occupy, return the frame its
    /// parent must occupy.
    ///
    /// `parent` must be an ancestor of `child`. Revolute joints along the
    /// chain are taken at zero, so this is most useful across the fixed
    /// tool linkage (tilt through grinder).
    pub fn parent_from_child(
        parent: Link,
        child: Link,
        child_frame: &Isometry3<f64>,
    ) -> Isometry3<f64> {
        child_frame * chain_transform(parent, child).inverse()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Coarse sanity check: every commanded joint angle within its limits.
pub fn joint_state_sane(joint: &JointState) -> bool {
    for link in LINKS_WITH_REVOLUTE_JOINTS.iter() {
        let geometry = link_geometry(*link);
        if geometry.joint_index >= 0 {
            let angle = joint.get(geometry.joint_index as usize);
            if angle < geometry.angle_min || angle > geometry.angle_max {
                return false;
            }
        }
    }
    true
}

/// Angle of a direction vector in the YZ plane, degrees.
///
/// The Y axis has an angle of 0, the Z axis +90.
pub fn frame_degrees(v: &Vector3<f64>) -> f64 {
    v.z.atan2(v.y).to_degrees()
}

/// Unit vector in the YZ plane at this angle, degrees.
pub fn vec_from_frame_degrees(angle_deg: f64) -> Vector3<f64> {
    let rad = angle_deg.to_radians();
    Vector3::new(0.0, rad.cos(), rad.sin())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// One link's transform relative to its parent.
fn local_transform(geometry: &LinkGeometry, joint: &JointState) -> Isometry3<f64> {
    let mut angle_deg = geometry.fixed_angle;
    if geometry.joint_index >= 0 {
        angle_deg += joint.get(geometry.joint_index as usize);
    }

    let rotation = axis_rotation(geometry.axis, angle_deg);

    Isometry3::from_parts(
        Translation3::from(Vector3::from(geometry.origin)),
        rotation,
    )
}

/// Chain transform from an ancestor link's frame to a descendant's, with
/// revolute joints at zero.
fn chain_transform(parent: Link, child: Link) -> Isometry3<f64> {
    let zero = JointState::default();

    let mut chain = Vec::new();
    let mut cursor = child;
    while cursor != parent {
        let geometry = link_geometry(cursor);
        assert!(
            geometry.parent != cursor,
            "{:?} is not an ancestor of {:?}",
            parent,
            child
        );
        chain.push(geometry);
        cursor = geometry.parent;
    }

    let mut transform = Isometry3::identity();
    for geometry in chain.iter().rev() {
        transform *= local_transform(geometry, &zero);
    }
    transform
}

fn axis_rotation(axis: Axis, angle_deg: f64) -> UnitQuaternion<f64> {
    let rad = angle_deg.to_radians();
    match axis {
        Axis::X => UnitQuaternion::from_axis_angle(&Vector3::x_axis(), rad),
        Axis::Y => UnitQuaternion::from_axis_angle(&Vector3::y_axis(), rad),
        Axis::Z => UnitQuaternion::from_axis_angle(&Vector3::z_axis(), rad),
        Axis::None => UnitQuaternion::identity(),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn test_joint() -> JointState {
        JointState {
            fork: -10.0,
            dump: -35.0,
            boom: 20.0,
            stick: 15.0,
            tilt: -40.0,
            spin: 0.0,
        }
    }

    #[test]
    fn test_local_world_roundtrip() {
        let coords = LinkCoords::new(&test_joint());
        let probe = Point3::new(0.1, -0.2, 0.3);

        for geometry in link_table().iter() {
            let world = coords.world_from_local(geometry.link, &probe);
            let back = coords.local_from_world(geometry.link, &world);
            assert!(
                (back - probe).norm() < 1e-6,
                "roundtrip failed for {}",
                geometry.name
            );
        }
    }

    #[test]
    fn test_transforms_orthonormal() {
        let coords = LinkCoords::new(&test_joint());
        for geometry in link_table().iter() {
            let r = coords.coord(geometry.link).rotation.to_rotation_matrix();
            let product = r.matrix() * r.matrix().transpose();
            assert!(
                (product - nalgebra::Matrix3::identity()).norm() < 1e-9,
                "rotation not orthonormal for {}",
                geometry.name
            );
        }
    }

    #[test]
    fn test_boom_origin_fixed() {
        // The boom's origin does not depend on the arm joints
        let coords = LinkCoords::new(&test_joint());
        let origin = coords.origin(Link::Boom);
        assert!((origin - Vector3::new(0.0, 0.570, 0.215)).norm() < 1e-12);
    }

    #[test]
    fn test_grinder_position_at_zero_joints() {
        // At all-zero joints the arm chain offsets sum directly
        let coords = LinkCoords::new(&JointState::default());
        let origin = coords.origin(Link::Grinder);

        let expect_y = 0.570 - 0.312 + 0.735 + 0.475;
        let expect_z = 0.215 + 0.750 + 0.012 - 0.075 + 0.035 - 0.311;
        assert!((origin - Vector3::new(0.0, expect_y, expect_z)).norm() < 1e-9);
    }

    #[test]
    fn test_parent_from_child_inverts_chain() {
        let zero = JointState::default();
        let coords = LinkCoords::new(&zero);

        // If the grinder sits at its zero-joint frame, the tilt link must
        // sit at its own zero-joint frame.
        let grinder_frame = *coords.coord(Link::Grinder);
        let tilt_frame =
            LinkCoords::parent_from_child(Link::Tilt, Link::Grinder, &grinder_frame);

        let expected = coords.coord(Link::Tilt);
        assert!(
            (tilt_frame.translation.vector - expected.translation.vector).norm()
                < 1e-9
        );
    }

    #[test]
    fn test_joint_sanity_limits() {
        let mut joint = JointState::default();
        joint.dump = -45.0;
        assert!(joint_state_sane(&joint));

        joint.boom = 60.0;
        assert!(!joint_state_sane(&joint));

        joint.boom = 0.0;
        joint.fork = -60.0;
        assert!(!joint_state_sane(&joint));
    }

    #[test]
    fn test_frame_degrees() {
        assert!((frame_degrees(&Vector3::new(0.0, 1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((frame_degrees(&Vector3::new(0.0, 0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!(
            (frame_degrees(&Vector3::new(0.0, -1.0, 0.0)).abs() - 180.0).abs()
                < 1e-9
        );
    }
}
