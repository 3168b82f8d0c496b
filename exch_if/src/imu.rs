//! Inertial measurement unit records.
//!
//! Each IMU-carrying slot reports raw integer readings on the wire; the slot
//! driver filters them into an [`ImuState`] holding engineering units. The
//! backend only ever consumes the filtered state.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::exchange::ExchangeSafe;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Scale from raw accelerometer counts to m/s^2 (+-2 g over 16 bits, g=9.8).
pub const ACCEL_SCALE: f32 = 2.0 * 9.8 / 32768.0;

/// Scale from raw gyro counts to deg/s (+-250 deg/s over 16 bits).
pub const GYRO_SCALE: f32 = 250.0 / 32768.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A 3-vector of f32, as stored in the exchange records.
#[derive(Clone, Copy, Default, Debug, PartialEq)]
#[repr(C)]
pub struct Vec3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Raw IMU reading as sent by the firmware: accelerometer then gyro counts.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ImuRaw {
    pub acc: [i16; 3],
    pub gyro: [i16; 3],
}

/// Filtered IMU state, produced PC-side by the owning slot driver.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ImuState {
    /// Low-passed gravity estimate in world frame, m/s^2. Near (0,0,9.8)
    /// when the sensor is healthy and the body is not accelerating.
    pub global: Vec3f,

    /// High-frequency acceleration residual, m/s^2: a vibration measure.
    pub vibe: Vec3f,

    /// Body pitch angle, degrees (rotation about X, Y axis tipping up).
    pub pitch: f32,

    /// Body yaw angle, degrees.
    pub yaw: f32,

    /// Body roll angle, degrees.
    pub roll: f32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Vec3f {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl std::ops::Sub for Vec3f {
    type Output = Vec3f;

    fn sub(self, rhs: Vec3f) -> Vec3f {
        Vec3f::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Add for Vec3f {
    type Output = Vec3f;

    fn add(self, rhs: Vec3f) -> Vec3f {
        Vec3f::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3f {
    type Output = Vec3f;

    fn mul(self, rhs: f32) -> Vec3f {
        Vec3f::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl ImuRaw {
    /// Accelerometer reading in m/s^2.
    pub fn accel(&self) -> Vec3f {
        Vec3f::new(
            self.acc[0] as f32 * ACCEL_SCALE,
            self.acc[1] as f32 * ACCEL_SCALE,
            self.acc[2] as f32 * ACCEL_SCALE,
        )
    }

    /// Gyro reading in deg/s.
    pub fn rates(&self) -> Vec3f {
        Vec3f::new(
            self.gyro[0] as f32 * GYRO_SCALE,
            self.gyro[1] as f32 * GYRO_SCALE,
            self.gyro[2] as f32 * GYRO_SCALE,
        )
    }
}

unsafe impl ExchangeSafe for Vec3f {}
unsafe impl ExchangeSafe for ImuRaw {}
unsafe impl ExchangeSafe for ImuState {}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_accel_scaling() {
        let raw = ImuRaw {
            acc: [0, 0, 16384],
            gyro: [0; 3],
        };
        let a = raw.accel();
        assert!((a.z - 9.8).abs() < 1e-3);
        assert_eq!(a.x, 0.0);
    }

    #[test]
    fn test_vec_length() {
        assert!((Vec3f::new(3.0, 4.0, 0.0).length() - 5.0).abs() < 1e-6);
    }
}
