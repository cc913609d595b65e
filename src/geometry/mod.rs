pub mod interval;
pub mod outline;
pub mod pose;
pub mod similarity;

pub use interval::*;
pub use outline::*;
pub use pose::*;
pub use similarity::*;

use glam::{DMat2, DVec2};

/// Rotation matrix for a pose angle in degrees.
///
/// World y grows downward, so a positive angle turns clockwise as displayed.
pub fn rotation_matrix(degrees: f64) -> DMat2 {
    DMat2::from_angle(degrees.to_radians())
}

pub fn rotate(v: DVec2, degrees: f64) -> DVec2 {
    rotation_matrix(degrees) * v
}

/// Wrap an angle into (-180, 180].
pub fn wrap_degrees(angle: f64) -> f64 {
    let mut a = angle % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_rotation_is_clockwise_on_screen() {
        // +x turns toward +y, which points down on screen
        let v = rotate(DVec2::new(1.0, 0.0), 90.0);
        assert!(v.x.abs() < 1e-12);
        assert!((v.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert_eq!(wrap_degrees(540.0), 180.0);
        assert!((wrap_degrees(-370.0) + 10.0).abs() < 1e-12);
    }
}
