// Wheel geometry for the GoPiGo base
// Converts centimeters and degrees into encoder pulse targets.

use std::f64::consts::PI;

/// Wheel radius in centimeters
pub const WHEEL_RADIUS: f64 = 3.25;

/// Distance covered by one full wheel rotation
pub const WHEEL_CIRCUMFERENCE: f64 = 2.0 * PI * WHEEL_RADIUS;

/// Encoder pulses per wheel rotation when driving straight
pub const PULSES_PER_ROTATION: f64 = 18.0;

/// Encoder resolution used for turning: 64 pulses per full rotation
const TURN_PULSES_PER_ROTATION: f64 = 64.0;
pub const DEGREES_PER_PULSE: f64 = 360.0 / TURN_PULSES_PER_ROTATION;

/// Convert a straight-line distance to an encoder pulse target
///
/// Returns `None` for `distance_cm <= 0`: no target is set and the robot
/// moves until told to stop.
pub fn pulses_for_distance(distance_cm: f64) -> Option<u32> {
    if distance_cm.is_nan() || distance_cm <= 0.0 {
        return None;
    }
    let pulses = (PULSES_PER_ROTATION * distance_cm / WHEEL_CIRCUMFERENCE).round();
    Some(pulses as u32)
}

/// Convert a turn angle to an encoder pulse target
///
/// Returns `None` for `degrees <= 0` (continuous turn).
pub fn pulses_for_angle(degrees: f64) -> Option<u32> {
    if degrees.is_nan() || degrees <= 0.0 {
        return None;
    }
    Some((degrees / DEGREES_PER_PULSE).floor() as u32)
}
