//! Hand angles. 0 rad points at 12 o'clock and angles grow clockwise.

use std::f32::consts::TAU;

use crate::types::ReferenceTime;

pub fn hour_angle(hour: u8, minute: u8) -> f32 {
    ((hour % 12) as f32 + minute as f32 / 60.0) / 12.0 * TAU
}

pub fn minute_angle(minute: u8, second: u8) -> f32 {
    (minute as f32 + second as f32 / 60.0) / 60.0 * TAU
}

pub fn second_angle(second: u8) -> f32 {
    second as f32 / 60.0 * TAU
}

/// Rotation each hand layer needs to go from the reference pose to a target
/// reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandRotations {
    pub hour: f32,
    pub minute: f32,
    pub second: f32,
}

impl HandRotations {
    pub fn between(reference: &ReferenceTime, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour: hour_angle(hour, minute) - hour_angle(reference.hour(), reference.minute()),
            minute: minute_angle(minute, second)
                - minute_angle(reference.minute(), reference.second()),
            second: second_angle(second) - second_angle(reference.second()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_angle_stays_in_range_and_is_monotonic() {
        for hour in 0..12u8 {
            let mut last = -1.0f32;
            for minute in 0..60u8 {
                let a = hour_angle(hour, minute);
                assert!((0.0..TAU).contains(&a), "{hour}:{minute} -> {a}");
                assert!(a >= last);
                last = a;
            }
            let next = hour_angle((hour + 1) % 12, 0);
            if hour < 11 {
                assert!(next > last);
            } else {
                assert_eq!(next, 0.0);
            }
        }
    }

    #[test]
    fn zero_readings_point_at_twelve() {
        assert_eq!(minute_angle(0, 0), 0.0);
        assert_eq!(second_angle(0), 0.0);
        assert_eq!(hour_angle(0, 0), 0.0);
        assert_eq!(hour_angle(12, 0), 0.0);
    }

    #[test]
    fn quarter_positions() {
        let quarter = TAU / 4.0;
        assert!((hour_angle(3, 0) - quarter).abs() < 1e-5);
        assert!((minute_angle(15, 0) - quarter).abs() < 1e-5);
        assert!((second_angle(45) - 3.0 * quarter).abs() < 1e-5);
        assert!((minute_angle(59, 60 - 1) - TAU).abs() < 0.01);
    }

    #[test]
    fn rotations_are_deltas_from_reference() {
        let reference = ReferenceTime::new(10, 10, 30).unwrap();
        let same = HandRotations::between(&reference, 10, 10, 30);
        assert_eq!(same.hour, 0.0);
        assert_eq!(same.minute, 0.0);
        assert_eq!(same.second, 0.0);

        let later = HandRotations::between(&reference, 11, 10, 30);
        assert!((later.hour - TAU / 12.0).abs() < 1e-5);
        assert_eq!(later.minute, 0.0);
    }
}
