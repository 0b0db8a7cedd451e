//! Gamma mapping between the slider position a user sees and the PWM level
//! the device drives. Only the PWM level goes on the wire.

const GAMMA: f64 = 2.2;

fn map(value: f64, exponent: f64) -> u8 {
    let normalized = value.clamp(0.0, 255.0) / 255.0;
    (normalized.powf(exponent) * 255.0).round() as u8
}

/// Linear brightness (0 to 255) to PWM level. Out of range input is clamped.
pub fn perceptual_map(linear: f64) -> u8 {
    map(linear, GAMMA)
}

/// PWM level back to linear brightness.
pub fn inverse_perceptual_map(pwm: f64) -> u8 {
    map(pwm, 1.0 / GAMMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_fixed() {
        assert_eq!(perceptual_map(0.0), 0);
        assert_eq!(perceptual_map(255.0), 255);
        assert_eq!(inverse_perceptual_map(0.0), 0);
        assert_eq!(inverse_perceptual_map(255.0), 255);
    }

    #[test]
    fn midpoint() {
        // (128/255)^2.2 * 255 = 56.0...
        assert_eq!(perceptual_map(128.0), 56);
        assert_eq!(inverse_perceptual_map(56.0), 128);
    }

    #[test]
    fn clamps() {
        assert_eq!(perceptual_map(-20.0), 0);
        assert_eq!(perceptual_map(1000.0), 255);
        assert_eq!(inverse_perceptual_map(300.0), 255);
    }

    #[test]
    fn monotonic() {
        let mut last = 0;
        for v in 0..=255 {
            let pwm = perceptual_map(f64::from(v));
            assert!(pwm >= last);
            last = pwm;
        }
    }
}
