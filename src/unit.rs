//! Unit conversion utilities.
//!
//! The container format measures shape geometry in English Metric Units
//! (EMU, 914,400 per inch) and most typographic values in centipoints or
//! percent-mille (100,000 = 100%). Conversions live here so every parser
//! agrees on the arithmetic.

/// English Metric Units per inch.
pub const EMUS_PER_INCH: i64 = 914_400;
/// English Metric Units per centimeter.
pub const EMUS_PER_CM: i64 = 360_000;
/// English Metric Units per point (1/72 inch).
pub const EMUS_PER_PT: i64 = 12_700;
/// Percent-mille scale used by color modifiers and gradient stops.
pub const PERCENT_SCALE: f64 = 100_000.0;
/// Angle unit of gradient rotations, 1/60,000 of a degree.
pub const ANGLE_UNITS_PER_DEGREE: f64 = 60_000.0;

#[inline]
pub fn emu_to_pt(emu: i64) -> f64 {
    emu as f64 / EMUS_PER_PT as f64
}

#[inline]
pub fn pt_to_emu(pt: f64) -> i64 {
    (pt * EMUS_PER_PT as f64) as i64
}

#[inline]
pub fn emu_to_inches(emu: i64) -> f64 {
    emu as f64 / EMUS_PER_INCH as f64
}

/// Convert a centipoint attribute value (`sz="1800"` = 18pt) to points.
#[inline]
pub fn centipoints_to_pt(v: i64) -> f64 {
    v as f64 / 100.0
}

/// Convert a percent-mille attribute value (`val="50000"` = 50%) to a
/// unit fraction.
#[inline]
pub fn percent_mille_to_fraction(v: i64) -> f64 {
    v as f64 / PERCENT_SCALE
}

/// Convert a gradient angle attribute (1/60,000 degree) to degrees.
#[inline]
pub fn angle_units_to_degrees(v: i64) -> f64 {
    v as f64 / ANGLE_UNITS_PER_DEGREE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emu_pt_round_trip() {
        assert_eq!(pt_to_emu(1.0), 12_700);
        assert!((emu_to_pt(12_700) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_emu_to_inches() {
        assert!((emu_to_inches(914_400) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_centipoints() {
        assert!((centipoints_to_pt(1800) - 18.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_percent_mille() {
        assert!((percent_mille_to_fraction(50_000) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_angle_units() {
        assert!((angle_units_to_degrees(5_400_000) - 90.0).abs() < f64::EPSILON);
    }
}
