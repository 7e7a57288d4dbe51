//! Contains misc and utility functions.

/// Utility fn to make up for `core::cmp::max` requiring f32 to impl `Ord`, which it doesn't.
pub fn max(a: f32, b: f32) -> f32 {
    if a > b {
        a
    } else {
        b
    }
}

/// Clamp `val` to `[min, max]`. Unlike `f32::clamp`, doesn't panic if `min > max`.
pub fn constrain(val: f32, min: f32, max: f32) -> f32 {
    if val < min {
        min
    } else if val > max {
        max
    } else {
        val
    }
}

/// Utility function to linearly map an input value to an output
pub fn map_linear(val: f32, range_in: (f32, f32), range_out: (f32, f32)) -> f32 {
    let portion = (val - range_in.0) / (range_in.1 - range_in.0);

    portion * (range_out.1 - range_out.0) + range_out.0
}
