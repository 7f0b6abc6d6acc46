//! Triangle budget for a LOD level

/// Clamp a quality factor into `[0, 1]`; NaN counts as zero quality.
pub fn clamp_quality(quality: f32) -> f32 {
    if quality.is_nan() {
        0.0
    } else {
        quality.clamp(0.0, 1.0)
    }
}

/// Target triangle count for a level: `ceil(original × clamp01(quality))`.
///
/// The rounding is upward, so a tiny quality on a small mesh can keep a
/// triangle (or all of them).
pub fn target_triangles(original_triangles: usize, quality: f32) -> usize {
    let quality = clamp_quality(quality) as f64;
    let target = (original_triangles as f64 * quality).ceil() as usize;
    target.min(original_triangles)
}
