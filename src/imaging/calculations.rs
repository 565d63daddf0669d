//! Pure calculation functions for resize targets and quality back-off.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate output dimensions for a maximum width, preserving aspect ratio.
///
/// Images already at or below `max_width` keep their size (no enlargement).
/// The height is rounded and never drops below 1 pixel.
///
/// # Examples
/// ```
/// # use deario_images::imaging::calculate_target_dimensions;
/// assert_eq!(calculate_target_dimensions((4000, 3000), 800), (800, 600));
/// assert_eq!(calculate_target_dimensions((640, 480), 800), (640, 480));
/// ```
pub fn calculate_target_dimensions(original: (u32, u32), max_width: u32) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    if orig_w <= max_width || orig_w == 0 {
        return original;
    }
    let ratio = max_width as f64 / orig_w as f64;
    let h = ((orig_h as f64 * ratio).round() as u32).max(1);
    (max_width, h)
}

/// Quality values to try, in order, for a lossy encode.
///
/// Starts at `start` and steps down by `step` while the next value stays at
/// or above `floor`. `start` itself is always tried, even below the floor.
///
/// # Examples
/// ```
/// # use deario_images::imaging::quality_ladder;
/// assert_eq!(quality_ladder(75, 50, 5), vec![75, 70, 65, 60, 55, 50]);
/// ```
pub fn quality_ladder(start: u32, floor: u32, step: u32) -> Vec<u32> {
    let mut ladder = vec![start];
    if step == 0 {
        return ladder;
    }
    let mut q = start;
    while q >= step && q - step >= floor {
        q -= step;
        ladder.push(q);
    }
    ladder
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // =========================================================================
    // calculate_target_dimensions tests
    // =========================================================================

    #[test]
    fn landscape_scaled_to_max_width() {
        // 4032x3024 phone photo → 800x600
        assert_eq!(calculate_target_dimensions((4032, 3024), 800), (800, 600));
    }

    #[test]
    fn portrait_scaled_by_width_not_long_edge() {
        // 3024x4032 → width 800, height 1067
        assert_eq!(calculate_target_dimensions((3024, 4032), 800), (800, 1067));
    }

    #[test]
    fn exact_max_width_unchanged() {
        assert_eq!(calculate_target_dimensions((800, 10), 800), (800, 10));
    }

    #[test]
    fn narrow_image_never_enlarged() {
        assert_eq!(calculate_target_dimensions((320, 5000), 800), (320, 5000));
    }

    #[test]
    fn extreme_panorama_keeps_one_pixel_height() {
        assert_eq!(calculate_target_dimensions((100_000, 10), 800), (800, 1));
    }

    // =========================================================================
    // quality_ladder tests
    // =========================================================================

    #[test]
    fn default_ladder() {
        assert_eq!(quality_ladder(75, 50, 5), vec![75, 70, 65, 60, 55, 50]);
    }

    #[test]
    fn ladder_stops_before_crossing_floor() {
        // 72 → 67 → 62 → 57 → 52; 47 would cross 50
        assert_eq!(quality_ladder(72, 50, 5), vec![72, 67, 62, 57, 52]);
    }

    #[test]
    fn start_at_floor_is_single_attempt() {
        assert_eq!(quality_ladder(50, 50, 5), vec![50]);
    }

    #[test]
    fn start_below_floor_still_tried() {
        assert_eq!(quality_ladder(40, 50, 5), vec![40]);
    }

    #[test]
    fn zero_step_is_single_attempt() {
        assert_eq!(quality_ladder(75, 50, 0), vec![75]);
    }

    #[test]
    fn ladder_with_floor_zero_does_not_underflow() {
        assert_eq!(quality_ladder(10, 0, 5), vec![10, 5, 0]);
    }

    proptest! {
        #[test]
        fn target_never_upscales(w in 1u32..20_000, h in 1u32..20_000, max in 1u32..4_000) {
            let (tw, th) = calculate_target_dimensions((w, h), max);
            prop_assert!(tw <= w);
            prop_assert!(tw <= max);
            prop_assert!(th >= 1);
            prop_assert!(th <= h);
        }

        #[test]
        fn ladder_stays_within_bounds(start in 50u32..=100, step in 1u32..20) {
            let ladder = quality_ladder(start, 50, step);
            prop_assert_eq!(ladder[0], start);
            for pair in ladder.windows(2) {
                prop_assert_eq!(pair[0] - pair[1], step);
            }
            prop_assert!(ladder.iter().all(|&q| q >= 50 && q <= start));
        }
    }
}
