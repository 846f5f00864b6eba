use crate::image::GrayFloatImage;
use float_ord::FloatOrd;
use log::*;
use ndarray::{s, Array2, ArrayView2, Axis};

/// Side length of the square neighbourhood a maximum must dominate.
pub const MAXIMA_WINDOW: usize = 7;

/// Maximum along one axis over a centered window clipped to the field.
fn running_max(field: ArrayView2<f32>, axis: Axis) -> Array2<f32> {
    let half = MAXIMA_WINDOW / 2;
    let len = field.len_of(axis);
    Array2::from_shape_fn(field.dim(), |(y, x)| {
        let (fixed, center) = if axis == Axis(1) { (y, x) } else { (x, y) };
        let lo = center.saturating_sub(half);
        let hi = (center + half + 1).min(len);
        let window = if axis == Axis(1) {
            field.slice(s![fixed, lo..hi])
        } else {
            field.slice(s![lo..hi, fixed])
        };
        window
            .iter()
            .copied()
            .map(FloatOrd)
            .max()
            .map_or(f32::NEG_INFINITY, |m| m.0)
    })
}

/// Find the pixels that equal the maximum of their 7x7 neighbourhood.
///
/// The window is centered on each pixel and clipped at the image borders, so
/// corner pixels only compete with the in-bounds part of the window. Pixels
/// that tie for the maximum are all marked. No response threshold is applied.
///
/// # Arguments
/// * `response` - the corner strength field.
/// # Return value
/// A mask with shape `(height, width)`.
pub fn local_maxima(response: &GrayFloatImage) -> Array2<bool> {
    let field = response.ref_array2();
    // The max over a rectangle is the max of the row-wise maxima.
    let row_max = running_max(field, Axis(1));
    let window_max = running_max(row_max.view(), Axis(0));
    let mut mask = Array2::from_elem(field.dim(), false);
    ndarray::azip!((m in &mut mask, &r in &field, &w in &window_max) *m = r == w);
    debug!(
        "{} of {} pixels are local maxima.",
        mask.iter().filter(|&&m| m).count(),
        mask.len()
    );
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(response: &GrayFloatImage) -> Array2<bool> {
        let (w, h) = (response.width(), response.height());
        Array2::from_shape_fn((h, w), |(y, x)| {
            let mut max = f32::NEG_INFINITY;
            for yy in y.saturating_sub(3)..(y + 4).min(h) {
                for xx in x.saturating_sub(3)..(x + 4).min(w) {
                    max = max.max(response.get(xx, yy));
                }
            }
            response.get(x, y) == max
        })
    }

    fn pseudo_random_field(width: usize, height: usize) -> GrayFloatImage {
        // Small LCG, enough to scatter values without ties.
        let mut state = 12345u32;
        let data = (0..width * height)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (state >> 8) as f32 / (1u32 << 24) as f32
            })
            .collect();
        GrayFloatImage::from_raw(width, height, data).unwrap()
    }

    #[test]
    fn uniform_field_is_all_maxima() {
        let response = GrayFloatImage::new(11, 8);
        let mask = local_maxima(&response);
        assert_eq!(mask.dim(), (8, 11));
        assert!(mask.iter().all(|&m| m));
    }

    #[test]
    fn single_peak_suppresses_its_window() {
        let mut response = GrayFloatImage::new(15, 15);
        response.put(7, 7, 1.0);
        let mask = local_maxima(&response);
        assert!(mask[(7, 7)]);
        // Every other pixel within reach of the peak is suppressed.
        for y in 4..=10 {
            for x in 4..=10 {
                assert_eq!(mask[(y, x)], (x, y) == (7, 7));
            }
        }
        // Zeros out of reach tie with their own neighbourhood.
        assert!(mask[(0, 0)]);
        assert!(mask[(14, 3)]);
        assert!(!mask[(10, 10)]);
        assert!(mask[(11, 11)]);
    }

    #[test]
    fn ties_are_all_marked() {
        let mut response = GrayFloatImage::new(9, 9);
        response.put(3, 4, 2.0);
        response.put(5, 4, 2.0);
        let mask = local_maxima(&response);
        assert!(mask[(4, 3)]);
        assert!(mask[(4, 5)]);
        assert!(!mask[(4, 4)]);
    }

    #[test]
    fn corner_window_is_clipped() {
        let mut response = GrayFloatImage::new(10, 10);
        response.put(0, 0, 1.0);
        response.put(4, 0, 2.0);
        let mask = local_maxima(&response);
        // (4, 0) is outside the clipped 4x4 window of the corner.
        assert!(mask[(0, 0)]);
        assert!(mask[(0, 4)]);
        response.put(3, 3, 3.0);
        let mask = local_maxima(&response);
        assert!(!mask[(0, 0)]);
    }

    #[test]
    fn matches_brute_force_on_random_field() {
        let response = pseudo_random_field(23, 17);
        assert_eq!(local_maxima(&response), brute_force(&response));
    }
}
