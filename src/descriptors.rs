use crate::image::{gaussian_blur, warp_affine, GrayFloatImage};
use crate::KeyPoint;
use log::*;
use nalgebra::{Matrix2x3, Matrix3, Vector2};
use ndarray::{Array1, Array2, ArrayView1};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// One row per keypoint, one column per descriptor dimension.
pub type DescriptorMatrix = Array2<f32>;

/// Side length of the MOPS patch.
pub const MOPS_WINDOW: usize = 8;
/// Length of a MOPS descriptor.
pub const MOPS_DESCRIPTOR_SIZE: usize = MOPS_WINDOW * MOPS_WINDOW;
/// Downscale from the 40x40 neighbourhood to the 8x8 patch.
pub const MOPS_SCALE: f32 = 0.2;
/// Pre-smoothing applied to the image before patches are sampled.
pub const MOPS_SMOOTHING_SIGMA: f32 = 0.5;
/// Patches with a smaller standard deviation describe as all zeros.
pub const MIN_PATCH_STD: f64 = 1e-10;

/// Side length of the simple intensity window.
pub const SIMPLE_WINDOW: usize = 5;
/// Length of a simple descriptor.
pub const SIMPLE_DESCRIPTOR_SIZE: usize = SIMPLE_WINDOW * SIMPLE_WINDOW;

/// The transform from image pixels to MOPS patch pixels for a keypoint.
///
/// Composed right to left: move the keypoint to the origin, rotate by the
/// negated keypoint angle so the gradient direction lines up with `+x`, scale
/// by [`MOPS_SCALE`], and move the origin to the center of the patch.
pub fn mops_transform(keypoint: &KeyPoint) -> Matrix2x3<f32> {
    let (x, y) = keypoint.point;
    let half_window = MOPS_WINDOW as f32 / 2.0;
    let to_origin = Matrix3::new_translation(&Vector2::new(-x, -y));
    let rotation = Matrix3::new_rotation(-keypoint.angle.to_radians());
    let scale = Matrix3::new_nonuniform_scaling(&Vector2::new(MOPS_SCALE, MOPS_SCALE));
    let to_center = Matrix3::new_translation(&Vector2::new(half_window, half_window));
    let m = to_center * scale * rotation * to_origin;
    Matrix2x3::new(
        m[(0, 0)],
        m[(0, 1)],
        m[(0, 2)],
        m[(1, 0)],
        m[(1, 1)],
        m[(1, 2)],
    )
}

/// Normalize a patch to zero mean and unit (population) standard deviation.
///
/// Patches that are constant up to [`MIN_PATCH_STD`] become all zeros.
pub fn normalize_patch(patch: ArrayView1<f32>) -> Array1<f32> {
    let n = patch.len() as f64;
    if patch.is_empty() {
        return Array1::zeros(0);
    }
    let mean = patch.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = patch
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n;
    let std = variance.sqrt();
    if std < MIN_PATCH_STD {
        return Array1::zeros(patch.len());
    }
    patch.mapv(|v| ((f64::from(v) - mean) / std) as f32)
}

/// Sample and normalize the MOPS patch of one keypoint.
fn mops_descriptor(smoothed: &GrayFloatImage, keypoint: &KeyPoint) -> Array1<f32> {
    match warp_affine(smoothed, &mops_transform(keypoint), MOPS_WINDOW, MOPS_WINDOW) {
        Ok(patch) => {
            let flat = ArrayView1::from(patch.as_raw().as_slice());
            normalize_patch(flat)
        }
        Err(e) => {
            warn!("Keypoint at {:?} has no patch: {}", keypoint.point, e);
            Array1::zeros(MOPS_DESCRIPTOR_SIZE)
        }
    }
}

/// The 5x5 window of raw intensities around the keypoint's pixel.
fn simple_descriptor(image: &GrayFloatImage, keypoint: &KeyPoint) -> Array1<f32> {
    let x = keypoint.point.0.floor() as isize;
    let y = keypoint.point.1.floor() as isize;
    let half = (SIMPLE_WINDOW / 2) as isize;
    (-half..=half)
        .flat_map(|dy| (-half..=half).map(move |dx| (dx, dy)))
        .map(|(dx, dy)| image.get_or_zero(x + dx, y + dy))
        .collect()
}

/// Stack per-keypoint rows, in keypoint order, into a matrix.
fn stack_rows(
    keypoints: &[KeyPoint],
    columns: usize,
    describe: impl Fn(&KeyPoint) -> Array1<f32> + Send + Sync,
) -> DescriptorMatrix {
    #[cfg(not(feature = "rayon"))]
    let rows: Vec<Array1<f32>> = keypoints.iter().map(describe).collect();
    #[cfg(feature = "rayon")]
    let rows: Vec<Array1<f32>> = keypoints.par_iter().map(describe).collect();
    let mut descriptors = Array2::zeros((keypoints.len(), columns));
    for (mut out, row) in descriptors.rows_mut().into_iter().zip(rows) {
        out.assign(&row);
    }
    let degenerate = descriptors
        .rows()
        .into_iter()
        .filter(|row| row.iter().all(|&v| v == 0.0))
        .count();
    debug!(
        "Computed {} descriptors of length {}, {} are all zero.",
        keypoints.len(),
        columns,
        degenerate
    );
    descriptors
}

/// Compute MOPS descriptors.
///
/// The image is smoothed once with a Gaussian of sigma [`MOPS_SMOOTHING_SIGMA`].
/// For every keypoint the 40x40 neighbourhood, rotated into the keypoint's
/// orientation, is resampled bilinearly onto an 8x8 patch (see
/// [`mops_transform`]), then normalized with [`normalize_patch`]. Samples
/// outside the image read as zero.
///
/// # Arguments
/// * `image` - the grayscale image the keypoints were detected in.
/// * `keypoints` - the keypoints to describe.
/// # Return value
/// A `keypoints.len() x 64` matrix, row `i` describing keypoint `i`.
pub fn mops_descriptors(image: &GrayFloatImage, keypoints: &[KeyPoint]) -> DescriptorMatrix {
    let smoothed = gaussian_blur(image, MOPS_SMOOTHING_SIGMA);
    trace!("Smoothing for MOPS descriptors finished.");
    stack_rows(keypoints, MOPS_DESCRIPTOR_SIZE, |keypoint| {
        mops_descriptor(&smoothed, keypoint)
    })
}

/// Compute simple descriptors: the unsmoothed 5x5 intensity window centered
/// on each keypoint's pixel, row-major, with zeros outside the image.
///
/// # Return value
/// A `keypoints.len() x 25` matrix.
pub fn simple_descriptors(image: &GrayFloatImage, keypoints: &[KeyPoint]) -> DescriptorMatrix {
    stack_rows(keypoints, SIMPLE_DESCRIPTOR_SIZE, |keypoint| {
        simple_descriptor(image, keypoint)
    })
}
