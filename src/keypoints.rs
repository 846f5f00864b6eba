use crate::detector_response::{harris_response, HarrisResponse};
use crate::image::GrayFloatImage;
use crate::local_maxima::local_maxima;
use crate::KeyPoint;
use log::*;
use ndarray::ArrayView2;

/// Every Harris keypoint gets this size, it is not derived from scale.
pub const KEYPOINT_SIZE: f32 = 10.0;

/// Turn a maxima mask into keypoints.
///
/// Keypoints are emitted in row-major order (`y` outer, `x` inner). Descriptor
/// rows are produced in the same order, so this ordering is part of the
/// contract.
///
/// # Arguments
/// * `mask` - local maxima, shape `(height, width)`.
/// * `harris` - the response and orientation fields the mask was computed from.
/// # Return value
/// One keypoint per marked pixel.
pub fn extract_keypoints(mask: ArrayView2<bool>, harris: &HarrisResponse) -> Vec<KeyPoint> {
    let response = harris.response.ref_array2();
    let orientation = harris.orientation.ref_array2();
    assert_eq!(mask.dim(), response.dim(), "mask and response differ in size");
    assert_eq!(
        mask.dim(),
        orientation.dim(),
        "mask and orientation differ in size"
    );
    mask.indexed_iter()
        .filter(|&(_, &is_max)| is_max)
        .map(|((y, x), _)| KeyPoint {
            point: (x as f32, y as f32),
            response: response[(y, x)],
            size: KEYPOINT_SIZE,
            angle: orientation[(y, x)],
        })
        .collect()
}

/// Detect Harris keypoints in a grayscale image.
///
/// Runs the Harris response, the 7x7 local maxima selection, and keypoint
/// extraction back to back.
pub fn detect_keypoints(image: &GrayFloatImage) -> Vec<KeyPoint> {
    let harris = harris_response(image);
    trace!("Computing Harris response finished.");
    let mask = local_maxima(&harris.response);
    trace!("Local maxima selection finished.");
    let keypoints = extract_keypoints(mask.view(), &harris);
    debug!("Extracted {} Harris keypoints.", keypoints.len());
    keypoints
}
