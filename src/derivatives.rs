use crate::image::{separable_filter, GrayFloatImage};

/// Central difference taps of the Sobel operator.
const SOBEL_DERIVATIVE: [f32; 3] = [-1., 0., 1.];
/// Smoothing taps of the Sobel operator, across the derivative axis.
const SOBEL_SMOOTHING: [f32; 3] = [1., 2., 1.];

/// Compute the Sobel derivative horizontally (along `x`).
///
/// The implementation of this function is using a separable kernel, for speed.
/// Borders are reflected, so a constant image has a zero derivative everywhere.
///
/// # Arguments
/// * `image` - the input image.
///
/// # Return value
/// Output image derivative (an image.)
pub fn sobel_horizontal(image: &GrayFloatImage) -> GrayFloatImage {
    GrayFloatImage(separable_filter(
        &image.0,
        &SOBEL_DERIVATIVE,
        &SOBEL_SMOOTHING,
    ))
}

/// Compute the Sobel derivative vertically (along `y`).
///
/// # Arguments
/// * `image` - the input image.
///
/// # Return value
/// Output image derivative (an image.)
pub fn sobel_vertical(image: &GrayFloatImage) -> GrayFloatImage {
    GrayFloatImage(separable_filter(
        &image.0,
        &SOBEL_SMOOTHING,
        &SOBEL_DERIVATIVE,
    ))
}
