use crate::derivatives;
use crate::image::{gaussian_blur, GrayFloatImage};
use log::*;
use ndarray::azip;

/// Harris sensitivity constant in `det(M) - k trace(M)^2`.
pub const HARRIS_K: f32 = 0.1;

/// Standard deviation of the Gaussian window over the structure tensor.
pub const STRUCTURE_TENSOR_SIGMA: f32 = 0.5;

/// The Harris corner strength and gradient orientation of an image.
///
/// Both fields have the dimensions of the image they were computed from.
#[derive(Debug, Clone)]
pub struct HarrisResponse {
    /// Corner strength `R = det(M) - k trace(M)^2` at every pixel.
    pub response: GrayFloatImage,
    /// Gradient direction `atan2(Iy, Ix)` in degrees, in `(-180, 180]`.
    pub orientation: GrayFloatImage,
}

fn gradients(image: &GrayFloatImage) -> (GrayFloatImage, GrayFloatImage) {
    #[cfg(not(feature = "rayon"))]
    {
        (
            derivatives::sobel_horizontal(image),
            derivatives::sobel_vertical(image),
        )
    }
    #[cfg(feature = "rayon")]
    {
        rayon::join(
            || derivatives::sobel_horizontal(image),
            || derivatives::sobel_vertical(image),
        )
    }
}

/// Smooth the three distinct structure tensor terms independently.
fn smooth_tensor(
    xx: &GrayFloatImage,
    xy: &GrayFloatImage,
    yy: &GrayFloatImage,
) -> (GrayFloatImage, GrayFloatImage, GrayFloatImage) {
    #[cfg(not(feature = "rayon"))]
    {
        (
            gaussian_blur(xx, STRUCTURE_TENSOR_SIGMA),
            gaussian_blur(xy, STRUCTURE_TENSOR_SIGMA),
            gaussian_blur(yy, STRUCTURE_TENSOR_SIGMA),
        )
    }
    #[cfg(feature = "rayon")]
    {
        let (a, (b, c)) = rayon::join(
            || gaussian_blur(xx, STRUCTURE_TENSOR_SIGMA),
            || {
                rayon::join(
                    || gaussian_blur(xy, STRUCTURE_TENSOR_SIGMA),
                    || gaussian_blur(yy, STRUCTURE_TENSOR_SIGMA),
                )
            },
        );
        (a, b, c)
    }
}

/// Compute the Harris corner response and the gradient orientation.
///
/// # Arguments
/// * `image` - single channel image with intensities in `[0, 1]`.
///
/// # Return value
/// The response and orientation fields. Flat regions get a response of zero
/// and an orientation of zero.
#[allow(non_snake_case)]
pub fn harris_response(image: &GrayFloatImage) -> HarrisResponse {
    let (width, height) = (image.width(), image.height());
    let (Ix, Iy) = gradients(image);
    trace!("Sobel gradients finished.");
    let mut Ixx = GrayFloatImage::new(width, height);
    let mut Ixy = GrayFloatImage::new(width, height);
    let mut Iyy = GrayFloatImage::new(width, height);
    azip!((
        xx in Ixx.mut_array2(),
        xy in Ixy.mut_array2(),
        yy in Iyy.mut_array2(),
        &dx in Ix.ref_array2(),
        &dy in Iy.ref_array2(),
    ) {
        *xx = dx * dx;
        *xy = dx * dy;
        *yy = dy * dy;
    });
    let (A, B, C) = smooth_tensor(&Ixx, &Ixy, &Iyy);
    trace!("Structure tensor smoothing finished.");

    let mut response = GrayFloatImage::new(width, height);
    azip!((
        r in response.mut_array2(),
        &a in A.ref_array2(),
        &b in B.ref_array2(),
        &c in C.ref_array2(),
    ) {
        let det = a * c - b * b;
        let trace = a + c;
        *r = det - HARRIS_K * trace * trace;
    });
    let mut orientation = GrayFloatImage::new(width, height);
    azip!((
        angle in orientation.mut_array2(),
        &dx in Ix.ref_array2(),
        &dy in Iy.ref_array2(),
    ) {
        *angle = dy.atan2(dx).to_degrees();
    });
    debug!("Computed Harris response for a {}x{} image.", width, height);
    HarrisResponse {
        response,
        orientation,
    }
}
