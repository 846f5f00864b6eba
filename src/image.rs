use crate::Error;
use derive_more::{Deref, DerefMut};
use image::{DynamicImage, ImageBuffer, Luma};
use log::*;
use nalgebra::{Matrix2x3, Matrix3, Vector3};
use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use nshare::{MutNdarray2, RefNdarray2};
use std::f32;
use wide::f32x4;

type GrayImageBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// ITU-R BT.601 luma weights for red, green and blue.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// The Gaussian kernel is cut off this many standard deviations from its center.
pub const GAUSSIAN_TRUNCATE: f32 = 4.0;

/// The image type we use in this library.
///
/// A single channel of `f32` intensities stored row-major with the origin in
/// the top-left corner. `x` indexes columns and `y` indexes rows. Every field
/// derived from an image (Harris response, orientation) is another
/// `GrayFloatImage` of exactly the same size.
///
/// The buffer is the image crate's `ImageBuffer` so that loading and saving
/// stay with the image crate, while filters work directly on the raw slice
/// and per-pixel combinations go through `ndarray` views.
#[derive(Debug, Clone, PartialEq, Deref, DerefMut)]
pub struct GrayFloatImage(pub GrayImageBuffer);

impl GrayFloatImage {
    /// Create a unit float image from the image crate's DynamicImage type.
    ///
    /// Color channels are read in the image crate's RGB order and collapsed
    /// with [`LUMA_WEIGHTS`]. Integer formats are scaled so that the full
    /// range of the format maps onto `[0, 1]`.
    ///
    /// # Arguments
    /// * `input_image` - the input image.
    /// # Return value
    /// An image with pixel values between 0 and 1.
    pub fn from_dynamic(input_image: &DynamicImage) -> Self {
        info!(
            "Loaded a {} x {} image ({:?})",
            input_image.width(),
            input_image.height(),
            input_image.color()
        );
        let rgb = input_image.to_rgb32f();
        Self(ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
            let [r, g, b] = rgb[(x, y)].0;
            Luma([LUMA_WEIGHTS[0] * r + LUMA_WEIGHTS[1] * g + LUMA_WEIGHTS[2] * b])
        }))
    }

    /// Wrap a row-major buffer of intensities.
    pub fn from_raw(width: usize, height: usize, data: Vec<f32>) -> Result<Self, Error> {
        let expected = width * height;
        let actual = data.len();
        if actual != expected {
            return Err(Error::BufferSize { expected, actual });
        }
        ImageBuffer::from_raw(width as u32, height as u32, data)
            .map(Self)
            .ok_or(Error::BufferSize { expected, actual })
    }

    pub fn from_array2(arr: Array2<f32>) -> Self {
        let (height, width) = arr.dim();
        let data = if arr.is_standard_layout() {
            arr.into_raw_vec()
        } else {
            arr.iter().copied().collect()
        };
        Self(
            ImageBuffer::from_raw(width as u32, height as u32, data)
                .expect("raw vector didn't have enough pixels for the image"),
        )
    }

    pub fn ref_array2(&self) -> ArrayView2<f32> {
        self.0.ref_ndarray2()
    }

    pub fn mut_array2(&mut self) -> ArrayViewMut2<f32> {
        self.0.mut_ndarray2()
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    pub fn new(width: usize, height: usize) -> Self {
        Self(ImageBuffer::from_pixel(
            width as u32,
            height as u32,
            Luma([0.0]),
        ))
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.get_pixel(x as u32, y as u32)[0]
    }

    /// Intensity at a signed position, zero outside the image.
    pub fn get_or_zero(&self, x: isize, y: isize) -> f32 {
        if (0..self.width() as isize).contains(&x) && (0..self.height() as isize).contains(&y) {
            self.get(x as usize, y as usize)
        } else {
            0.0
        }
    }

    pub fn put(&mut self, x: usize, y: usize, pixel_value: f32) {
        self.put_pixel(x as u32, y as u32, Luma([pixel_value]));
    }
}

/// Mirror an index into `0..len` about the outer edge of the border pixel,
/// so that a row `a b c d` is extended as `d c b a | a b c d | d c b a`.
fn reflect_index(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let i = index.rem_euclid(period);
    (if i < len { i } else { period - 1 - i }) as usize
}

/// Fill `scratch` with `len` samples padded by `half` reflected samples on each
/// side. Anything past that is zeroed, it only ever meets zero kernel taps.
fn fill_reflected(scratch: &mut [f32], len: usize, half: usize, sample: impl Fn(usize) -> f32) {
    let padded = len + 2 * half;
    for (i, value) in scratch[..padded].iter_mut().enumerate() {
        *value = sample(reflect_index(i as isize - half as isize, len));
    }
    scratch[padded..].fill(0.);
}

/// Split a kernel into SIMD lanes, padded with 0.
fn simd_kernel(kernel: &[f32]) -> Vec<f32x4> {
    kernel
        .chunks(4)
        .map(|chunk| {
            let mut data = [0f32; 4];
            data[..chunk.len()].copy_from_slice(chunk);
            f32x4::new(data)
        })
        .collect()
}

fn correlate_window(window: &[f32], kernel_simd: &[f32x4]) -> f32 {
    window
        .chunks_exact(4)
        .map(|chunk| f32x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .zip(kernel_simd.iter())
        .fold(f32x4::splat(0.), |acc, (a, b)| a.mul_add(*b, acc))
        .reduce_add()
}

/// Correlate every row with `kernel`, reflecting at the left and right borders.
pub fn horizontal_filter(image: &GrayImageBuffer, kernel: &[f32]) -> GrayImageBuffer {
    // Validate kernel size.
    let kernel_size = kernel.len();
    debug_assert!(kernel_size % 2 == 1);
    let kernel_half_size = kernel_size / 2;
    // Prepare output.
    let width = image.width() as usize;
    let height = image.height() as usize;
    if width == 0 || height == 0 {
        return image.clone();
    }
    let mut output = vec![0.0; width * height];
    let kernel_simd = simd_kernel(kernel);
    let kernel_simd_size = 4 * kernel_simd.len();
    let kernel_simd_extra_elements = kernel_simd_size - kernel_size;
    // Process each row independently.
    let row_in_it = image.as_raw().chunks_exact(width);
    let row_out_it = output.chunks_exact_mut(width);
    let mut scratch = vec![0f32; width + kernel_half_size * 2 + kernel_simd_extra_elements];
    for (row_in, row_out) in row_in_it.zip(row_out_it) {
        fill_reflected(&mut scratch, width, kernel_half_size, |x| row_in[x]);
        scratch
            .windows(kernel_simd_size)
            .zip(row_out)
            .for_each(|(window, output)| *output = correlate_window(window, &kernel_simd));
    }
    GrayImageBuffer::from_raw(width as u32, height as u32, output)
        .expect("filter output has the input dimensions")
}

/// Correlate every column with `kernel`, reflecting at the top and bottom borders.
pub fn vertical_filter(image: &GrayImageBuffer, kernel: &[f32]) -> GrayImageBuffer {
    // Validate kernel size.
    let kernel_size = kernel.len();
    debug_assert!(kernel_size % 2 == 1);
    let kernel_half_size = kernel_size / 2;
    // Prepare output.
    let width = image.width() as usize;
    let height = image.height() as usize;
    if width == 0 || height == 0 {
        return image.clone();
    }
    let mut output = vec![0.0; width * height];
    let kernel_simd = simd_kernel(kernel);
    let kernel_simd_size = 4 * kernel_simd.len();
    let kernel_simd_extra_elements = kernel_simd_size - kernel_size;
    // We use a scratch buffer of L1 cache width (64 bytes) to optimize memory access.
    const SCRATCH_WIDTH: usize = 16;
    let scratch_height = height + kernel_half_size * 2 + kernel_simd_extra_elements;
    let mut scratch = vec![0f32; SCRATCH_WIDTH * scratch_height];
    let image = image.as_raw();
    for x_s in (0..width).step_by(SCRATCH_WIDTH) {
        // Gather a block of columns, each one padded by reflection.
        let x_e: usize = (x_s + SCRATCH_WIDTH).min(width);
        for x in x_s..x_e {
            let column_start = (x - x_s) * scratch_height;
            fill_reflected(
                &mut scratch[column_start..column_start + scratch_height],
                height,
                kernel_half_size,
                |y| image[y * width + x],
            );
        }
        // Apply kernel.
        scratch
            .chunks(scratch_height)
            .take(x_e - x_s)
            .enumerate()
            .for_each(|(dx, col)| {
                let x = x_s + dx;
                col.windows(kernel_simd_size)
                    .enumerate()
                    .for_each(|(y, window)| {
                        output[y * width + x] = correlate_window(window, &kernel_simd);
                    });
            });
    }
    GrayImageBuffer::from_raw(width as u32, height as u32, output)
        .expect("filter output has the input dimensions")
}

pub fn separable_filter(
    image: &GrayImageBuffer,
    h_kernel: &[f32],
    v_kernel: &[f32],
) -> GrayImageBuffer {
    let h = horizontal_filter(image, h_kernel);
    vertical_filter(&h, v_kernel)
}

/// The Gaussian function.
///
/// # Arguments
/// * `x` - the offset.
/// * `r` - sigma.
/// # Return value
/// The kernel value at x.
fn gaussian(x: f32, r: f32) -> f32 {
    ((2.0 * f32::consts::PI).sqrt() * r).recip() * (-x.powi(2) / (2.0 * r.powi(2))).exp()
}

/// Generate a Gaussian kernel.
///
/// # Arguments
/// * `r` - sigma.
/// * `kernel_size` - The size of the kernel.
/// # Return value
/// The kernel (a vector), normalized to sum to one.
pub fn gaussian_kernel(r: f32, kernel_size: usize) -> Vec<f32> {
    assert!(kernel_size % 2 == 1, "kernel_size must be odd");
    let mut kernel = vec![0f32; kernel_size];
    let half_width = (kernel_size / 2) as i32;
    let mut sum = 0f32;
    for i in -half_width..=half_width {
        let val = gaussian(i as f32, r);
        kernel[(i + half_width) as usize] = val;
        sum += val;
    }
    for val in kernel.iter_mut() {
        *val /= sum;
    }
    kernel
}

/// Radius of the Gaussian kernel used for a given sigma.
pub fn gaussian_kernel_radius(r: f32) -> usize {
    (GAUSSIAN_TRUNCATE * r + 0.5) as usize
}

/// Perform Gaussian blur on an image.
///
/// The kernel is truncated at [`GAUSSIAN_TRUNCATE`] standard deviations and
/// borders are reflected.
///
/// # Arguments
/// * `r` - sigma.
/// # Return value
/// The resulting image after the filter was applied.
pub fn gaussian_blur(image: &GrayFloatImage, r: f32) -> GrayFloatImage {
    assert!(r > 0.0, "sigma must be > 0.0");
    let kernel_size = gaussian_kernel_radius(r) * 2 + 1;
    let kernel = gaussian_kernel(r, kernel_size);
    GrayFloatImage(separable_filter(image, &kernel, &kernel))
}

/// Bilinear sample at a sub-pixel position.
///
/// Each of the four neighbours that falls outside the image contributes zero
/// intensity, so samples fade to black across the border.
pub fn bilinear_sample(image: &GrayFloatImage, x: f32, y: f32) -> f32 {
    if !x.is_finite() || !y.is_finite() {
        return 0.0;
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as isize, y0 as isize);
    // Lerp form keeps constant regions exactly constant.
    let lerp = |a: f32, b: f32, t: f32| a + t * (b - a);
    let top = lerp(image.get_or_zero(x0, y0), image.get_or_zero(x0 + 1, y0), fx);
    let bottom = lerp(
        image.get_or_zero(x0, y0 + 1),
        image.get_or_zero(x0 + 1, y0 + 1),
        fx,
    );
    lerp(top, bottom, fy)
}

/// Resample `image` through a forward affine transform.
///
/// `transform` maps source coordinates to output coordinates, so output pixel
/// `(u, v)` takes the bilinear sample of the source at `transform⁻¹ (u, v)`.
/// Source positions outside the image read as zero.
///
/// # Arguments
/// * `image` - the source image.
/// * `transform` - 2x3 affine matrix from source to output pixels.
/// * `width`, `height` - size of the output image.
pub fn warp_affine(
    image: &GrayFloatImage,
    transform: &Matrix2x3<f32>,
    width: usize,
    height: usize,
) -> Result<GrayFloatImage, Error> {
    let t = transform;
    let inverse = Matrix3::new(
        t[(0, 0)],
        t[(0, 1)],
        t[(0, 2)],
        t[(1, 0)],
        t[(1, 1)],
        t[(1, 2)],
        0.0,
        0.0,
        1.0,
    )
    .try_inverse()
    .ok_or(Error::SingularTransform)?;
    let output = Array2::from_shape_fn((height, width), |(v, u)| {
        let source = inverse * Vector3::new(u as f32, v as f32, 1.0);
        bilinear_sample(image, source.x, source.y)
    });
    Ok(GrayFloatImage::from_array2(output))
}
