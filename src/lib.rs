//! Harris corners, MOPS descriptors and nearest-neighbor matching.
//!
//! The pipeline is: grayscale image → Harris response → 7x7 local maxima →
//! keypoints → descriptors → matches. Every stage is a plain function exposed
//! from its module, and [`Mops`] runs them end to end.

pub mod derivatives;
pub mod descriptors;
pub mod detector_response;
pub mod evaluation;
pub mod image;
pub mod keypoints;
pub mod local_maxima;
pub mod matching;

use crate::descriptors::{mops_descriptors, simple_descriptors, DescriptorMatrix};
use crate::image::GrayFloatImage;
use crate::keypoints::detect_keypoints;
use crate::matching::{match_ratio, match_ssd};
use ::image::{DynamicImage, ImageResult};
use derive_more::Constructor;
use log::*;
use ndarray::ArrayView2;
use std::path::Path;

pub use crate::evaluation::{apply_homography, evaluate_matches};

/// A point of interest in an image.
/// This pretty much follows from OpenCV conventions.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyPoint {
    /// Pixel position `(x, y)`: `x` is the column and `y` the row, with the
    /// origin at the top-left corner of the image.
    pub point: (f32, f32),
    /// The Harris response at the keypoint.
    pub response: f32,

    /// The diameter of the described neighbourhood, always
    /// [`keypoints::KEYPOINT_SIZE`] for Harris keypoints.
    pub size: f32,

    /// The gradient orientation in degrees.
    pub angle: f32,
}

/// A correspondence between a descriptor of the first image (the query) and
/// one of the second image (the train set).
#[derive(Debug, Clone, Copy, PartialEq, Constructor)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Match {
    /// Row of the query descriptor matrix.
    pub query_index: usize,
    /// Row of the train descriptor matrix.
    pub train_index: usize,
    /// Distance for best-match matching, distance ratio for the ratio test.
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("descriptors have {query} columns in the query set but {train} in the train set")]
    DescriptorDimensionMismatch { query: usize, train: usize },
    #[error("buffer has {actual} samples but the image needs {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("affine transform is not invertible")]
    SingularTransform,
    #[error("match refers to keypoint {index} of {len}")]
    MatchOutOfRange { index: usize, len: usize },
}

/// The descriptor computed for each keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DescriptorKind {
    /// 5x5 window of raw intensities (25 values).
    Simple,
    /// Rotated, normalized 8x8 patch sampled from a 40x40 neighbourhood (64 values).
    #[default]
    Mops,
}

/// How descriptors of two images are paired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MatcherKind {
    /// Nearest neighbor, scored by Euclidean distance.
    Ssd,
    /// Nearest neighbor, scored by the nearest to second nearest distance ratio.
    #[default]
    Ratio,
}

/// Contains the configuration of the feature pipeline.
///
/// The numerical constants of each stage are fixed (see the constants in
/// [`detector_response`], [`local_maxima`], [`keypoints`] and [`descriptors`]).
/// What can be chosen is the descriptor, the matcher, and an optional upper
/// bound on match scores that [`Mops::match_features`] applies after matching.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mops {
    /// Descriptor computed by [`Mops::describe`].
    pub descriptor: DescriptorKind,

    /// Matcher used by [`Mops::match_features`].
    pub matcher: MatcherKind,

    /// Matches scoring above this are dropped by [`Mops::match_features`].
    pub max_match_score: Option<f32>,
}

impl Mops {
    pub fn new(descriptor: DescriptorKind, matcher: MatcherKind) -> Self {
        Self {
            descriptor,
            matcher,
            max_match_score: None,
        }
    }

    /// Simple descriptors with best-match matching.
    pub fn simple() -> Self {
        Self::new(DescriptorKind::Simple, MatcherKind::Ssd)
    }

    /// MOPS descriptors with the ratio test, keeping matches with a ratio of
    /// at most `max_ratio`.
    pub fn ratio(max_ratio: f32) -> Self {
        Self {
            max_match_score: Some(max_ratio),
            ..Self::new(DescriptorKind::Mops, MatcherKind::Ratio)
        }
    }

    /// Length of the descriptors this configuration produces.
    pub fn descriptor_size(&self) -> usize {
        match self.descriptor {
            DescriptorKind::Simple => descriptors::SIMPLE_DESCRIPTOR_SIZE,
            DescriptorKind::Mops => descriptors::MOPS_DESCRIPTOR_SIZE,
        }
    }

    /// Find Harris keypoints, in row-major order.
    pub fn detect(&self, image: &GrayFloatImage) -> Vec<KeyPoint> {
        detect_keypoints(image)
    }

    /// Describe keypoints with the configured descriptor.
    ///
    /// Row `i` of the result describes `keypoints[i]`.
    pub fn describe(&self, image: &GrayFloatImage, keypoints: &[KeyPoint]) -> DescriptorMatrix {
        match self.descriptor {
            DescriptorKind::Simple => simple_descriptors(image, keypoints),
            DescriptorKind::Mops => mops_descriptors(image, keypoints),
        }
    }

    /// Detect and describe features in a grayscale float image.
    pub fn extract_from_gray_float_image(
        &self,
        image: &GrayFloatImage,
    ) -> (Vec<KeyPoint>, DescriptorMatrix) {
        trace!("Detecting keypoints.");
        let keypoints = self.detect(image);
        trace!("Extracting descriptors.");
        let descriptors = self.describe(image, &keypoints);
        trace!("Computing descriptors finished.");
        info!("Extracted {} features", keypoints.len());
        (keypoints, descriptors)
    }

    /// Extract features end to end.
    ///
    /// # Arguments
    /// * `image` - The input image for which to extract features.
    ///
    /// Returns the keypoints and the descriptors.
    ///
    /// # Example
    /// ```
    /// let image = image::DynamicImage::new_rgb8(32, 32);
    /// let (keypoints, descriptors) = mops::Mops::default().extract(&image);
    /// assert_eq!(descriptors.nrows(), keypoints.len());
    /// assert_eq!(descriptors.ncols(), 64);
    /// ```
    pub fn extract(&self, image: &DynamicImage) -> (Vec<KeyPoint>, DescriptorMatrix) {
        let float_image = GrayFloatImage::from_dynamic(image);
        self.extract_from_gray_float_image(&float_image)
    }

    /// Extract features from an image on disk.
    ///
    /// Returns an `ImageResult` of the keypoints and the descriptors.
    pub fn extract_path(
        &self,
        path: impl AsRef<Path>,
    ) -> ImageResult<(Vec<KeyPoint>, DescriptorMatrix)> {
        Ok(self.extract(&::image::open(path)?))
    }

    /// Match two descriptor sets with the configured matcher.
    ///
    /// When `max_match_score` is set, matches scoring above it are dropped;
    /// the remaining matches keep query order.
    pub fn match_features(
        &self,
        query: ArrayView2<f32>,
        train: ArrayView2<f32>,
    ) -> Result<Vec<Match>, Error> {
        let matches = match self.matcher {
            MatcherKind::Ssd => match_ssd(query, train)?,
            MatcherKind::Ratio => match_ratio(query, train)?,
        };
        Ok(match self.max_match_score {
            Some(max_score) => {
                let total = matches.len();
                let kept: Vec<Match> = matches
                    .into_iter()
                    .filter(|m| m.score <= max_score)
                    .collect();
                debug!("{}/{} matches have a score of at most {}.", kept.len(), total, max_score);
                kept
            }
            None => matches,
        })
    }
}
