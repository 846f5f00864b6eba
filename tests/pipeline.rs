use log::*;
use mops::image::GrayFloatImage;
use mops::{evaluate_matches, KeyPoint, Match, Mops};
use nalgebra::Matrix3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

const SIDE: usize = 128;
const BLOCK: usize = 8;
const SHIFT: (usize, usize) = (5, 3);
/// Keypoints closer than this to the border see the border in their patch.
const MARGIN: f32 = 40.0;
const MIN_RESPONSE: f32 = 0.01;

/// A mosaic of flat blocks with random intensities.
fn mosaic(seed: u8) -> GrayFloatImage {
    let mut rng = Pcg64::from_seed([seed; 32]);
    let blocks = SIDE / BLOCK;
    let levels: Vec<f32> = (0..blocks * blocks).map(|_| rng.gen()).collect();
    let mut image = GrayFloatImage::new(SIDE, SIDE);
    for y in 0..SIDE {
        for x in 0..SIDE {
            image.put(x, y, levels[(y / BLOCK) * blocks + x / BLOCK]);
        }
    }
    image
}

/// Move the content right and down, filling the uncovered border with zeros.
fn shifted(image: &GrayFloatImage, (dx, dy): (usize, usize)) -> GrayFloatImage {
    let mut out = GrayFloatImage::new(image.width(), image.height());
    for y in dy..image.height() {
        for x in dx..image.width() {
            out.put(x, y, image.get(x - dx, y - dy));
        }
    }
    out
}

fn strong(keypoints: Vec<KeyPoint>) -> Vec<KeyPoint> {
    keypoints
        .into_iter()
        .filter(|kp| kp.response > MIN_RESPONSE)
        .collect()
}

#[test]
fn shifted_mosaic_matches_back() {
    let _ = pretty_env_logger::try_init_timed();
    let config = Mops::ratio(0.8);
    let image1 = mosaic(7);
    let image2 = shifted(&image1, SHIFT);

    let far = SIDE as f32 - MARGIN - SHIFT.0.max(SHIFT.1) as f32;
    let kps1: Vec<KeyPoint> = strong(config.detect(&image1))
        .into_iter()
        .filter(|kp| {
            let (x, y) = kp.point;
            x >= MARGIN && y >= MARGIN && x < far && y < far
        })
        .collect();
    let kps2 = strong(config.detect(&image2));
    info!("{} query and {} train keypoints", kps1.len(), kps2.len());
    assert!(kps1.len() >= 10);

    let ds1 = config.describe(&image1, &kps1);
    let ds2 = config.describe(&image2, &kps2);
    let matches: Vec<Match> = config.match_features(ds1.view(), ds2.view()).unwrap();
    info!("{} matches pass the ratio test", matches.len());
    assert!(matches.len() * 10 >= kps1.len() * 9);

    let translation = Matrix3::new(
        1.0,
        0.0,
        SHIFT.0 as f32,
        0.0,
        1.0,
        SHIFT.1 as f32,
        0.0,
        0.0,
        1.0,
    );
    let error = evaluate_matches(&kps1, &kps2, &matches, &translation).unwrap();
    assert!(error < 1e-3, "average error {}", error);
}

#[test]
fn quarter_turn_preserves_descriptor() {
    let _ = pretty_env_logger::try_init_timed();
    let mut rng = Pcg64::from_seed([11; 32]);
    let side = 96;
    let data = (0..side * side).map(|_| rng.gen::<f32>()).collect();
    let image = GrayFloatImage::from_raw(side, side, data).unwrap();
    // (x, y) moves to (side - 1 - y, x), which turns directions by +90 degrees.
    let mut turned = GrayFloatImage::new(side, side);
    for y in 0..side {
        for x in 0..side {
            turned.put(side - 1 - y, x, image.get(x, y));
        }
    }
    let keypoint = KeyPoint {
        point: (40.0, 50.0),
        response: 1.0,
        size: 10.0,
        angle: 30.0,
    };
    let turned_keypoint = KeyPoint {
        point: ((side - 1) as f32 - 50.0, 40.0),
        angle: 120.0,
        ..keypoint
    };
    let config = Mops::default();
    let before = config.describe(&image, &[keypoint]);
    let after = config.describe(&turned, &[turned_keypoint]);
    for (a, b) in before.iter().zip(after.iter()) {
        assert!((a - b).abs() < 1e-3, "{} != {}", a, b);
    }
}

#[test]
fn extract_from_dynamic_image() {
    let _ = pretty_env_logger::try_init_timed();
    let checkerboard = image::GrayImage::from_fn(48, 40, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    });
    let (keypoints, descriptors) =
        Mops::default().extract(&image::DynamicImage::ImageLuma8(checkerboard));
    assert_eq!(descriptors.dim(), (keypoints.len(), 64));
    assert!(!keypoints.is_empty());
    // Row-major order.
    assert!(keypoints.windows(2).all(|pair| {
        let (a, b) = (pair[0].point, pair[1].point);
        (a.1, a.0) < (b.1, b.0)
    }));
    assert!(keypoints.iter().all(|kp| kp.size == 10.0));
    // Every block corner is a positive maximum.
    let corners = keypoints.iter().filter(|kp| kp.response > 0.1).count();
    assert!(corners >= 9, "{} corners", corners);
}
