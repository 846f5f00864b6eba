use crate::{Error, KeyPoint, Match};
use nalgebra::{Matrix3, Vector3};

/// Map a point through a 3x3 homography, including the projective divide.
pub fn apply_homography(point: (f32, f32), homography: &Matrix3<f32>) -> (f32, f32) {
    let p = homography * Vector3::new(point.0, point.1, 1.0);
    (p.x / p.z, p.y / p.z)
}

fn lookup(keypoints: &[KeyPoint], index: usize) -> Result<&KeyPoint, Error> {
    keypoints.get(index).ok_or(Error::MatchOutOfRange {
        index,
        len: keypoints.len(),
    })
}

/// Average pixel error of a set of matches against a known homography.
///
/// For every match the query keypoint is projected into the second image with
/// `homography` and compared with the position of the train keypoint.
///
/// # Return value
/// The mean Euclidean distance, or 0 when there are no matches. Fails when a
/// match refers past the end of either keypoint list.
pub fn evaluate_matches(
    keypoints1: &[KeyPoint],
    keypoints2: &[KeyPoint],
    matches: &[Match],
    homography: &Matrix3<f32>,
) -> Result<f32, Error> {
    if matches.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0f64;
    for m in matches {
        let projected = apply_homography(lookup(keypoints1, m.query_index)?.point, homography);
        let observed = lookup(keypoints2, m.train_index)?.point;
        total += f64::from(projected.0 - observed.0).hypot(f64::from(projected.1 - observed.1));
    }
    Ok((total / matches.len() as f64) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoints::KEYPOINT_SIZE;

    fn at(x: f32, y: f32) -> KeyPoint {
        KeyPoint {
            point: (x, y),
            response: 1.0,
            size: KEYPOINT_SIZE,
            angle: 0.0,
        }
    }

    #[test]
    fn homography_divides_by_w() {
        let h = Matrix3::new(2.0, 0.0, 1.0, 0.0, 2.0, -1.0, 0.0, 0.0, 2.0);
        assert_eq!(apply_homography((3.0, 4.0), &h), (3.5, 3.5));
    }

    #[test]
    fn perfect_matches_have_zero_error() {
        let shift = Matrix3::new(1.0, 0.0, 5.0, 0.0, 1.0, -2.0, 0.0, 0.0, 1.0);
        let kps1 = vec![at(0.0, 0.0), at(10.0, 10.0)];
        let kps2 = vec![at(15.0, 8.0), at(5.0, -2.0)];
        let matches = vec![Match::new(0, 1, 0.1), Match::new(1, 0, 0.2)];
        assert_eq!(evaluate_matches(&kps1, &kps2, &matches, &shift), Ok(0.0));
    }

    #[test]
    fn error_is_averaged_over_matches() {
        let identity = Matrix3::identity();
        let kps1 = vec![at(0.0, 0.0), at(1.0, 1.0)];
        let kps2 = vec![at(3.0, 4.0), at(1.0, 1.0)];
        let matches = vec![Match::new(0, 0, 0.0), Match::new(1, 1, 0.0)];
        assert_eq!(evaluate_matches(&kps1, &kps2, &matches, &identity), Ok(2.5));
        assert_eq!(evaluate_matches(&kps1, &kps2, &[], &identity), Ok(0.0));
    }

    #[test]
    fn out_of_range_match_is_an_error() {
        let kps = vec![at(0.0, 0.0)];
        let matches = vec![Match::new(0, 3, 0.0)];
        assert_eq!(
            evaluate_matches(&kps, &kps, &matches, &Matrix3::identity()),
            Err(Error::MatchOutOfRange { index: 3, len: 1 })
        );
    }
}
