use crate::{Error, Match};
use log::*;
use ndarray::{ArrayView1, ArrayView2};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// The closest and second closest train rows for one query row.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Neighbors {
    best_index: usize,
    best_distance: f64,
    /// `None` when the train set has a single row.
    second_distance: Option<f64>,
}

fn euclidean_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&a, &b)| (f64::from(a) - f64::from(b)).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Stream over the train rows keeping the two smallest distances.
///
/// Only a strictly smaller distance displaces the current best, so ties go to
/// the lowest train index.
fn two_nearest(query: ArrayView1<f32>, train: ArrayView2<f32>) -> Option<Neighbors> {
    let mut neighbors: Option<Neighbors> = None;
    for (index, row) in train.rows().into_iter().enumerate() {
        let distance = euclidean_distance(query, row);
        neighbors = Some(match neighbors {
            None => Neighbors {
                best_index: index,
                best_distance: distance,
                second_distance: None,
            },
            Some(n) if distance < n.best_distance => Neighbors {
                best_index: index,
                best_distance: distance,
                second_distance: Some(n.best_distance),
            },
            Some(n) if n.second_distance.map_or(true, |second| distance < second) => Neighbors {
                second_distance: Some(distance),
                ..n
            },
            Some(n) => n,
        });
    }
    neighbors
}

/// Validate both descriptor sets and find the neighbours of every query row.
///
/// Rows are processed independently, the output keeps query order.
fn nearest_neighbors(
    query: ArrayView2<f32>,
    train: ArrayView2<f32>,
) -> Result<Vec<(usize, Neighbors)>, Error> {
    if query.ncols() != train.ncols() {
        return Err(Error::DescriptorDimensionMismatch {
            query: query.ncols(),
            train: train.ncols(),
        });
    }
    if query.nrows() == 0 || train.nrows() == 0 {
        debug!(
            "Nothing to match between {} and {} descriptors.",
            query.nrows(),
            train.nrows()
        );
        return Ok(vec![]);
    }
    let search = |i: usize| two_nearest(query.row(i), train).map(|n| (i, n));
    #[cfg(not(feature = "rayon"))]
    let neighbors = (0..query.nrows()).filter_map(search).collect();
    #[cfg(feature = "rayon")]
    let neighbors = (0..query.nrows())
        .into_par_iter()
        .filter_map(search)
        .collect();
    Ok(neighbors)
}

/// Match every query descriptor to its nearest train descriptor.
///
/// The score is the Euclidean distance between the two descriptors. Several
/// query rows may match the same train row.
///
/// # Arguments
/// * `query` - descriptors of the first image, one per row.
/// * `train` - descriptors of the second image, one per row.
/// # Return value
/// One match per query row, in query order. Empty when either set is empty.
/// Fails when the descriptor lengths differ.
pub fn match_ssd(query: ArrayView2<f32>, train: ArrayView2<f32>) -> Result<Vec<Match>, Error> {
    let matches: Vec<Match> = nearest_neighbors(query, train)?
        .into_iter()
        .map(|(i, n)| Match::new(i, n.best_index, n.best_distance as f32))
        .collect();
    debug!("Found {} nearest neighbor matches.", matches.len());
    Ok(matches)
}

/// Match every query descriptor to its nearest train descriptor, scored by
/// the ratio of the nearest to the second nearest distance.
///
/// Lower scores are more distinctive. When the second nearest distance is zero,
/// or the train set has a single row, there is no meaningful ratio and the
/// score is 1. No threshold is applied here.
///
/// # Arguments
/// * `query` - descriptors of the first image, one per row.
/// * `train` - descriptors of the second image, one per row.
/// # Return value
/// One match per query row, in query order. Empty when either set is empty.
/// Fails when the descriptor lengths differ.
pub fn match_ratio(query: ArrayView2<f32>, train: ArrayView2<f32>) -> Result<Vec<Match>, Error> {
    let matches: Vec<Match> = nearest_neighbors(query, train)?
        .into_iter()
        .map(|(i, n)| {
            let score = match n.second_distance {
                Some(second) if second != 0.0 => (n.best_distance / second) as f32,
                _ => 1.0,
            };
            Match::new(i, n.best_index, score)
        })
        .collect();
    debug!("Found {} ratio test matches.", matches.len());
    Ok(matches)
}
