/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines shared helpers for random point generation, noisy samples, grids, and CSV I/O.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::kdtree::KDTree;
use csv::{ReaderBuilder, Writer};
use faer::{Mat, MatRef};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, NormalError};
use std::error::Error;
use std::fs::File;

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Generate a matrix of random points in the unit hypercube.
///
/// # Parameters
/// - `n`: Number of points to generate (rows in the output matrix).
/// - `d`: Number of spatial dimensions per point (columns in the output matrix).
/// - `seed`: Optional random seed. `None` seeds from the operating system.
///
/// # Example
/// ```
/// use rbf_fd::generate_random_points;
///
/// let pts = generate_random_points(100, 2, Some(42));
/// assert_eq!(pts.ncols(), 2);
/// ```
pub fn generate_random_points(n: usize, d: usize, seed: Option<u64>) -> Mat<f64> {
    let mut rng = seeded_rng(seed);
    Mat::from_fn(n, d, |_, _| rng.random_range(0.0..1.0))
}

/// Generate `n` points whose coordinates are independently normal with the
/// given `mean` and standard deviation `std`.
///
/// Fails when `std` is not finite.
pub fn generate_normal_points(
    n: usize,
    d: usize,
    mean: f64,
    std: f64,
    seed: Option<u64>,
) -> Result<Mat<f64>, NormalError> {
    let mut rng = seeded_rng(seed);
    let normal = Normal::new(mean, std)?;
    Ok(Mat::from_fn(n, d, |_, _| normal.sample(&mut rng)))
}

/// Returns `values` with independent `N(0, sigma^2)` noise added.
///
/// Fails when `sigma` is not finite.
pub fn add_gaussian_noise(values: &[f64], sigma: f64, seed: Option<u64>) -> Result<Vec<f64>, NormalError> {
    let mut rng = seeded_rng(seed);
    let normal = Normal::new(0.0, sigma)?;
    Ok(values.iter().map(|v| v + normal.sample(&mut rng)).collect())
}

/// Create a regular evaluation grid from per-dimension ranges and sample counts.
///
/// # Arguments
/// * `ranges` - Inclusive `(min, max)` range for each dimension.
/// * `counts` - Number of grid samples per range; must match `ranges.len()`.
///
/// # Returns
/// A `Mat<f64>` with one row per grid point and one column per dimension.
/// The first dimension varies fastest.
pub fn create_evaluation_grid(ranges: &[(f64, f64)], counts: &[usize]) -> Mat<f64> {
    assert_eq!(ranges.len(), counts.len());

    let total_points: usize = counts.iter().product();

    Mat::from_fn(total_points, ranges.len(), |row_idx, col_idx| {
        let dim_points = counts[col_idx];
        let (start, end) = ranges[col_idx];
        let step = match dim_points > 1 {
            true => (end - start) / (dim_points as f64 - 1.0),
            false => 0.0,
        };

        let stride = counts[..col_idx].iter().product::<usize>();
        let index_in_dim = (row_idx / stride) % dim_points;
        start + step * index_in_dim as f64
    })
}

/// Resample scattered values at `queries` by nearest neighbour.
///
/// Used to rasterise scattered fields for plotting.
pub fn nearest_neighbour_sample(points: &Mat<f64>, values: &[f64], queries: &Mat<f64>) -> Vec<f64> {
    assert_eq!(points.nrows(), values.len(), "Points and values must have same length.");
    let tree = KDTree::new(points);
    let (ids, _) = tree.k_nearest_neighbors_batch(queries, 1);
    (0..queries.nrows()).map(|i| values[*ids.get(i, 0)]).collect()
}

/// Load a CSV file into separate point and value matrices.
///
/// The last column is treated as the scalar value, and all preceding
/// columns form the point coordinates.
pub fn csv_to_point_arrays(
    file_path: &str,
    has_headers: bool,
) -> Result<(Mat<f64>, Mat<f64>), Box<dyn Error>> {
    let file = File::open(file_path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(has_headers)
        .from_reader(file);

    let mut data = Vec::new();
    let mut last_column = Vec::new();
    let mut num_rows = 0;
    let mut num_cols = 0;

    for result in reader.records() {
        let record = result?;
        if num_cols == 0 {
            num_cols = record.len();
        } else if record.len() != num_cols {
            return Err("Inconsistent number of columns in CSV".into());
        }

        for (i, value) in record.iter().enumerate() {
            let parsed_value: f64 = value.trim().parse()?;
            if i == num_cols - 1 {
                last_column.push(parsed_value);
            } else {
                data.push(parsed_value);
            }
        }

        num_rows += 1;
    }

    if num_cols == 0 {
        return Err("CSV file contains no records".into());
    }

    let points = MatRef::from_row_major_slice(data.as_slice(), num_rows, num_cols - 1).to_owned();
    let values = MatRef::from_row_major_slice(last_column.as_slice(), num_rows, 1).to_owned();

    Ok((points, values))
}

/// Write point coordinates and one value column to a CSV file.
///
/// Headers are `X, Y[, Z], <value_name>`.
pub fn point_arrays_to_csv(
    points: &Mat<f64>,
    values: &[f64],
    value_name: &str,
    filename: &str,
) -> Result<(), Box<dyn Error>> {
    let num_points = points.nrows();
    assert_eq!(num_points, values.len(), "Points and values must have same length.");

    let mut wtr = Writer::from_path(filename)?;

    let mut headers: Vec<&str> = ["X", "Y", "Z"].into_iter().take(points.ncols()).collect();
    headers.push(value_name);
    wtr.write_record(&headers)?;

    for i in 0..num_points {
        let mut record: Vec<String> = points.row(i).iter().map(|c| c.to_string()).collect();
        record.push(values[i].to_string());
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
