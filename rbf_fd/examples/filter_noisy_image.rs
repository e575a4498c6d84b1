use rbf_fd::{
    add_gaussian_noise, config::FilterParams, create_evaluation_grid, generate_normal_points,
    nearest_neighbour_sample, point_arrays_to_csv, RBFTestFunctions, SpectralFilter,
};
use std::{fs, path::Path};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Scattered points concentrated about the centre of the image
    let num_points = 100_000;
    let points = generate_normal_points(num_points, 2, 0.5, 0.3, Some(4))?;

    // Sample the synthetic image and add N(0, 0.2^2) noise
    let clean = RBFTestFunctions::synthetic_image(&points);
    let noisy = add_gaussian_noise(&clean, 0.2, Some(5))?;

    // Keep features with frequencies below 60 cycles per unit length
    let params = FilterParams::builder(60.0).n(20).samples(0).build();
    let result = SpectralFilter::builder(&points, &noisy, params).build().apply()?;

    let out = Path::new("figures");
    fs::create_dir_all(out)?;
    point_arrays_to_csv(&points, &noisy, "noisy", "figures/filter_noisy.csv")?;
    point_arrays_to_csv(&points, &result.smoothed, "filtered", "figures/filter_smoothed.csv")?;

    // Nearest neighbour raster of the filtered field over the unit square
    let grid = create_evaluation_grid(&[(0.0, 1.0), (0.0, 1.0)], &[256, 256]);
    let raster = nearest_neighbour_sample(&points, &result.smoothed, &grid);
    point_arrays_to_csv(&grid, &raster, "filtered", "figures/filter_raster.csv")?;

    Ok(())
}
