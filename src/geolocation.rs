use ndarray::Array3;
use rayon::prelude::*;

use crate::error::{ConvertError, Result};
use crate::model::AffineGeoref;

pub const LOCATION_BAND_NAMES: [&str; 2] = ["Easting", "Northing"];

/// Builds the `(lines, samples, 2)` location raster: band 0 easting,
/// band 1 northing.
pub fn location_grid(samples: usize, lines: usize, georef: &AffineGeoref) -> Result<Array3<f32>> {
    if samples == 0 || lines == 0 {
        return Err(ConvertError::InvalidGeometry(format!(
            "location grid needs positive dimensions (lines={}, samples={})",
            lines, samples
        )));
    }

    let eastings: Vec<f64> = (0..samples).map(|j| georef.easting(j)).collect();

    let mut values = vec![0f32; lines * samples * 2];
    values
        .par_chunks_mut(samples * 2)
        .enumerate()
        .for_each(|(line, row)| {
            let northing = georef.northing(line) as f32;
            for (pixel, easting) in row.chunks_exact_mut(2).zip(&eastings) {
                pixel[0] = *easting as f32;
                pixel[1] = northing;
            }
        });

    Array3::from_shape_vec((lines, samples, 2), values)
        .map_err(|e| ConvertError::InvalidGeometry(e.to_string()))
}
