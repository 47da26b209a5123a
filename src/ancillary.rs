use ndarray::{s, Array3, ArrayView3, Axis};

use crate::error::{ConvertError, Result};
use crate::model::FillPolicy;

/// One output band of the observation raster and where it comes from in
/// `OBS_Data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationBand {
    pub name: &'static str,
    pub source_index: usize,
}

/// Output bands in order. Source layout of `OBS_Data`:
/// 0 path length, 1 sensor azimuth, 2 sensor zenith, 3 solar zenith,
/// 4-6 unused here, 7 solar azimuth, 8 cosine of incidence.
pub const OBSERVATION_BANDS: [ObservationBand; 6] = [
    ObservationBand {
        name: "Sensor Zenith",
        source_index: 2,
    },
    ObservationBand {
        name: "Sensor Azimuth",
        source_index: 1,
    },
    ObservationBand {
        name: "Solar Zenith",
        source_index: 3,
    },
    ObservationBand {
        name: "Solar Azimuth",
        source_index: 7,
    },
    ObservationBand {
        name: "Path Length",
        source_index: 0,
    },
    ObservationBand {
        name: "Cosine i",
        source_index: 8,
    },
];

pub fn observation_band_names() -> impl Iterator<Item = &'static str> {
    OBSERVATION_BANDS.iter().map(|band| band.name)
}

/// Minimum band count of a source raster the table can be applied to.
pub fn required_source_bands() -> usize {
    OBSERVATION_BANDS
        .iter()
        .map(|band| band.source_index + 1)
        .max()
        .unwrap_or(0)
}

/// Selects the six observation bands from a `(lines, samples, n)` raster and
/// applies `fill` to sentinel pixels. Any line range of the raster works, so
/// callers may stream it.
pub fn select_observation_bands(
    observation: ArrayView3<'_, f32>,
    fill: FillPolicy,
) -> Result<Array3<f32>> {
    let (lines, samples, available) = observation.dim();
    let required = required_source_bands();
    if available < required {
        return Err(ConvertError::InvalidGeometry(format!(
            "observation raster has {} bands, at least {} are required",
            available, required
        )));
    }

    let mut selected = Array3::<f32>::zeros((lines, samples, OBSERVATION_BANDS.len()));
    for (out_index, band) in OBSERVATION_BANDS.iter().enumerate() {
        let source = observation.index_axis(Axis(2), band.source_index);
        selected
            .slice_mut(s![.., .., out_index])
            .zip_mut_with(&source, |out, &value| *out = fill.apply(value));
    }

    Ok(selected)
}
