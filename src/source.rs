//! Read-only access to a NEON AOP radiance HDF5 file.
//!
//! Layout under the site group (e.g. `R10C`):
//!
//! ```text
//! Radiance/RadianceIntegerPart          (lines, samples, bands)
//! Radiance/RadianceDecimalPart          (lines, samples, bands)
//! Radiance/Metadata/Coordinate_System/Map_Info
//! Radiance/Metadata/Spectral_Data/Wavelength
//! Radiance/Metadata/Spectral_Data/FWHM
//! Radiance/Metadata/Ancillary_Rasters/OBS_Data
//! ```

use std::ops::Range;
use std::path::Path;

use hdf5::types::{FixedAscii, FixedUnicode, VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File};
use ndarray::{s, Array3, Ix3};

use crate::error::{ConvertError, Result};
use crate::model::{split_map_info, RasterGeometry};

const INTEGER_PART: &str = "Radiance/RadianceIntegerPart";
const DECIMAL_PART: &str = "Radiance/RadianceDecimalPart";
const MAP_INFO: &str = "Radiance/Metadata/Coordinate_System/Map_Info";
const WAVELENGTH: &str = "Radiance/Metadata/Spectral_Data/Wavelength";
const FWHM: &str = "Radiance/Metadata/Spectral_Data/FWHM";
const OBS_DATA: &str = "Radiance/Metadata/Ancillary_Rasters/OBS_Data";

pub struct SourceContainer {
    file: File,
    site: String,
}

impl SourceContainer {
    /// Opens `path` read-only. Without `site`, the first top-level group is used.
    pub fn open(path: &Path, site: Option<&str>) -> Result<Self> {
        if !path.is_file() {
            return Err(ConvertError::MissingSourceData(format!(
                "{:?} does not exist",
                path
            )));
        }
        let file = File::open(path)?;

        let site = match site {
            Some(site) => {
                if !file.link_exists(site) {
                    return Err(ConvertError::MissingSourceData(format!(
                        "site group '{}' not found in {:?}",
                        site, path
                    )));
                }
                site.to_string()
            }
            None => file
                .member_names()?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    ConvertError::MissingSourceData(format!("{:?} has no top-level group", path))
                })?,
        };

        tracing::debug!("Opened {:?} (site group '{}')", path, site);
        Ok(Self { file, site })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    fn dataset(&self, relative: &str) -> Result<Dataset> {
        let full = format!("{}/{}", self.site, relative);
        if !self.file.link_exists(&full) {
            return Err(ConvertError::MissingSourceData(format!(
                "dataset '{}' not found",
                full
            )));
        }
        Ok(self.file.dataset(&full)?)
    }

    /// Geometry of the radiance cube. Both parts must agree.
    pub fn radiance_geometry(&self) -> Result<RasterGeometry> {
        let integer_shape = self.dataset(INTEGER_PART)?.shape();
        let decimal_shape = self.dataset(DECIMAL_PART)?.shape();
        if integer_shape != decimal_shape {
            return Err(ConvertError::InvalidGeometry(format!(
                "integer part {:?} and decimal part {:?} differ in shape",
                integer_shape, decimal_shape
            )));
        }
        RasterGeometry::from_shape(&integer_shape)
    }

    /// Reads lines `range` of both radiance parts, each `(k, samples, bands)`.
    pub fn read_radiance_lines(&self, range: Range<usize>) -> Result<(Array3<f64>, Array3<f64>)> {
        let integer_part = self
            .dataset(INTEGER_PART)?
            .read_slice::<f64, _, Ix3>(s![range.clone(), .., ..])?;
        let decimal_part = self
            .dataset(DECIMAL_PART)?
            .read_slice::<f64, _, Ix3>(s![range, .., ..])?;
        Ok((integer_part, decimal_part))
    }

    /// Raw map-info fields, split on commas and otherwise untouched.
    pub fn map_info(&self) -> Result<Vec<String>> {
        let dataset = self.dataset(MAP_INFO)?;
        let raw = read_string(&dataset)?;
        Ok(split_map_info(&raw))
    }

    pub fn wavelength(&self) -> Result<Vec<f64>> {
        Ok(self.dataset(WAVELENGTH)?.read_raw::<f64>()?)
    }

    pub fn fwhm(&self) -> Result<Vec<f64>> {
        Ok(self.dataset(FWHM)?.read_raw::<f64>()?)
    }

    pub fn observation_geometry(&self) -> Result<RasterGeometry> {
        RasterGeometry::from_shape(&self.dataset(OBS_DATA)?.shape())
    }

    /// Reads lines `range` of `OBS_Data`, `(k, samples, bands)`.
    pub fn observation_lines(&self, range: Range<usize>) -> Result<Array3<f32>> {
        Ok(self
            .dataset(OBS_DATA)?
            .read_slice::<f32, _, Ix3>(s![range, .., ..])?)
    }
}

// Map_Info has been written as variable- and fixed-length strings in both
// character sets. HDF5 does not convert between ASCII and UTF-8.
fn read_string(dataset: &Dataset) -> Result<String> {
    if let Ok(value) = dataset.read_scalar::<VarLenUnicode>() {
        return Ok(value.as_str().to_string());
    }
    if let Ok(value) = dataset.read_scalar::<VarLenAscii>() {
        return Ok(value.as_str().to_string());
    }
    if let Ok(value) = dataset.read_scalar::<FixedAscii<4096>>() {
        return Ok(value.as_str().to_string());
    }
    let value = dataset.read_scalar::<FixedUnicode<4096>>()?;
    Ok(value.as_str().to_string())
}
