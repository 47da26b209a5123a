//! The three conversions: radiance cube, observation geometry and location
//! grid. Each one builds its metadata first, so geometry and georeference
//! problems are reported before anything is written.

use std::ffi::OsString;
use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::{s, Array3};
use tracing::{debug, info, warn};

use crate::ancillary::{
    observation_band_names, required_source_bands, select_observation_bands, OBSERVATION_BANDS,
};
use crate::error::{ConvertError, Result};
use crate::geolocation::{location_grid, LOCATION_BAND_NAMES};
use crate::header::{write_header, HeaderDocument, MetadataBuilder, RasterMetadata};
use crate::model::{AffineGeoref, ByteOrder, FillPolicy, RasterGeometry};
use crate::radiance::{line_batches, reconstruct_lines, DEFAULT_LINES_PER_CHUNK};
use crate::source::SourceContainer;
use crate::writer::{permute_to_bil, BilWriter};

const PROGRESS_INTERVAL: usize = 100;

#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub input_path: PathBuf,
    /// Data file path; the header goes next to it with `.hdr` appended.
    pub output_basename: PathBuf,
    pub fill_policy: FillPolicy,
    pub lines_per_chunk: usize,
    pub byte_order: ByteOrder,
    /// Top-level HDF5 group to read; defaults to the first one.
    pub site: Option<String>,
}

impl ConversionConfig {
    pub fn new(input_path: impl Into<PathBuf>, output_basename: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_basename: output_basename.into(),
            fill_policy: FillPolicy::default(),
            lines_per_chunk: DEFAULT_LINES_PER_CHUNK,
            byte_order: ByteOrder::default(),
            site: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.input_path.exists() {
            return Err(ConvertError::MissingSourceData(format!(
                "input {:?} does not exist",
                self.input_path
            )));
        }
        if self.lines_per_chunk == 0 {
            return Err(ConvertError::InvalidConfig(
                "lines per chunk must be at least 1".to_string(),
            ));
        }
        if self.output_basename.file_name().is_none() {
            return Err(ConvertError::InvalidConfig(format!(
                "output basename {:?} has no file name",
                self.output_basename
            )));
        }
        if self.output_basename == self.input_path || self.header_path() == self.input_path {
            return Err(ConvertError::InvalidConfig(format!(
                "output {:?} would overwrite the input",
                self.output_basename
            )));
        }
        if let Some(parent) = self.output_basename.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ConvertError::InvalidConfig(format!(
                    "output directory {:?} does not exist",
                    parent
                )));
            }
        }
        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        self.output_basename.clone()
    }

    pub fn header_path(&self) -> PathBuf {
        let mut path = OsString::from(self.output_basename.as_os_str());
        path.push(".hdr");
        PathBuf::from(path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSummary {
    pub data_path: PathBuf,
    pub header_path: PathBuf,
    pub geometry: RasterGeometry,
}

/// Converts the radiance cube, streaming `lines_per_chunk` lines at a time.
pub fn convert_radiance(config: &ConversionConfig) -> Result<ConversionSummary> {
    config.validate()?;
    info!("Converting radiance: {:?}", config.input_path);

    let source = SourceContainer::open(&config.input_path, config.site.as_deref())?;
    let geometry = source.radiance_geometry()?;

    let metadata = MetadataBuilder::from_geometry(geometry)
        .byte_order(config.byte_order)
        .map_info(source.map_info()?)
        .wavelength(source.wavelength()?)
        .fwhm(source.fwhm()?)
        .description(format!("{} radiance", source.site()))
        .build()?;

    write_cube(config, &metadata, |range| {
        let (integer_part, decimal_part) = source.read_radiance_lines(range)?;
        reconstruct_lines(integer_part.view(), decimal_part.view())
    })
}

/// Extracts the six observation-geometry bands.
pub fn convert_observation(config: &ConversionConfig) -> Result<ConversionSummary> {
    config.validate()?;
    info!("Converting observation geometry: {:?}", config.input_path);

    let source = SourceContainer::open(&config.input_path, config.site.as_deref())?;
    let obs_geometry = source.observation_geometry()?;
    if obs_geometry.bands < required_source_bands() {
        return Err(ConvertError::InvalidGeometry(format!(
            "OBS_Data has {} bands, at least {} are required",
            obs_geometry.bands,
            required_source_bands()
        )));
    }

    let mut builder = MetadataBuilder::new(
        obs_geometry.lines,
        obs_geometry.samples,
        OBSERVATION_BANDS.len(),
    )
    .byte_order(config.byte_order)
    .band_names(observation_band_names())
    .description(format!("{} observation geometry", source.site()));

    match source.map_info() {
        Ok(map_info) => builder = builder.map_info(map_info),
        Err(ConvertError::MissingSourceData(_)) => {}
        Err(e) => return Err(e),
    }
    let metadata = builder.build()?;

    let fill = config.fill_policy;

    write_cube(config, &metadata, |range| {
        let observation = source.observation_lines(range)?;
        let selected = select_observation_bands(observation.view(), fill)?;
        Ok(permute_to_bil(selected.view()).to_owned())
    })
}

/// Writes the easting/northing grid. The input is either an ENVI header or
/// the HDF5 source, chosen by extension.
pub fn generate_location(config: &ConversionConfig) -> Result<ConversionSummary> {
    config.validate()?;
    info!("Generating location grid: {:?}", config.input_path);

    let (geometry, map_info) = match LocationInput::from_path(&config.input_path) {
        LocationInput::Header => {
            let metadata = HeaderDocument::read(&config.input_path)?.raster_metadata()?;
            let map_info = metadata.map_info.ok_or_else(|| {
                ConvertError::MalformedGeoreference(format!(
                    "{:?} has no map info",
                    config.input_path
                ))
            })?;
            (metadata.geometry, map_info)
        }
        LocationInput::Hdf5 => {
            let source = SourceContainer::open(&config.input_path, config.site.as_deref())?;
            (source.radiance_geometry()?, source.map_info()?)
        }
    };

    let georef = AffineGeoref::from_map_info(&map_info)?;
    let metadata = MetadataBuilder::new(geometry.lines, geometry.samples, LOCATION_BAND_NAMES.len())
        .byte_order(config.byte_order)
        .map_info(map_info)
        .band_names(LOCATION_BAND_NAMES)
        .description("location grid")
        .build()?;

    let grid = location_grid(geometry.samples, geometry.lines, &georef)?;

    write_cube(config, &metadata, |range| {
        Ok(permute_to_bil(grid.slice(s![range, .., ..])).to_owned())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationInput {
    Header,
    Hdf5,
}

impl LocationInput {
    fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("h5") | Some("hdf5") | Some("he5") => LocationInput::Hdf5,
            _ => LocationInput::Header,
        }
    }
}

/// Preallocates the data file, fills it chunk by chunk from `produce` (which
/// returns BIL-ordered `(k, bands, samples)` batches) and writes the header
/// once every line is on disk.
fn write_cube<F>(
    config: &ConversionConfig,
    metadata: &RasterMetadata,
    produce: F,
) -> Result<ConversionSummary>
where
    F: FnMut(Range<usize>) -> Result<Array3<f32>>,
{
    let data_path = config.data_path();
    let header_path = config.header_path();

    let writer = BilWriter::create(&data_path, metadata)?;
    if let Err(e) = stream_chunks(&writer, config.lines_per_chunk, produce) {
        warn!(
            "Conversion failed, {:?} is incomplete and must be discarded",
            writer.path()
        );
        return Err(e);
    }
    writer.finish()?;
    write_header(&header_path, metadata)?;

    info!("Wrote {:?} and {:?}", data_path, header_path);
    Ok(ConversionSummary {
        data_path,
        header_path,
        geometry: metadata.geometry,
    })
}

fn stream_chunks<F>(writer: &BilWriter, lines_per_chunk: usize, mut produce: F) -> Result<()>
where
    F: FnMut(Range<usize>) -> Result<Array3<f32>>,
{
    let lines = writer.geometry().lines;
    let mut next_report = 0;

    for range in line_batches(lines, lines_per_chunk) {
        let start = range.start;
        let expected = range.len();

        let chunk = produce(range)?;
        if chunk.dim().0 != expected {
            return Err(ConvertError::InvalidGeometry(format!(
                "chunk at line {} has {} lines, expected {}",
                start,
                chunk.dim().0,
                expected
            )));
        }
        writer.write_chunk(start, chunk.view())?;
        debug!("Wrote lines {}..{}", start, start + expected);

        if start >= next_report {
            info!("{}/{}", start, lines);
            next_report = start + PROGRESS_INTERVAL;
        }
    }

    Ok(())
}
