use ::neon_envi::convert as conversions;
use ::neon_envi::{ConversionConfig, ConversionSummary, ConvertError, FillPolicy, HeaderDocument};
use pyo3::exceptions::{PyFileNotFoundError, PyIOError, PyValueError};
use pyo3::prelude::*;
use std::path::Path;

#[pymodule]
fn neon_envi(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyConversionSummary>()?;
    m.add_class::<PyHeader>()?;
    m.add_function(wrap_pyfunction!(convert_radiance, m)?)?;
    m.add_function(wrap_pyfunction!(convert_observation, m)?)?;
    m.add_function(wrap_pyfunction!(generate_location, m)?)?;
    m.add_function(wrap_pyfunction!(read_header, m)?)?;
    Ok(())
}

#[pyclass(name = "ConversionSummary")]
#[derive(Clone)]
pub struct PyConversionSummary {
    #[pyo3(get)]
    pub data_path: String,
    #[pyo3(get)]
    pub header_path: String,
    #[pyo3(get)]
    pub lines: usize,
    #[pyo3(get)]
    pub samples: usize,
    #[pyo3(get)]
    pub bands: usize,
}

impl From<ConversionSummary> for PyConversionSummary {
    fn from(summary: ConversionSummary) -> Self {
        PyConversionSummary {
            data_path: summary.data_path.display().to_string(),
            header_path: summary.header_path.display().to_string(),
            lines: summary.geometry.lines,
            samples: summary.geometry.samples,
            bands: summary.geometry.bands,
        }
    }
}

#[pymethods]
impl PyConversionSummary {
    #[getter]
    fn shape(&self) -> (usize, usize, usize) {
        (self.lines, self.samples, self.bands)
    }

    fn __repr__(&self) -> String {
        format!(
            "ConversionSummary(data_path='{}', shape=({}, {}, {}))",
            self.data_path, self.lines, self.samples, self.bands
        )
    }
}

#[pyclass(name = "Header")]
#[derive(Clone)]
pub struct PyHeader {
    #[pyo3(get)]
    pub lines: usize,
    #[pyo3(get)]
    pub samples: usize,
    #[pyo3(get)]
    pub bands: usize,
    #[pyo3(get)]
    pub byte_order: u8,
    #[pyo3(get)]
    pub map_info: Option<Vec<String>>,
    #[pyo3(get)]
    pub wavelength: Option<Vec<f64>>,
    #[pyo3(get)]
    pub fwhm: Option<Vec<f64>>,
    #[pyo3(get)]
    pub band_names: Option<Vec<String>>,
}

#[pymethods]
impl PyHeader {
    fn __repr__(&self) -> String {
        format!(
            "Header(lines={}, samples={}, bands={}, byte_order={})",
            self.lines, self.samples, self.bands, self.byte_order
        )
    }
}

fn to_py_err(e: ConvertError) -> PyErr {
    match e {
        ConvertError::MissingSourceData(msg) => PyFileNotFoundError::new_err(msg),
        ConvertError::InvalidGeometry(_)
        | ConvertError::MalformedGeoreference(_)
        | ConvertError::MalformedHeader(_)
        | ConvertError::InvalidConfig(_) => PyValueError::new_err(e.to_string()),
        other => PyIOError::new_err(other.to_string()),
    }
}

#[pyfunction]
#[pyo3(signature = (h5_path, out_base, lines_per_chunk=1))]
pub fn convert_radiance(
    h5_path: &str,
    out_base: &str,
    lines_per_chunk: usize,
) -> PyResult<PyConversionSummary> {
    let mut config = ConversionConfig::new(h5_path, out_base);
    config.lines_per_chunk = lines_per_chunk;

    conversions::convert_radiance(&config)
        .map(PyConversionSummary::from)
        .map_err(to_py_err)
}

/// `replace_fill=None` leaves -9999 pixels untouched.
#[pyfunction]
#[pyo3(signature = (h5_path, out_base, replace_fill=Some(f32::NAN)))]
pub fn convert_observation(
    h5_path: &str,
    out_base: &str,
    replace_fill: Option<f32>,
) -> PyResult<PyConversionSummary> {
    let mut config = ConversionConfig::new(h5_path, out_base);
    config.fill_policy = FillPolicy::from_option(replace_fill);

    conversions::convert_observation(&config)
        .map(PyConversionSummary::from)
        .map_err(to_py_err)
}

#[pyfunction]
pub fn generate_location(input_path: &str, out_base: &str) -> PyResult<PyConversionSummary> {
    let config = ConversionConfig::new(input_path, out_base);

    conversions::generate_location(&config)
        .map(PyConversionSummary::from)
        .map_err(to_py_err)
}

#[pyfunction]
pub fn read_header(path: &str) -> PyResult<PyHeader> {
    let metadata = HeaderDocument::read(Path::new(path))
        .and_then(|document| document.raster_metadata())
        .map_err(to_py_err)?;

    Ok(PyHeader {
        lines: metadata.geometry.lines,
        samples: metadata.geometry.samples,
        bands: metadata.geometry.bands,
        byte_order: metadata.byte_order.envi_code(),
        map_info: metadata.map_info,
        wavelength: metadata.wavelength,
        fwhm: metadata.fwhm,
        band_names: metadata.band_names,
    })
}
