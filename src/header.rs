//! ENVI header metadata: building it from source geometry and reading/writing
//! the `.hdr` key/value document.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{ConvertError, Result};
use crate::model::{ByteOrder, DataType, Interleave, RasterGeometry};

/// Everything the header document says about an output cube.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub geometry: RasterGeometry,
    pub interleave: Interleave,
    pub data_type: DataType,
    pub byte_order: ByteOrder,
    /// Raw `map info` fields, written back exactly as received.
    pub map_info: Option<Vec<String>>,
    pub wavelength: Option<Vec<f64>>,
    pub fwhm: Option<Vec<f64>>,
    pub band_names: Option<Vec<String>>,
    pub description: Option<String>,
}

impl RasterMetadata {
    pub fn total_bytes(&self) -> u64 {
        self.geometry.total_bytes(self.data_type)
    }
}

#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    lines: usize,
    samples: usize,
    bands: usize,
    byte_order: ByteOrder,
    map_info: Option<Vec<String>>,
    wavelength: Option<Vec<f64>>,
    fwhm: Option<Vec<f64>>,
    band_names: Option<Vec<String>>,
    description: Option<String>,
}

impl MetadataBuilder {
    pub fn new(lines: usize, samples: usize, bands: usize) -> Self {
        Self {
            lines,
            samples,
            bands,
            byte_order: ByteOrder::default(),
            map_info: None,
            wavelength: None,
            fwhm: None,
            band_names: None,
            description: None,
        }
    }

    pub fn from_geometry(geometry: RasterGeometry) -> Self {
        Self::new(geometry.lines, geometry.samples, geometry.bands)
    }

    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn map_info(mut self, fields: Vec<String>) -> Self {
        self.map_info = Some(fields);
        self
    }

    pub fn wavelength(mut self, values: Vec<f64>) -> Self {
        self.wavelength = Some(values);
        self
    }

    pub fn fwhm(mut self, values: Vec<f64>) -> Self {
        self.fwhm = Some(values);
        self
    }

    pub fn band_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.band_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn build(self) -> Result<RasterMetadata> {
        let geometry = RasterGeometry::new(self.lines, self.samples, self.bands)?;

        check_band_count("wavelength", self.wavelength.as_ref().map(Vec::len), geometry)?;
        check_band_count("fwhm", self.fwhm.as_ref().map(Vec::len), geometry)?;
        check_band_count(
            "band names",
            self.band_names.as_ref().map(Vec::len),
            geometry,
        )?;

        Ok(RasterMetadata {
            geometry,
            interleave: Interleave::Bil,
            data_type: DataType::Float32,
            byte_order: self.byte_order,
            map_info: self.map_info,
            wavelength: self.wavelength,
            fwhm: self.fwhm,
            band_names: self.band_names,
            description: self.description,
        })
    }
}

fn check_band_count(key: &str, len: Option<usize>, geometry: RasterGeometry) -> Result<()> {
    match len {
        Some(len) if len != geometry.bands => Err(ConvertError::InvalidGeometry(format!(
            "{} has {} entries but the cube has {} bands",
            key, len, geometry.bands
        ))),
        _ => Ok(()),
    }
}

/// Renders the header document text.
pub fn render_header(metadata: &RasterMetadata) -> String {
    let mut out = String::from("ENVI\n");
    let geometry = metadata.geometry;

    if let Some(description) = &metadata.description {
        let _ = writeln!(out, "description = {{{}}}", description);
    }
    let _ = writeln!(out, "samples = {}", geometry.samples);
    let _ = writeln!(out, "lines = {}", geometry.lines);
    let _ = writeln!(out, "bands = {}", geometry.bands);
    out.push_str("header offset = 0\n");
    out.push_str("file type = ENVI Standard\n");
    let _ = writeln!(out, "data type = {}", metadata.data_type.envi_code());
    let _ = writeln!(out, "interleave = {}", metadata.interleave.as_str());
    let _ = writeln!(out, "byte order = {}", metadata.byte_order.envi_code());

    // map info fields keep their original spacing
    if let Some(map_info) = &metadata.map_info {
        let _ = writeln!(out, "map info = {{{}}}", map_info.join(","));
    }
    if let Some(wavelength) = &metadata.wavelength {
        let _ = writeln!(out, "wavelength = {{{}}}", join_numbers(wavelength));
    }
    if let Some(fwhm) = &metadata.fwhm {
        let _ = writeln!(out, "fwhm = {{{}}}", join_numbers(fwhm));
    }
    if let Some(band_names) = &metadata.band_names {
        let _ = writeln!(out, "band names = {{{}}}", band_names.join(", "));
    }

    out
}

fn join_numbers(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn write_header(path: &Path, metadata: &RasterMetadata) -> Result<()> {
    fs::write(path, render_header(metadata)).map_err(|e| ConvertError::output(path, e))?;
    tracing::debug!("Wrote ENVI header: {:?}", path);
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Scalar(String),
    List(Vec<String>),
}

/// A parsed ENVI header. Keys are stored lowercase.
#[derive(Debug, Clone, Default)]
pub struct HeaderDocument {
    fields: BTreeMap<String, HeaderValue>,
}

impl HeaderDocument {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        match lines.next() {
            Some(first) if first.trim() == "ENVI" => {}
            _ => {
                return Err(ConvertError::MalformedHeader(
                    "file does not start with 'ENVI'".to_string(),
                ))
            }
        }

        let mut fields = BTreeMap::new();
        while let Some(line) = lines.next() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                ConvertError::MalformedHeader(format!("line without '=': '{}'", line))
            })?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            let parsed = if let Some(rest) = value.strip_prefix('{') {
                // brace values may continue over several lines
                let mut body = rest.to_string();
                while !body.contains('}') {
                    let next = lines.next().ok_or_else(|| {
                        ConvertError::MalformedHeader(format!("unterminated value for '{}'", key))
                    })?;
                    body.push('\n');
                    body.push_str(next);
                }
                let end = body.rfind('}').unwrap_or(body.len());
                let inner = &body[..end];
                if key == "description" {
                    HeaderValue::Scalar(inner.trim().to_string())
                } else {
                    HeaderValue::List(inner.split(',').map(|s| s.trim().to_string()).collect())
                }
            } else {
                HeaderValue::Scalar(value.to_string())
            };

            fields.insert(key, parsed);
        }

        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.fields.get(&key.to_ascii_lowercase())
    }

    pub fn scalar(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(HeaderValue::Scalar(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn list(&self, key: &str) -> Option<&[String]> {
        match self.get(key) {
            Some(HeaderValue::List(values)) => Some(values.as_slice()),
            _ => None,
        }
    }

    fn required_usize(&self, key: &str) -> Result<usize> {
        let raw = self
            .scalar(key)
            .ok_or_else(|| ConvertError::MalformedHeader(format!("missing '{}'", key)))?;
        raw.trim().parse().map_err(|_| {
            ConvertError::MalformedHeader(format!("'{}' is not an integer: {}", key, raw))
        })
    }

    fn optional_code(&self, key: &str) -> Result<Option<u8>> {
        self.scalar(key)
            .map(|raw| {
                raw.trim().parse::<u8>().map_err(|_| {
                    ConvertError::MalformedHeader(format!("'{}' is not an integer: {}", key, raw))
                })
            })
            .transpose()
    }

    fn numbers(&self, key: &str) -> Result<Option<Vec<f64>>> {
        self.list(key)
            .map(|values| {
                values
                    .iter()
                    .map(|v| {
                        v.parse::<f64>().map_err(|_| {
                            ConvertError::MalformedHeader(format!(
                                "'{}' entry is not numeric: {}",
                                key, v
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()
    }

    /// Rebuilds the metadata the converters care about.
    pub fn raster_metadata(&self) -> Result<RasterMetadata> {
        let lines = self.required_usize("lines")?;
        let samples = self.required_usize("samples")?;
        let bands = self.required_usize("bands")?;

        if let Some(interleave) = self.scalar("interleave") {
            interleave.parse::<Interleave>()?;
        }
        if let Some(code) = self.optional_code("data type")? {
            DataType::from_envi_code(code)?;
        }
        let byte_order = match self.optional_code("byte order")? {
            Some(code) => ByteOrder::from_envi_code(code)?,
            None => ByteOrder::default(),
        };

        let mut builder = MetadataBuilder::new(lines, samples, bands).byte_order(byte_order);
        if let Some(map_info) = self.list("map info") {
            builder = builder.map_info(map_info.to_vec());
        }
        if let Some(wavelength) = self.numbers("wavelength")? {
            builder = builder.wavelength(wavelength);
        }
        if let Some(fwhm) = self.numbers("fwhm")? {
            builder = builder.fwhm(fwhm);
        }
        if let Some(names) = self.list("band names") {
            builder = builder.band_names(names.iter().cloned());
        }
        if let Some(description) = self.scalar("description") {
            builder = builder.description(description);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn map_info() -> Vec<String> {
        crate::model::split_map_info(
            "UTM, 1.000, 1.000, 500000.000, 4100000.000, 1.0, 1.0, 11, North",
        )
    }

    #[test]
    fn test_builder_defaults() {
        let metadata = MetadataBuilder::new(2, 3, 4).build().unwrap();
        assert_eq!(metadata.interleave, Interleave::Bil);
        assert_eq!(metadata.data_type.envi_code(), 4);
        assert_eq!(metadata.byte_order, ByteOrder::LittleEndian);
        assert_eq!(metadata.total_bytes(), 2 * 3 * 4 * 4);
    }

    #[test]
    fn test_builder_rejects_bad_geometry() {
        assert!(matches!(
            MetadataBuilder::new(2, 3, 0).build(),
            Err(ConvertError::InvalidGeometry(_))
        ));
        assert!(matches!(
            MetadataBuilder::new(2, 3, 2).wavelength(vec![400.0]).build(),
            Err(ConvertError::InvalidGeometry(_))
        ));
        assert!(matches!(
            MetadataBuilder::new(2, 3, 1)
                .wavelength(vec![400.0])
                .fwhm(vec![5.0, 5.0])
                .build(),
            Err(ConvertError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_render_passes_map_info_through() {
        let metadata = MetadataBuilder::new(2, 3, 2)
            .map_info(map_info())
            .wavelength(vec![381.5, 386.5])
            .fwhm(vec![5.0, 5.25])
            .build()
            .unwrap();
        let text = render_header(&metadata);

        assert!(text.starts_with("ENVI\n"));
        assert!(text.contains("interleave = bil\n"));
        assert!(text.contains("data type = 4\n"));
        assert!(text.contains("byte order = 0\n"));
        assert!(text.contains(
            "map info = {UTM, 1.000, 1.000, 500000.000, 4100000.000, 1.0, 1.0, 11, North}\n"
        ));
        assert!(text.contains("wavelength = {381.5, 386.5}\n"));
        assert!(text.contains("fwhm = {5, 5.25}\n"));
    }

    #[test]
    fn test_header_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cube.hdr");

        let metadata = MetadataBuilder::new(4, 5, 2)
            .map_info(map_info())
            .band_names(["Easting", "Northing"])
            .description("location grid")
            .build()
            .unwrap();
        write_header(&path, &metadata).unwrap();

        let document = HeaderDocument::read(&path).unwrap();
        let parsed = document.raster_metadata().unwrap();
        assert_eq!(parsed.geometry, metadata.geometry);
        assert_eq!(parsed.band_names, metadata.band_names);
        assert_eq!(parsed.description.as_deref(), Some("location grid"));

        let map_info = parsed.map_info.as_deref().unwrap();
        let georef = crate::model::AffineGeoref::from_map_info(map_info).unwrap();
        assert_eq!(georef.x_start, 500000.0);
        assert_eq!(georef.pixel_size_y_signed, -1.0);
    }

    #[test]
    fn test_parse_multiline_values() {
        let text = "ENVI\nsamples = 3\nlines = 2\nbands = 2\nInterleave = BIL\n\
                    wavelength = {\n 400.0,\n 410.0 }\nmap info = {UTM, 1, 1, 10, 20, 2, 2}\n";
        let document = HeaderDocument::parse(text).unwrap();
        let metadata = document.raster_metadata().unwrap();
        assert_eq!(metadata.wavelength, Some(vec![400.0, 410.0]));
        assert_eq!(document.list("map info").map(|v| v.len()), Some(7));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            HeaderDocument::parse("samples = 3\n"),
            Err(ConvertError::MalformedHeader(_))
        ));
        assert!(matches!(
            HeaderDocument::parse("ENVI\nsamples 3\n"),
            Err(ConvertError::MalformedHeader(_))
        ));
        let missing = HeaderDocument::parse("ENVI\nsamples = 3\nbands = 1\n").unwrap();
        assert!(matches!(
            missing.raster_metadata(),
            Err(ConvertError::MalformedHeader(_))
        ));
    }
}
