use std::fmt;
use std::str::FromStr;

use crate::error::{ConvertError, Result};

/// Sentinel marking invalid pixels in the ancillary rasters.
pub const FILL_SENTINEL: f32 = -9999.0;

/// Dimensions of an output cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterGeometry {
    pub lines: usize,
    pub samples: usize,
    pub bands: usize,
}

impl RasterGeometry {
    pub fn new(lines: usize, samples: usize, bands: usize) -> Result<Self> {
        if lines == 0 || samples == 0 || bands == 0 {
            return Err(ConvertError::InvalidGeometry(format!(
                "all dimensions must be positive (lines={}, samples={}, bands={})",
                lines, samples, bands
            )));
        }
        Ok(Self {
            lines,
            samples,
            bands,
        })
    }

    /// Builds a geometry from an HDF5 `(lines, samples, bands)` shape.
    pub fn from_shape(shape: &[usize]) -> Result<Self> {
        match shape {
            [lines, samples, bands] => Self::new(*lines, *samples, *bands),
            _ => Err(ConvertError::InvalidGeometry(format!(
                "expected a 3-D cube, got shape {:?}",
                shape
            ))),
        }
    }

    pub fn line_bytes(&self, data_type: DataType) -> u64 {
        (self.samples * self.bands * data_type.item_size()) as u64
    }

    pub fn line_offset_bytes(&self, line: usize, data_type: DataType) -> u64 {
        line as u64 * self.line_bytes(data_type)
    }

    pub fn total_bytes(&self, data_type: DataType) -> u64 {
        self.line_offset_bytes(self.lines, data_type)
    }
}

impl fmt::Display for RasterGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines x {} samples x {} bands",
            self.lines, self.samples, self.bands
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interleave {
    #[default]
    Bil,
}

impl Interleave {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interleave::Bil => "bil",
        }
    }
}

impl FromStr for Interleave {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bil" => Ok(Interleave::Bil),
            other => Err(ConvertError::MalformedHeader(format!(
                "unsupported interleave '{}'",
                other
            ))),
        }
    }
}

/// ENVI data type. Only 32-bit float is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    Float32,
}

impl DataType {
    pub fn envi_code(&self) -> u8 {
        match self {
            DataType::Float32 => 4,
        }
    }

    pub fn item_size(&self) -> usize {
        match self {
            DataType::Float32 => 4,
        }
    }

    pub fn from_envi_code(code: u8) -> Result<Self> {
        match code {
            4 => Ok(DataType::Float32),
            other => Err(ConvertError::MalformedHeader(format!(
                "unsupported data type {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn envi_code(&self) -> u8 {
        match self {
            ByteOrder::LittleEndian => 0,
            ByteOrder::BigEndian => 1,
        }
    }

    pub fn from_envi_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ByteOrder::LittleEndian),
            1 => Ok(ByteOrder::BigEndian),
            other => Err(ConvertError::MalformedHeader(format!(
                "invalid byte order {}",
                other
            ))),
        }
    }

    pub fn encode(&self, value: f32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }
}

impl FromStr for ByteOrder {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "little" | "le" | "0" => Ok(ByteOrder::LittleEndian),
            "big" | "be" | "1" => Ok(ByteOrder::BigEndian),
            other => Err(ConvertError::InvalidConfig(format!(
                "unknown byte order '{}' (expected little or big)",
                other
            ))),
        }
    }
}

/// What to do with `-9999` pixels in the ancillary rasters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillPolicy {
    Replace(f32),
    Keep,
}

impl Default for FillPolicy {
    fn default() -> Self {
        FillPolicy::Replace(f32::NAN)
    }
}

impl FillPolicy {
    pub fn from_option(value: Option<f32>) -> Self {
        value.map_or(FillPolicy::Keep, FillPolicy::Replace)
    }

    pub fn apply(&self, value: f32) -> f32 {
        match self {
            FillPolicy::Replace(fill) if value == FILL_SENTINEL => *fill,
            _ => value,
        }
    }
}

impl FromStr for FillPolicy {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nan" => Ok(FillPolicy::Replace(f32::NAN)),
            "none" | "keep" => Ok(FillPolicy::Keep),
            other => other.parse::<f32>().map(FillPolicy::Replace).map_err(|_| {
                ConvertError::InvalidConfig(format!(
                    "invalid fill value '{}' (expected nan, none or a number)",
                    other
                ))
            }),
        }
    }
}

/// Affine map from grid indices to ground coordinates, parsed from ENVI
/// `map info` fields.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineGeoref {
    pub projection: String,
    pub x_start: f64,
    pub y_start: f64,
    pub pixel_size_x: f64,
    /// Negated from the header so that line index grows southwards.
    pub pixel_size_y_signed: f64,
    pub projection_fields: Vec<String>,
}

impl AffineGeoref {
    pub fn from_map_info<S: AsRef<str>>(fields: &[S]) -> Result<Self> {
        if fields.len() < 7 {
            return Err(ConvertError::MalformedGeoreference(format!(
                "expected at least 7 fields, found {}",
                fields.len()
            )));
        }

        let number = |index: usize, name: &str| -> Result<f64> {
            let raw = fields[index].as_ref().trim();
            let value: f64 = raw.parse().map_err(|_| {
                ConvertError::MalformedGeoreference(format!(
                    "{} (field {}) is not numeric: '{}'",
                    name, index, raw
                ))
            })?;
            if !value.is_finite() {
                return Err(ConvertError::MalformedGeoreference(format!(
                    "{} (field {}) is not finite: '{}'",
                    name, index, raw
                )));
            }
            Ok(value)
        };

        // grid indices are taken relative to the first pixel; the reference
        // pixel only has to be well formed
        number(1, "reference pixel x")?;
        number(2, "reference pixel y")?;
        let x_start = number(3, "easting origin")?;
        let y_start = number(4, "northing origin")?;
        let pixel_size_x = number(5, "pixel size x")?;
        let pixel_size_y = number(6, "pixel size y")?;

        Ok(Self {
            projection: fields[0].as_ref().trim().to_string(),
            x_start,
            y_start,
            pixel_size_x,
            pixel_size_y_signed: -pixel_size_y,
            projection_fields: fields[7..]
                .iter()
                .map(|f| f.as_ref().trim().to_string())
                .collect(),
        })
    }

    /// Parses the raw comma-delimited string stored in the source container.
    pub fn from_map_info_str(map_info: &str) -> Result<Self> {
        Self::from_map_info(&split_map_info(map_info))
    }

    pub fn easting(&self, sample: usize) -> f64 {
        self.x_start + sample as f64 * self.pixel_size_x
    }

    pub fn northing(&self, line: usize) -> f64 {
        self.y_start + line as f64 * self.pixel_size_y_signed
    }
}

/// Splits a raw map-info string on commas, keeping each field verbatim.
pub fn split_map_info(map_info: &str) -> Vec<String> {
    map_info.split(',').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP_INFO: &str =
        "UTM,1.000,1.000,500000.000,4100000.000,1.000000e+000,1.000000e+000,11,North,WGS-84,units=Meters";

    #[test]
    fn test_geometry_rejects_zero_dimension() {
        assert!(matches!(
            RasterGeometry::new(0, 10, 10),
            Err(ConvertError::InvalidGeometry(_))
        ));
        assert!(matches!(
            RasterGeometry::new(10, 10, 0),
            Err(ConvertError::InvalidGeometry(_))
        ));
        assert!(matches!(
            RasterGeometry::from_shape(&[2, 3]),
            Err(ConvertError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_geometry_byte_offsets() {
        let geometry = RasterGeometry::new(5, 3, 4).unwrap();
        assert_eq!(geometry.line_bytes(DataType::Float32), 48);
        assert_eq!(geometry.line_offset_bytes(2, DataType::Float32), 96);
        assert_eq!(geometry.total_bytes(DataType::Float32), 240);
    }

    #[test]
    fn test_parse_map_info() {
        let georef = AffineGeoref::from_map_info_str(MAP_INFO).unwrap();
        assert_eq!(georef.projection, "UTM");
        assert_eq!(georef.x_start, 500000.0);
        assert_eq!(georef.y_start, 4100000.0);
        assert_eq!(georef.pixel_size_x, 1.0);
        assert_eq!(georef.pixel_size_y_signed, -1.0);
        assert_eq!(georef.projection_fields, vec!["11", "North", "WGS-84", "units=Meters"]);
        assert_eq!(georef.northing(1), 4099999.0);
        assert_eq!(georef.easting(2), 500002.0);
    }

    #[test]
    fn test_malformed_map_info() {
        let short = AffineGeoref::from_map_info_str("UTM,1,1,500000");
        assert!(matches!(short, Err(ConvertError::MalformedGeoreference(_))));

        let non_numeric = AffineGeoref::from_map_info_str("UTM,1,1,abc,4100000,1,1");
        assert!(matches!(
            non_numeric,
            Err(ConvertError::MalformedGeoreference(_))
        ));

        let infinite = AffineGeoref::from_map_info_str("UTM,1,1,inf,4100000,1,1");
        assert!(matches!(infinite, Err(ConvertError::MalformedGeoreference(_))));
    }

    #[test]
    fn test_fill_policy() {
        assert!(FillPolicy::default().apply(FILL_SENTINEL).is_nan());
        assert_eq!(FillPolicy::Replace(0.0).apply(FILL_SENTINEL), 0.0);
        assert_eq!(FillPolicy::Replace(0.0).apply(12.5), 12.5);
        assert_eq!(FillPolicy::Keep.apply(FILL_SENTINEL), FILL_SENTINEL);
        assert_eq!(FillPolicy::from_option(None), FillPolicy::Keep);

        assert_eq!("none".parse::<FillPolicy>().unwrap(), FillPolicy::Keep);
        assert_eq!("0".parse::<FillPolicy>().unwrap(), FillPolicy::Replace(0.0));
        assert!(matches!(
            "nan".parse::<FillPolicy>().unwrap(),
            FillPolicy::Replace(v) if v.is_nan()
        ));
        assert!("zero".parse::<FillPolicy>().is_err());
    }

    #[test]
    fn test_byte_order() {
        assert_eq!("big".parse::<ByteOrder>().unwrap(), ByteOrder::BigEndian);
        assert_eq!(ByteOrder::default().envi_code(), 0);
        assert_eq!(ByteOrder::BigEndian.encode(1.0), [0x3f, 0x80, 0, 0]);
        assert_eq!(ByteOrder::LittleEndian.encode(1.0), [0, 0, 0x80, 0x3f]);
    }
}
