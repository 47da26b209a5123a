pub mod ancillary;
pub mod convert;
pub mod error;
pub mod geolocation;
pub mod header;
pub mod model;
pub mod radiance;
pub mod source;
pub mod writer;

pub use convert::{
    convert_observation, convert_radiance, generate_location, ConversionConfig, ConversionSummary,
};
pub use error::{ConvertError, Result};
pub use header::{HeaderDocument, MetadataBuilder, RasterMetadata};
pub use model::{AffineGeoref, ByteOrder, FillPolicy, RasterGeometry};
pub use source::SourceContainer;
pub use writer::BilWriter;
