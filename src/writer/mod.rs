use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use ndarray::ArrayView3;

use crate::error::{ConvertError, Result};
use crate::header::RasterMetadata;
use crate::model::{ByteOrder, DataType, RasterGeometry};

/// Reorders a `(line, sample, band)` view into `(line, band, sample)`, the
/// order in which BIL stores values within each line.
pub fn permute_to_bil<T>(chunk: ArrayView3<'_, T>) -> ArrayView3<'_, T> {
    chunk.permuted_axes([0, 2, 1])
}

/// Creates (or truncates) `path` and sizes it to exactly `total_bytes`.
pub fn preallocate(path: &Path, total_bytes: u64) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| ConvertError::output(path, e))?;
    file.set_len(total_bytes)
        .map_err(|e| ConvertError::output(path, e))?;
    Ok(file)
}

/// Writes a BIL cube into a preallocated file, one chunk of lines at a time.
///
/// Every write goes to an explicit byte offset, so chunks may arrive in any
/// order and from several threads as long as their line ranges are disjoint.
pub struct BilWriter {
    path: PathBuf,
    file: File,
    geometry: RasterGeometry,
    data_type: DataType,
    byte_order: ByteOrder,
}

impl BilWriter {
    pub fn create(path: &Path, metadata: &RasterMetadata) -> Result<Self> {
        let total_bytes = metadata.total_bytes();
        let file = preallocate(path, total_bytes)?;

        tracing::info!(
            "Preallocated {:?}: {} ({} bytes)",
            path,
            metadata.geometry,
            total_bytes
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            geometry: metadata.geometry,
            data_type: metadata.data_type,
            byte_order: metadata.byte_order,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn geometry(&self) -> RasterGeometry {
        self.geometry
    }

    pub fn line_offset_bytes(&self, line: usize) -> u64 {
        self.geometry.line_offset_bytes(line, self.data_type)
    }

    /// Writes `chunk`, shaped `(k, bands, samples)`, starting at `line_offset`.
    pub fn write_chunk(&self, line_offset: usize, chunk: ArrayView3<'_, f32>) -> Result<()> {
        let (_, bands, samples) = chunk.dim();
        if bands != self.geometry.bands || samples != self.geometry.samples {
            return Err(ConvertError::InvalidGeometry(format!(
                "chunk has {} bands x {} samples, raster expects {} x {}",
                bands, samples, self.geometry.bands, self.geometry.samples
            )));
        }

        let mut bytes = Vec::with_capacity(chunk.len() * self.data_type.item_size());
        // iter() walks the logical order regardless of memory layout
        for &value in chunk.iter() {
            bytes.extend_from_slice(&self.byte_order.encode(value));
        }

        self.write_chunk_bytes(line_offset, &bytes)
    }

    /// Writes already-encoded BIL bytes covering whole lines.
    pub fn write_chunk_bytes(&self, line_offset: usize, bytes: &[u8]) -> Result<()> {
        let line_bytes = self.geometry.line_bytes(self.data_type);
        if bytes.len() as u64 % line_bytes != 0 {
            return Err(ConvertError::InvalidGeometry(format!(
                "chunk of {} bytes is not a whole number of {}-byte lines",
                bytes.len(),
                line_bytes
            )));
        }

        let offset = self.line_offset_bytes(line_offset);
        let end = offset + bytes.len() as u64;
        let total = self.geometry.total_bytes(self.data_type);
        if end > total {
            return Err(ConvertError::InvalidGeometry(format!(
                "chunk at line {} ends at byte {} past the {}-byte raster",
                line_offset, end, total
            )));
        }

        write_at(&self.file, bytes, offset).map_err(|e| ConvertError::output(&self.path, e))
    }

    /// Flushes the cube to durable storage and closes it.
    pub fn finish(self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| ConvertError::output(&self.path, e))
    }
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut written = 0;
    while written < buf.len() {
        let n = file.seek_write(&buf[written..], offset + written as u64)?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        written += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::MetadataBuilder;
    use ndarray::Array3;
    use std::fs;
    use tempfile::TempDir;

    fn metadata(lines: usize, samples: usize, bands: usize) -> RasterMetadata {
        MetadataBuilder::new(lines, samples, bands).build().unwrap()
    }

    fn line_chunk(line: usize, samples: usize, bands: usize) -> Array3<f32> {
        Array3::from_shape_fn((1, bands, samples), |(_, b, s)| {
            (line * 100 + b * 10 + s) as f32
        })
    }

    #[test]
    fn test_permute_to_bil() {
        // (line, sample, band) value = sample * 10 + band
        let bip = Array3::from_shape_fn((1, 3, 2), |(_, s, b)| (s * 10 + b) as f32);
        let bil = permute_to_bil(bip.view());
        assert_eq!(bil.dim(), (1, 2, 3));
        let flat: Vec<f32> = bil.iter().copied().collect();
        assert_eq!(flat, vec![0.0, 10.0, 20.0, 1.0, 11.0, 21.0]);
    }

    #[test]
    fn test_preallocate_sets_exact_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cube");
        fs::write(&path, vec![1u8; 1000]).unwrap();

        preallocate(&path, 96).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 96);
    }

    #[test]
    fn test_chunk_offsets() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cube");
        let writer = BilWriter::create(&path, &metadata(3, 2, 2)).unwrap();

        assert_eq!(writer.line_offset_bytes(2), 2 * 2 * 2 * 4);
        writer.write_chunk(2, line_chunk(2, 2, 2).view()).unwrap();
        writer.finish().unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 48);
        assert!(bytes[..32].iter().all(|&b| b == 0));
        assert_eq!(&bytes[32..36], &200.0f32.to_le_bytes());
    }

    #[test]
    fn test_write_order_does_not_matter() {
        let temp_dir = TempDir::new().unwrap();
        let forward = temp_dir.path().join("forward");
        let shuffled = temp_dir.path().join("shuffled");
        let meta = metadata(4, 3, 2);

        let writer = BilWriter::create(&forward, &meta).unwrap();
        for line in 0..4 {
            writer.write_chunk(line, line_chunk(line, 3, 2).view()).unwrap();
        }
        writer.finish().unwrap();

        let writer = BilWriter::create(&shuffled, &meta).unwrap();
        for line in [2, 0, 3, 1] {
            writer.write_chunk(line, line_chunk(line, 3, 2).view()).unwrap();
            assert_eq!(fs::metadata(&shuffled).unwrap().len(), meta.total_bytes());
        }
        writer.finish().unwrap();

        assert_eq!(fs::read(&forward).unwrap(), fs::read(&shuffled).unwrap());
    }

    #[test]
    fn test_rejects_chunks_outside_raster() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cube");
        let writer = BilWriter::create(&path, &metadata(2, 2, 2)).unwrap();

        let past_end = writer.write_chunk(2, line_chunk(0, 2, 2).view());
        assert!(matches!(past_end, Err(ConvertError::InvalidGeometry(_))));

        let wrong_shape = writer.write_chunk(0, line_chunk(0, 3, 2).view());
        assert!(matches!(wrong_shape, Err(ConvertError::InvalidGeometry(_))));

        let partial_line = writer.write_chunk_bytes(0, &[0u8; 6]);
        assert!(matches!(partial_line, Err(ConvertError::InvalidGeometry(_))));

        assert_eq!(fs::metadata(&path).unwrap().len(), 32);
    }

    #[test]
    fn test_create_reports_output_errors() {
        let temp_dir = TempDir::new().unwrap();
        let meta = metadata(2, 2, 2);

        let missing_dir = temp_dir.path().join("missing").join("cube");
        match BilWriter::create(&missing_dir, &meta) {
            Err(ConvertError::Output { path, .. }) => assert_eq!(path, missing_dir),
            other => panic!("expected an output error, got {:?}", other.map(|w| w.geometry())),
        }
        assert!(!missing_dir.exists());

        let directory = temp_dir.path().join("cube_dir");
        fs::create_dir(&directory).unwrap();
        assert!(matches!(
            BilWriter::create(&directory, &meta),
            Err(ConvertError::Output { .. })
        ));
        assert!(directory.is_dir());
    }

    #[test]
    fn test_big_endian_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cube");
        let meta = MetadataBuilder::new(1, 1, 1)
            .byte_order(ByteOrder::BigEndian)
            .build()
            .unwrap();

        let writer = BilWriter::create(&path, &meta).unwrap();
        writer
            .write_chunk(0, Array3::from_elem((1, 1, 1), 1.0f32).view())
            .unwrap();
        writer.finish().unwrap();

        assert_eq!(fs::read(&path).unwrap(), 1.0f32.to_be_bytes().to_vec());
    }
}
