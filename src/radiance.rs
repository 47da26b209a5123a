//! Reconstruction of radiance from the integer/decimal encoding.
//!
//! The source stores each value as two arrays that must be summed. Lines are
//! reconstructed in small batches and handed back already in BIL order, so
//! the converter never holds more than a batch of the cube in memory.

use ndarray::{Array3, ArrayView3, Zip};

use crate::error::{ConvertError, Result};
use crate::writer::permute_to_bil;

/// Lines reconstructed per batch unless the caller asks for more.
pub const DEFAULT_LINES_PER_CHUNK: usize = 1;

/// Sums `integer_part + decimal_part`, both shaped `(k, samples, bands)`, and
/// returns the `(k, bands, samples)` `f32` batch ready for a BIL write.
///
/// Decimal parts are not range checked.
pub fn reconstruct_lines(
    integer_part: ArrayView3<'_, f64>,
    decimal_part: ArrayView3<'_, f64>,
) -> Result<Array3<f32>> {
    if integer_part.dim() != decimal_part.dim() {
        return Err(ConvertError::InvalidGeometry(format!(
            "integer part {:?} and decimal part {:?} differ in shape",
            integer_part.dim(),
            decimal_part.dim()
        )));
    }

    let integer_part = permute_to_bil(integer_part);
    let decimal_part = permute_to_bil(decimal_part);

    let mut radiance = Array3::<f32>::zeros(integer_part.raw_dim());
    Zip::from(&mut radiance)
        .and(&integer_part)
        .and(&decimal_part)
        .par_for_each(|out, &int, &dec| *out = (int + dec) as f32);

    Ok(radiance)
}

/// Splits `0..lines` into consecutive ranges of at most `lines_per_chunk`.
pub fn line_batches(
    lines: usize,
    lines_per_chunk: usize,
) -> impl Iterator<Item = std::ops::Range<usize>> {
    let step = lines_per_chunk.max(1);
    (0..lines)
        .step_by(step)
        .map(move |start| start..(start + step).min(lines))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconstruct_sums_parts() {
        let integer = Array3::from_shape_fn((2, 3, 4), |(l, s, b)| (l * 100 + s * 10 + b) as f64);
        let decimal = Array3::from_elem((2, 3, 4), 0.25);

        let radiance = reconstruct_lines(integer.view(), decimal.view()).unwrap();
        assert_eq!(radiance.dim(), (2, 4, 3));

        for l in 0..2 {
            for s in 0..3 {
                for b in 0..4 {
                    let expected = (l * 100 + s * 10 + b) as f32 + 0.25;
                    assert_eq!(radiance[[l, b, s]], expected);
                }
            }
        }
    }

    #[test]
    fn test_reconstruct_bil_memory_order() {
        let integer = Array3::from_shape_fn((1, 2, 3), |(_, s, b)| (s * 10 + b) as f64);
        let decimal = Array3::<f64>::zeros((1, 2, 3));

        let radiance = reconstruct_lines(integer.view(), decimal.view()).unwrap();
        let flat: Vec<f32> = radiance.iter().copied().collect();
        // band-major within the line
        assert_eq!(flat, vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0]);
    }

    #[test]
    fn test_reconstruct_zero_cube() {
        let zeros = Array3::<f64>::zeros((3, 5, 7));
        let radiance = reconstruct_lines(zeros.view(), zeros.view()).unwrap();
        assert!(radiance.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_reconstruct_shape_mismatch() {
        let integer = Array3::<f64>::zeros((1, 2, 3));
        let decimal = Array3::<f64>::zeros((1, 3, 2));
        assert!(matches!(
            reconstruct_lines(integer.view(), decimal.view()),
            Err(ConvertError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_out_of_range_decimal_is_not_rejected() {
        let integer = Array3::from_elem((1, 1, 1), 5.0);
        let decimal = Array3::from_elem((1, 1, 1), 1.5);
        let radiance = reconstruct_lines(integer.view(), decimal.view()).unwrap();
        assert_eq!(radiance[[0, 0, 0]], 6.5);
    }

    #[test]
    fn test_line_batches() {
        let batches: Vec<_> = line_batches(5, 2).collect();
        assert_eq!(batches, vec![0..2, 2..4, 4..5]);
        assert_eq!(line_batches(3, 0).count(), 3);
        assert_eq!(line_batches(0, 1).count(), 0);
    }
}
