//! Shape validation for `[layer][expert]` weight matrices.

use crate::error::{EplbError, Result};

/// Validate that `weight` is a non-empty rectangular matrix and return its
/// `(num_layers, num_columns)` dimensions.
///
/// Malformed shapes are fatal configuration errors; they are never silently
/// truncated or padded.
pub(crate) fn dims(weight: &[Vec<f64>]) -> Result<(usize, usize)> {
    let num_layers = weight.len();
    if num_layers == 0 || weight[0].is_empty() {
        return Err(EplbError::EmptyWeightMatrix);
    }
    let num_cols = weight[0].len();
    for (layer, row) in weight.iter().enumerate() {
        if row.len() != num_cols {
            return Err(EplbError::RaggedWeightMatrix {
                layer,
                expected: num_cols,
                actual: row.len(),
            });
        }
    }
    Ok((num_layers, num_cols))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangular_matrix_dims() {
        let w = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        assert_eq!(dims(&w).unwrap(), (2, 3));
    }

    #[test]
    fn empty_matrix_is_rejected() {
        assert!(matches!(dims(&[]), Err(EplbError::EmptyWeightMatrix)));
        assert!(matches!(
            dims(&[vec![]]),
            Err(EplbError::EmptyWeightMatrix)
        ));
    }

    #[test]
    fn ragged_matrix_reports_offending_layer() {
        let w = vec![vec![1.0, 2.0], vec![3.0]];
        match dims(&w) {
            Err(EplbError::RaggedWeightMatrix {
                layer,
                expected,
                actual,
            }) => {
                assert_eq!(layer, 1);
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ragged-matrix error, got {other:?}"),
        }
    }
}
