use crate::{KernelElem, KernelError, Result, check_len};
use rayon::prelude::*;

/// CPU implementation of a fully connected layer: `out = x · Wᵀ + b`.
///
/// The weight is stored output-major (`[units, in_features]`), so each output element is a
/// dot product of two contiguous rows and no transpose of the weight is needed.
///
/// # Arguments
///
/// * `input` - Input rows. Shape: `[batch_size, in_features]`
/// * `weight` - Weight rows. Shape: `[units, in_features]`
/// * `bias` - Optional bias of length `units`.
///
/// # Returns
///
/// Output shape: `[batch_size, units]`
pub fn cpu_linear<T: KernelElem>(
    input: &[T],
    weight: &[T],
    bias: Option<&[T]>,
    input_shape: &[usize; 2],
    weight_shape: &[usize; 2],
) -> Result<Vec<T>> {
    check_len(input, input_shape)?;
    check_len(weight, weight_shape)?;

    let [batch_size, in_features] = *input_shape;
    let [units, weight_in] = *weight_shape;

    if in_features != weight_in {
        return Err(KernelError::ShapeMismatch {
            expected: vec![in_features],
            got: vec![weight_in],
        });
    }
    if let Some(bias) = bias {
        check_len(bias, &[units])?;
    }

    let mut output = vec![T::zero(); batch_size * units];
    if units == 0 {
        return Ok(output);
    }

    // One task per output row.
    output
        .par_chunks_mut(units)
        .enumerate()
        .for_each(|(row, out_row)| {
            let x_row = &input[row * in_features..][..in_features];

            for (unit, out_elem) in out_row.iter_mut().enumerate() {
                let w_row = &weight[unit * in_features..][..in_features];
                let mut sum = T::zero();
                for (&a, &b) in x_row.iter().zip(w_row.iter()) {
                    sum += a * b;
                }
                if let Some(bias) = bias {
                    sum += bias[unit];
                }
                *out_elem = sum;
            }
        });

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_simple() {
        let x = vec![1.0, 2.0, 3.0, 4.0]; // 2x2
        let w = vec![5.0, 7.0, 6.0, 8.0]; // rows are the columns of [[5, 6], [7, 8]]
        let result = cpu_linear(&x, &w, None, &[2, 2], &[2, 2]).unwrap();
        // [1*5+2*7, 1*6+2*8] = [19, 22]
        // [3*5+4*7, 3*6+4*8] = [43, 50]
        assert_eq!(result, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_linear_bias() {
        let x = vec![1.0, 1.0, 1.0];
        let w = vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]; // 2 units
        let result = cpu_linear(&x, &w, Some(&[0.5, -1.0]), &[1, 3], &[2, 3]).unwrap();
        assert_eq!(result, vec![6.5, -1.0]);
    }

    #[test]
    fn test_linear_shape_mismatch() {
        let err = cpu_linear(&[1.0; 4], &[1.0; 6], None, &[2, 2], &[2, 3]);
        assert!(matches!(err, Err(KernelError::ShapeMismatch { .. })));

        let err = cpu_linear(&[1.0; 4], &[1.0; 4], Some(&[0.0; 3]), &[2, 2], &[2, 2]);
        assert!(matches!(err, Err(KernelError::ShapeMismatch { .. })));
    }
}
