use crate::{KernelElem, KernelError, Result, check_len};
use rayon::prelude::*;

/// CPU implementation of an axis permutation.
///
/// Output axis `i` is input axis `perm[i]`. `[0, 3, 1, 2]` turns NHWC into NCHW.
///
/// The output is produced one innermost row at a time; each row gathers from the input with
/// a fixed stride.
pub fn cpu_permute<T, const RANK: usize>(
    data: &[T],
    shape: &[usize; RANK],
    perm: &[usize; RANK],
) -> Result<Vec<T>>
where
    T: KernelElem,
{
    check_len(data, shape)?;

    let mut seen = [false; RANK];
    for &axis in perm {
        if axis >= RANK || seen[axis] {
            return Err(KernelError::InvalidArgument(format!(
                "{perm:?} is not a permutation of {RANK} axes"
            )));
        }
        seen[axis] = true;
    }

    let mut in_strides = [1usize; RANK];
    for i in (0..RANK.saturating_sub(1)).rev() {
        in_strides[i] = in_strides[i + 1] * shape[i + 1];
    }

    let mut out_shape = [0usize; RANK];
    let mut gather_strides = [0usize; RANK];
    for i in 0..RANK {
        out_shape[i] = shape[perm[i]];
        gather_strides[i] = in_strides[perm[i]];
    }

    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut out_data = vec![T::zero(); data.len()];

    let row_len = out_shape[RANK - 1];
    let inner_stride = gather_strides[RANK - 1];

    out_data
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(row, out_row)| {
            // Decompose the row index over the outer output axes.
            let mut rem = row;
            let mut base = 0;
            for axis in (0..RANK - 1).rev() {
                base += (rem % out_shape[axis]) * gather_strides[axis];
                rem /= out_shape[axis];
            }
            for (j, out_elem) in out_row.iter_mut().enumerate() {
                *out_elem = data[base + j * inner_stride];
            }
        });

    Ok(out_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permute_transpose_2d() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3
        let result = cpu_permute(&data, &[2, 3], &[1, 0]).unwrap();
        assert_eq!(result, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_permute_nhwc_to_nchw() {
        // [1, 2, 2, 3]: pixel p has channels [p*10, p*10+1, p*10+2]
        let data: Vec<f32> = (0..4)
            .flat_map(|p| (0..3).map(move |c| (p * 10 + c) as f32))
            .collect();
        let result = cpu_permute(&data, &[1, 2, 2, 3], &[0, 3, 1, 2]).unwrap();
        assert_eq!(
            result,
            vec![0.0, 10.0, 20.0, 30.0, 1.0, 11.0, 21.0, 31.0, 2.0, 12.0, 22.0, 32.0]
        );
    }

    #[test]
    fn test_permute_identity() {
        let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let result = cpu_permute(&data, &[2, 3, 4], &[0, 1, 2]).unwrap();
        assert_eq!(result, data);
    }

    #[test]
    fn test_permute_rejects_repeated_axis() {
        let err = cpu_permute(&[0.0f32; 4], &[2, 2], &[0, 0]);
        assert!(matches!(err, Err(KernelError::InvalidArgument(_))));
    }
}
