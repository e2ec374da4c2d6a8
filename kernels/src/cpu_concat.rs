use crate::{KernelElem, KernelError, Result, check_len};

/// CPU implementation of concatenation along `axis`.
///
/// All inputs must agree on every dimension except `axis`. Inputs are copied in order, so
/// along `axis` the first input occupies the lowest indices.
///
/// Returns the concatenated data and its shape.
pub fn cpu_concat<T, const RANK: usize>(
    inputs: &[(&[T], [usize; RANK])],
    axis: usize,
) -> Result<(Vec<T>, [usize; RANK])>
where
    T: KernelElem,
{
    let Some((_, first_shape)) = inputs.first() else {
        return Err(KernelError::InvalidArgument(
            "concat needs at least one input".to_string(),
        ));
    };
    if axis >= RANK {
        return Err(KernelError::InvalidArgument(format!(
            "axis {axis} out of range for rank {RANK}"
        )));
    }

    let mut out_shape = *first_shape;
    out_shape[axis] = 0;
    for (data, shape) in inputs {
        check_len(data, shape)?;
        for dim in 0..RANK {
            if dim != axis && shape[dim] != first_shape[dim] {
                return Err(KernelError::ShapeMismatch {
                    expected: first_shape.to_vec(),
                    got: shape.to_vec(),
                });
            }
        }
        out_shape[axis] += shape[axis];
    }

    // Everything before `axis` is an outer loop; everything from `axis` on is one
    // contiguous chunk per input.
    let outer: usize = first_shape[..axis].iter().product();
    let inner: usize = first_shape[axis + 1..].iter().product();

    let mut out_data = Vec::with_capacity(out_shape.iter().product());
    for o in 0..outer {
        for (data, shape) in inputs {
            let chunk = shape[axis] * inner;
            out_data.extend_from_slice(&data[o * chunk..][..chunk]);
        }
    }

    Ok((out_data, out_shape))
}
