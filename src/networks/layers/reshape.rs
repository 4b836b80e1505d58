//! Parameter-free layers: retrieval aggregation, flattening and pooling.
use super::{Aggregation, Reduction};
use crate::specs::TensorSpec;
use crate::tensors::Tensor;
use crate::TensorforceError;
use ndarray::{concatenate, ArrayD, Axis, IxDyn};

/// Output spec of aggregating the given (per-instance) specs.
pub(super) fn aggregate_spec(
    name: &str,
    specs: &[&TensorSpec],
    aggregation: Aggregation,
) -> Result<TensorSpec, TensorforceError> {
    let (first, rest) = specs
        .split_first()
        .ok_or_else(|| TensorforceError::required(name, "tensors"))?;
    if rest.is_empty() {
        return Ok((*first).clone());
    }
    if let Some(other) = rest.iter().find(|spec| spec.dtype != first.dtype) {
        return Err(TensorforceError::mismatch(
            name,
            "tensors type",
            first.dtype,
            other.dtype,
        ));
    }
    match aggregation {
        Aggregation::Concat => {
            let (_, outer) = first
                .shape
                .split_last()
                .ok_or_else(|| TensorforceError::value(name, "tensors rank", 0, ">= 1"))?;
            let mut size = 0;
            for spec in specs {
                match spec.shape.split_last() {
                    Some((last, other_outer)) if other_outer == outer => size += last,
                    _ => {
                        return Err(TensorforceError::mismatch(
                            name,
                            "tensors shape",
                            format!("{:?}", first.shape),
                            format!("{:?}", spec.shape),
                        ))
                    }
                }
            }
            let mut shape = outer.to_vec();
            shape.push(size);
            Ok(TensorSpec {
                num_values: None,
                min_value: None,
                max_value: None,
                ..first.with_shape(shape)
            })
        }
        Aggregation::Sum | Aggregation::Product => {
            if let Some(other) = rest.iter().find(|spec| spec.shape != first.shape) {
                return Err(TensorforceError::mismatch(
                    name,
                    "tensors shape",
                    format!("{:?}", first.shape),
                    format!("{:?}", other.shape),
                ));
            }
            Ok(TensorSpec::float(first.shape.clone()))
        }
    }
}

/// Combine retrieved tensors.
///
/// # Errors
/// If the tensors are incompatible with the aggregation.
pub fn aggregate(
    name: &str,
    tensors: &[&Tensor],
    aggregation: Aggregation,
) -> Result<Tensor, TensorforceError> {
    if let [tensor] = tensors {
        return Ok((*tensor).clone());
    }
    match aggregation {
        Aggregation::Concat => {
            if let Some(arrays) = tensors.iter().map(|t| t.as_float()).collect::<Option<Vec<_>>>() {
                return Ok(Tensor::Float(concat_last(name, &arrays)?));
            }
            if let Some(arrays) = tensors.iter().map(|t| t.as_int()).collect::<Option<Vec<_>>>() {
                return Ok(Tensor::Int(concat_last(name, &arrays)?));
            }
            if let Some(arrays) = tensors.iter().map(|t| t.as_bool()).collect::<Option<Vec<_>>>() {
                return Ok(Tensor::Bool(concat_last(name, &arrays)?));
            }
            Err(TensorforceError::invalid(name, "concat of mixed types"))
        }
        Aggregation::Sum | Aggregation::Product => {
            let mut arrays = tensors.iter().map(|t| t.to_float());
            let first = arrays
                .next()
                .ok_or_else(|| TensorforceError::required(name, "tensors"))?;
            let combined = arrays.try_fold(first, |acc, x| {
                if acc.shape() != x.shape() {
                    return Err(TensorforceError::mismatch(
                        name,
                        "tensors shape",
                        format!("{:?}", acc.shape()),
                        format!("{:?}", x.shape()),
                    ));
                }
                Ok(if aggregation == Aggregation::Sum {
                    acc + x
                } else {
                    acc * x
                })
            })?;
            Ok(Tensor::Float(combined))
        }
    }
}

fn concat_last<A: Clone>(name: &str, arrays: &[&ArrayD<A>]) -> Result<ArrayD<A>, TensorforceError> {
    let ndim = arrays.first().map_or(0, |x| x.ndim());
    if ndim == 0 {
        return Err(TensorforceError::value(name, "tensors rank", 0, ">= 1"));
    }
    let views: Vec<_> = arrays.iter().map(|x| x.view()).collect();
    Ok(concatenate(Axis(ndim - 1), &views)?)
}

/// Reshape a batched tensor to `[batch, size]`.
///
/// # Errors
/// If the tensor has no batch axis.
pub fn flatten(input: &Tensor) -> Result<Tensor, TensorforceError> {
    Ok(match input {
        Tensor::Bool(x) => Tensor::Bool(flatten_array(x)?),
        Tensor::Int(x) => Tensor::Int(flatten_array(x)?),
        Tensor::Float(x) => Tensor::Float(flatten_array(x)?),
    })
}

fn flatten_array<A: Clone>(x: &ArrayD<A>) -> Result<ArrayD<A>, TensorforceError> {
    let (batch_size, rest) = x
        .shape()
        .split_first()
        .ok_or_else(|| TensorforceError::value("flatten", "input rank", 0, ">= 1"))?;
    let size = rest.iter().product();
    Ok(x
        .as_standard_layout()
        .into_owned()
        .into_shape(IxDyn(&[*batch_size, size]))?)
}

/// Reduce a `[batch, spatial..., features]` tensor to `[batch, features]`.
///
/// # Errors
/// If the input has fewer than 3 axes or no spatial elements to average.
pub fn pool(
    name: &str,
    input: &ArrayD<f32>,
    reduction: Reduction,
) -> Result<ArrayD<f32>, TensorforceError> {
    let shape = input.shape();
    if shape.len() < 3 {
        return Err(TensorforceError::value(
            name,
            "input rank",
            shape.len().saturating_sub(1),
            ">= 2",
        ));
    }
    let batch_size = shape[0];
    let features = shape[shape.len() - 1];
    let spatial: usize = shape[1..shape.len() - 1].iter().product();
    let input = input
        .as_standard_layout()
        .into_shape((batch_size, spatial, features))?;
    let output = match reduction {
        Reduction::Max => input.fold_axis(Axis(1), f32::NEG_INFINITY, |&m, &v| m.max(v)),
        Reduction::Mean => input
            .mean_axis(Axis(1))
            .ok_or_else(|| TensorforceError::value(name, "spatial size", 0, "> 0"))?,
        Reduction::Sum => input.sum_axis(Axis(1)),
    };
    Ok(output.into_dyn())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array};
    use rstest::rstest;

    #[test]
    fn concat_spec() {
        let a = TensorSpec::float([4, 2]);
        let b = TensorSpec::float([4, 3]);
        let output = aggregate_spec("r", &[&a, &b], Aggregation::Concat).unwrap();
        assert_eq!(output, TensorSpec::float([4, 5]));
    }

    #[test]
    fn concat_spec_outer_mismatch() {
        let a = TensorSpec::float([4, 2]);
        let b = TensorSpec::float([3, 2]);
        assert!(aggregate_spec("r", &[&a, &b], Aggregation::Concat).is_err());
    }

    #[test]
    fn concat_spec_type_mismatch() {
        let a = TensorSpec::float([2]);
        let b = TensorSpec::int([2], 3);
        assert!(aggregate_spec("r", &[&a, &b], Aggregation::Concat).is_err());
    }

    #[test]
    fn concat_values() {
        let a = Tensor::Float(arr2(&[[1.0_f32], [2.0]]).into_dyn());
        let b = Tensor::Float(arr2(&[[3.0_f32, 4.0], [5.0, 6.0]]).into_dyn());
        let output = aggregate("r", &[&a, &b], Aggregation::Concat).unwrap();
        assert_eq!(
            output,
            Tensor::Float(arr2(&[[1.0_f32, 3.0, 4.0], [2.0, 5.0, 6.0]]).into_dyn())
        );
    }

    #[rstest]
    #[case(Aggregation::Sum, [[4.0, 6.0]])]
    #[case(Aggregation::Product, [[3.0, 8.0]])]
    fn elementwise_values(#[case] aggregation: Aggregation, #[case] expected: [[f32; 2]; 1]) {
        let a = Tensor::Float(arr2(&[[1.0_f32, 2.0]]).into_dyn());
        let b = Tensor::Float(arr2(&[[3.0_f32, 4.0]]).into_dyn());
        let output = aggregate("r", &[&a, &b], aggregation).unwrap();
        assert_eq!(output, Tensor::Float(arr2(&expected).into_dyn()));
    }

    #[test]
    fn flatten_keeps_batch() {
        let x = Tensor::Int(Array::from_shape_vec((2, 2, 3), (0..12).collect()).unwrap().into_dyn());
        let y = flatten(&x).unwrap();
        assert_eq!(y.shape(), &[2, 6]);
        let scalar = Tensor::Float(ndarray::arr1(&[1.0_f32, 2.0]).into_dyn());
        assert_eq!(flatten(&scalar).unwrap().shape(), &[2, 1]);
    }

    #[rstest]
    #[case(Reduction::Max, [5.0, 6.0])]
    #[case(Reduction::Mean, [3.0, 4.0])]
    #[case(Reduction::Sum, [9.0, 12.0])]
    fn pool_reductions(#[case] reduction: Reduction, #[case] expected: [f32; 2]) {
        let x = Array::from_shape_vec((1, 3, 2), vec![1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap()
            .into_dyn();
        let y = pool("p", &x, reduction).unwrap();
        assert_eq!(y, arr2(&[expected]).into_dyn());
    }
}
