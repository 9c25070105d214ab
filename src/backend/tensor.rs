// src/backend/tensor.rs
// CPU tensor built on ndarray's dynamic-dimension arrays.
// All fallible operations return Result<_, String>; shape problems are caught
// here rather than letting ndarray panic inside an operator.

use crate::backend::numeric::{Float, Numeric};
use ndarray::{Array, ArrayD, Axis, IxDyn};
use rand_distr::{Distribution, StandardNormal};

#[derive(Debug, Clone)]
pub struct Tensor<T>
where
    T: Numeric,
{
    data: ArrayD<T>,
}

// Creation and inspection.
impl<T> Tensor<T>
where
    T: Numeric,
{
    pub fn new(data: ArrayD<T>) -> Self {
        Self { data }
    }

    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self, String> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(format!(
                "Cannot reshape {} elements into shape {:?} ({} elements)",
                data.len(),
                shape,
                expected
            ));
        }
        Array::from_shape_vec(IxDyn(shape), data)
            .map(Self::new)
            .map_err(|e| format!("Tensor creation failed: {}", e))
    }

    pub fn zeros(shape: &[usize]) -> Result<Self, String> {
        Ok(Self::new(ArrayD::zeros(IxDyn(shape))))
    }

    pub fn ones(shape: &[usize]) -> Result<Self, String> {
        Ok(Self::new(ArrayD::ones(IxDyn(shape))))
    }

    pub fn full(shape: &[usize], value: T) -> Result<Self, String> {
        Ok(Self::new(ArrayD::from_elem(IxDyn(shape), value)))
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &ArrayD<T> {
        &self.data
    }

    pub fn into_data(self) -> ArrayD<T> {
        self.data
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.data.iter().copied().collect()
    }

    pub fn get(&self, index: &[usize]) -> Option<T> {
        self.data.get(IxDyn(index)).copied()
    }

    /// First element in logical order. Mostly useful after full reductions.
    pub fn first(&self) -> Result<T, String> {
        self.data
            .iter()
            .next()
            .copied()
            .ok_or_else(|| "Tensor is empty".to_string())
    }
}

// Elementwise operations.
impl<T> Tensor<T>
where
    T: Numeric,
{
    pub fn add(&self, other: &Self) -> Result<Self, String> {
        self.check_same_shape(other, "add")?;
        Ok(Self::new(&self.data + &other.data))
    }

    pub fn mul(&self, other: &Self) -> Result<Self, String> {
        self.check_same_shape(other, "mul")?;
        Ok(Self::new(&self.data * &other.data))
    }

    pub fn mul_scalar(&self, scalar: T) -> Result<Self, String> {
        Ok(Self::new(self.data.mapv(|v| v * scalar)))
    }

    /// Elementwise equality mask: one where the values match, zero elsewhere.
    pub fn equal(&self, other: &Self) -> Result<Self, String> {
        self.check_same_shape(other, "equal")?;
        let mask = ndarray::Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|&a, &b| if a == b { T::one() } else { T::zero() });
        Ok(Self::new(mask))
    }

    fn check_same_shape(&self, other: &Self, op: &str) -> Result<(), String> {
        if self.shape() != other.shape() {
            return Err(format!(
                "Shape mismatch in {}: {:?} vs {:?}",
                op,
                self.shape(),
                other.shape()
            ));
        }
        Ok(())
    }
}

// Shape manipulation.
impl<T> Tensor<T>
where
    T: Numeric,
{
    pub fn unsqueeze(&self, axis: usize) -> Result<Self, String> {
        if axis > self.ndim() {
            return Err(format!(
                "Cannot insert axis {} into {}-dimensional tensor",
                axis,
                self.ndim()
            ));
        }
        Ok(Self::new(self.data.clone().insert_axis(Axis(axis))))
    }

    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self, String> {
        self.data
            .broadcast(IxDyn(shape))
            .map(|view| Self::new(view.to_owned()))
            .ok_or_else(|| {
                format!("Cannot broadcast shape {:?} to {:?}", self.shape(), shape)
            })
    }
}

// Reductions. `axes = None` reduces everything to a scalar; `keep_dims`
// retains the reduced axes with extent one, as in the usual NCHW conventions.
impl<T> Tensor<T>
where
    T: Numeric,
{
    pub fn sum(&self, axes: Option<&[usize]>, keep_dims: bool) -> Result<Self, String> {
        match axes {
            Some(axes) => self.reduce_axes(axes, keep_dims, |data, axis| data.sum_axis(axis)),
            None => {
                let total = self.data.sum();
                self.scalar_result(total, keep_dims)
            }
        }
    }

    pub fn mean(&self, axes: Option<&[usize]>, keep_dims: bool) -> Result<Self, String> {
        match axes {
            Some(axes) => {
                let normalized = self.normalize_axes(axes)?;
                let count: usize = normalized.iter().map(|&a| self.shape()[a]).product();
                if count == 0 {
                    return Err("Cannot take the mean over an empty axis".to_string());
                }
                let scale = T::from_f64(1.0 / count as f64)
                    .ok_or_else(|| "Failed to convert mean scale to tensor type".to_string())?;
                self.sum(Some(axes), keep_dims)?.mul_scalar(scale)
            }
            None => {
                let mean = self
                    .data
                    .mean()
                    .ok_or_else(|| "Cannot take the mean of an empty tensor".to_string())?;
                self.scalar_result(mean, keep_dims)
            }
        }
    }

    pub fn max_reduce(&self, axes: Option<&[usize]>, keep_dims: bool) -> Result<Self, String> {
        self.fold_reduce(axes, keep_dims, T::min_value(), |acc, v| acc.maxv(v))
    }

    pub fn min_reduce(&self, axes: Option<&[usize]>, keep_dims: bool) -> Result<Self, String> {
        self.fold_reduce(axes, keep_dims, T::max_value(), |acc, v| acc.minv(v))
    }

    fn fold_reduce<F>(
        &self,
        axes: Option<&[usize]>,
        keep_dims: bool,
        init: T,
        fold: F,
    ) -> Result<Self, String>
    where
        F: Fn(T, T) -> T + Copy,
    {
        match axes {
            Some(axes) => {
                for &axis in axes {
                    if axis < self.ndim() && self.shape()[axis] == 0 {
                        return Err("Cannot reduce along an empty axis".to_string());
                    }
                }
                self.reduce_axes(axes, keep_dims, |data, axis| {
                    data.map_axis(axis, |lane| lane.iter().copied().fold(init, fold))
                })
            }
            None => {
                if self.is_empty() {
                    return Err("Cannot reduce an empty tensor".to_string());
                }
                let value = self.data.iter().copied().fold(init, fold);
                self.scalar_result(value, keep_dims)
            }
        }
    }

    fn reduce_axes<F>(&self, axes: &[usize], keep_dims: bool, reduce: F) -> Result<Self, String>
    where
        F: Fn(&ArrayD<T>, Axis) -> ArrayD<T>,
    {
        let sorted = self.normalize_axes(axes)?;
        if sorted.is_empty() {
            return Ok(self.clone());
        }
        let mut data = self.data.clone();
        // Reduce from the highest axis down so earlier indices stay valid.
        for &axis in sorted.iter().rev() {
            data = reduce(&data, Axis(axis));
        }
        if keep_dims {
            for &axis in &sorted {
                data = data.insert_axis(Axis(axis));
            }
        }
        Ok(Self::new(data))
    }

    fn normalize_axes(&self, axes: &[usize]) -> Result<Vec<usize>, String> {
        let ndim = self.ndim();
        let mut sorted = axes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if let Some(&bad) = sorted.iter().find(|&&a| a >= ndim) {
            return Err(format!(
                "Reduction axis {} out of bounds for {}-dimensional tensor",
                bad, ndim
            ));
        }
        Ok(sorted)
    }

    fn scalar_result(&self, value: T, keep_dims: bool) -> Result<Self, String> {
        let shape = if keep_dims {
            vec![1; self.ndim()]
        } else {
            Vec::new()
        };
        Self::from_vec(vec![value], &shape)
    }
}

// Gather and scatter along a single axis. These are what the pooling window
// corner reads compile down to.
impl<T> Tensor<T>
where
    T: Numeric,
{
    /// Gathers the sub-views at `indices` along `axis`, in index order.
    /// Indices may repeat; the output extent along `axis` is `indices.len()`.
    pub fn index_select(&self, axis: usize, indices: &[usize]) -> Result<Self, String> {
        let dim = self.axis_len(axis)?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= dim) {
            return Err(format!(
                "Index {} out of bounds for axis {} with extent {}",
                bad, axis, dim
            ));
        }
        Ok(Self::new(self.data.select(Axis(axis), indices)))
    }

    /// Scatter-accumulate: adds `src`'s k-th sub-view along `axis` into this
    /// tensor's `indices[k]`-th sub-view. Duplicate indices accumulate, which
    /// makes this the exact adjoint of `index_select`.
    pub fn index_add(&mut self, axis: usize, indices: &[usize], src: &Self) -> Result<(), String> {
        let dim = self.axis_len(axis)?;
        let src_dim = src.axis_len(axis)?;
        if src_dim != indices.len() {
            return Err(format!(
                "index_add expects {} source sub-views, got {}",
                indices.len(),
                src_dim
            ));
        }
        let mut expected = self.shape().to_vec();
        expected[axis] = indices.len();
        if src.shape() != expected.as_slice() {
            return Err(format!(
                "index_add source shape {:?} incompatible with target {:?} along axis {}",
                src.shape(),
                self.shape(),
                axis
            ));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= dim) {
            return Err(format!(
                "Index {} out of bounds for axis {} with extent {}",
                bad, axis, dim
            ));
        }
        for (k, &index) in indices.iter().enumerate() {
            let source = src.data.index_axis(Axis(axis), k);
            let mut target = self.data.index_axis_mut(Axis(axis), index);
            target += &source;
        }
        Ok(())
    }

    /// Removes `axis` by selecting a single position along it.
    pub fn index_axis(&self, axis: usize, index: usize) -> Result<Self, String> {
        let dim = self.axis_len(axis)?;
        if index >= dim {
            return Err(format!(
                "Index {} out of bounds for axis {} with extent {}",
                index, axis, dim
            ));
        }
        Ok(Self::new(self.data.index_axis(Axis(axis), index).to_owned()))
    }

    /// Stacks equally shaped tensors along a new leading axis.
    pub fn stack(tensors: &[&Self]) -> Result<Self, String> {
        let first = tensors
            .first()
            .ok_or_else(|| "Cannot stack zero tensors".to_string())?;
        for t in tensors.iter().skip(1) {
            if t.shape() != first.shape() {
                return Err(format!(
                    "Cannot stack tensors with shapes {:?} and {:?}",
                    first.shape(),
                    t.shape()
                ));
            }
        }
        let views: Vec<_> = tensors.iter().map(|t| t.data.view()).collect();
        ndarray::stack(Axis(0), &views)
            .map(Self::new)
            .map_err(|e| format!("Stack failed: {}", e))
    }

    fn axis_len(&self, axis: usize) -> Result<usize, String> {
        if axis >= self.ndim() {
            return Err(format!(
                "Axis {} out of bounds for {}-dimensional tensor",
                axis,
                self.ndim()
            ));
        }
        Ok(self.shape()[axis])
    }
}

impl<T> Tensor<T>
where
    T: Float,
{
    /// Standard-normal samples drawn from the process-wide RNG.
    pub fn randn(shape: &[usize]) -> Result<Self, String> {
        let mut rng = rand::rng();
        let size: usize = shape.iter().product();
        let data: Result<Vec<T>, String> = (0..size)
            .map(|_| {
                let sample: f64 = StandardNormal.sample(&mut rng);
                T::from_f64(sample)
                    .ok_or_else(|| "Failed to convert random sample to tensor type".to_string())
            })
            .collect();
        Self::from_vec(data?, shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor_2x3() -> Tensor<f64> {
        Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap()
    }

    #[test]
    fn from_vec_rejects_bad_shape() {
        assert!(Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]).is_err());
    }

    #[test]
    fn elementwise_add_and_mul() {
        let a = tensor_2x3();
        let b = tensor_2x3();
        assert_eq!(a.add(&b).unwrap().to_vec(), vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0]);
        assert_eq!(a.mul(&b).unwrap().to_vec(), vec![1.0, 4.0, 9.0, 16.0, 25.0, 36.0]);
        let c = Tensor::<f64>::zeros(&[3, 2]).unwrap();
        assert!(a.add(&c).is_err());
    }

    #[test]
    fn equal_mask() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        let b = Tensor::from_vec(vec![1.0, 0.0, 3.0], &[3]).unwrap();
        assert_eq!(a.equal(&b).unwrap().to_vec(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn reductions_along_axes() {
        let t = tensor_2x3();
        assert_eq!(t.sum(Some(&[0]), false).unwrap().to_vec(), vec![5.0, 7.0, 9.0]);
        assert_eq!(t.mean(Some(&[1]), false).unwrap().to_vec(), vec![2.0, 5.0]);
        assert_eq!(t.max_reduce(Some(&[1]), false).unwrap().to_vec(), vec![3.0, 6.0]);
        assert_eq!(t.min_reduce(Some(&[0]), false).unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn reductions_keep_dims() {
        let t = tensor_2x3();
        let m = t.max_reduce(Some(&[1]), true).unwrap();
        assert_eq!(m.shape(), &[2, 1]);
        let full = t.sum(None, true).unwrap();
        assert_eq!(full.shape(), &[1, 1]);
        assert_eq!(full.first().unwrap(), 21.0);
    }

    #[test]
    fn full_reduction_is_scalar() {
        let t = tensor_2x3();
        let m = t.mean(None, false).unwrap();
        assert_eq!(m.shape(), &[] as &[usize]);
        assert_eq!(m.first().unwrap(), 3.5);
    }

    #[test]
    fn reduction_axis_out_of_bounds() {
        let t = tensor_2x3();
        assert!(t.sum(Some(&[2]), false).is_err());
    }

    #[test]
    fn index_select_with_duplicates() {
        let t = tensor_2x3();
        let picked = t.index_select(1, &[0, 0, 2]).unwrap();
        assert_eq!(picked.shape(), &[2, 3]);
        assert_eq!(picked.to_vec(), vec![1.0, 1.0, 3.0, 4.0, 4.0, 6.0]);
        assert_eq!(picked.get(&[1, 2]), Some(6.0));
        assert_eq!(picked.get(&[2, 0]), None);
        assert!(t.index_select(1, &[3]).is_err());
        assert!(t.index_select(2, &[0]).is_err());
    }

    #[test]
    fn index_add_accumulates_duplicates() {
        let mut target = Tensor::<f64>::zeros(&[3, 2]).unwrap();
        let src = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]).unwrap();
        // Rows 0 and 0 both land on target row 0.
        target.index_add(0, &[0, 0, 2], &src).unwrap();
        assert_eq!(target.to_vec(), vec![4.0, 6.0, 0.0, 0.0, 5.0, 6.0]);
    }

    #[test]
    fn stack_and_split() {
        let a = Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        let b = Tensor::from_vec(vec![3.0, 4.0], &[2]).unwrap();
        let stacked = Tensor::stack(&[&a, &b]).unwrap();
        assert_eq!(stacked.shape(), &[2, 2]);
        assert_eq!(stacked.index_axis(0, 1).unwrap().to_vec(), vec![3.0, 4.0]);
        let c = Tensor::<f64>::zeros(&[3]).unwrap();
        assert!(Tensor::stack(&[&a, &c]).is_err());
    }

    #[test]
    fn unsqueeze_and_broadcast() {
        let t = Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        let col = t.unsqueeze(1).unwrap();
        assert_eq!(col.shape(), &[2, 1]);
        let wide = col.broadcast_to(&[2, 3]).unwrap();
        assert_eq!(wide.to_vec(), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        assert!(col.broadcast_to(&[3, 3]).is_err());
    }

    #[test]
    fn randn_has_requested_shape() {
        let t = Tensor::<f32>::randn(&[2, 3, 4]).unwrap();
        assert_eq!(t.shape(), &[2, 3, 4]);
        assert_eq!(t.size(), 24);
    }
}
