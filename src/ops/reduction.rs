// src/ops/reduction.rs
// Reduction operations for the computational graph. These wrap the tensor
// reduction methods so gradients can flow through them; the pooling layer
// uses them to collapse the stacked window corners.

use crate::backend::{Float, Tensor};
use crate::ops::Operator;

/// Restores a reduced gradient to the input's shape: reduced axes come back
/// as extent-1 dimensions and are then broadcast; a full reduction turns the
/// scalar gradient into a constant tensor.
fn expand_reduction<T>(
    grad_output: Tensor<T>,
    axes: &Option<Vec<usize>>,
    input_shape: &[usize],
) -> Result<Tensor<T>, String>
where
    T: Float,
{
    match axes {
        Some(reduction_axes) => {
            let mut sorted_axes = reduction_axes.clone();
            sorted_axes.sort_unstable();
            sorted_axes.dedup();

            let mut grad = grad_output;
            for &axis in &sorted_axes {
                grad = grad.unsqueeze(axis)?;
            }
            if grad.shape() != input_shape {
                grad = grad.broadcast_to(input_shape)?;
            }
            Ok(grad)
        }
        None => {
            let scalar = grad_output.first()?;
            Tensor::full(input_shape, scalar)
        }
    }
}

macro_rules! check_unary {
    ($inputs:expr, $name:literal) => {
        if $inputs.len() != 1 {
            return Err(concat!($name, " operation requires exactly 1 input").to_string());
        }
    };
}

/// Max reduction: output = max(input, axes).
#[derive(Debug, Clone)]
pub struct Max {
    /// Axes to reduce along. If None, reduces all elements to a scalar.
    pub axes: Option<Vec<usize>>,
    /// Whether to keep the reduced dimensions as size 1.
    pub keep_dims: bool,
}

impl Max {
    pub fn new() -> Self {
        Self {
            axes: None,
            keep_dims: false,
        }
    }

    pub fn along_axes(axes: Vec<usize>, keep_dims: bool) -> Self {
        Self {
            axes: Some(axes),
            keep_dims,
        }
    }
}

impl Default for Max {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Operator<T> for Max
where
    T: Float,
{
    fn compute(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>, String> {
        check_unary!(inputs, "Max");
        inputs[0].max_reduce(self.axes.as_deref(), self.keep_dims)
    }

    fn gradient(
        &self,
        grad_output: Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>, String> {
        check_unary!(inputs, "Max");
        let input_shape = inputs[0].shape();

        // Mask where the input equals the (broadcast) maximum; the gradient
        // flows only there. Ties all receive the gradient.
        let max_values = inputs[0].max_reduce(self.axes.as_deref(), true)?;
        let restored_max = if max_values.shape() == input_shape {
            max_values
        } else {
            max_values.broadcast_to(input_shape)?
        };
        let mask = inputs[0].equal(&restored_max)?;

        let result_grad = if self.keep_dims && self.axes.is_some() {
            grad_output.broadcast_to(input_shape)?
        } else {
            expand_reduction(grad_output, &self.axes, input_shape)?
        };

        Ok(vec![result_grad.mul(&mask)?])
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn clone_op(&self) -> Box<dyn Operator<T>> {
        Box::new(self.clone())
    }
}

/// Mean reduction: output = mean(input, axes).
#[derive(Debug, Clone)]
pub struct Mean {
    /// Axes to reduce along. If None, reduces all elements to a scalar.
    pub axes: Option<Vec<usize>>,
    /// Whether to keep the reduced dimensions as size 1.
    pub keep_dims: bool,
}

impl Mean {
    pub fn new() -> Self {
        Self {
            axes: None,
            keep_dims: false,
        }
    }

    pub fn along_axes(axes: Vec<usize>, keep_dims: bool) -> Self {
        Self {
            axes: Some(axes),
            keep_dims,
        }
    }
}

impl Default for Mean {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Operator<T> for Mean
where
    T: Float,
{
    fn compute(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>, String> {
        check_unary!(inputs, "Mean");
        inputs[0].mean(self.axes.as_deref(), self.keep_dims)
    }

    fn gradient(
        &self,
        grad_output: Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>, String> {
        check_unary!(inputs, "Mean");
        let input_shape = inputs[0].shape();

        let reduction_size = match &self.axes {
            Some(axes) => axes
                .iter()
                .map(|&axis| input_shape[axis])
                .product::<usize>(),
            None => input_shape.iter().product::<usize>(),
        };
        let scale = T::from_f64(1.0 / reduction_size as f64)
            .ok_or_else(|| "Failed to convert reduction scale to tensor type".to_string())?;
        let scaled_grad = grad_output.mul_scalar(scale)?;

        let result = if self.keep_dims && self.axes.is_some() {
            scaled_grad.broadcast_to(input_shape)?
        } else {
            expand_reduction(scaled_grad, &self.axes, input_shape)?
        };
        Ok(vec![result])
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn clone_op(&self) -> Box<dyn Operator<T>> {
        Box::new(self.clone())
    }
}

/// Min reduction: output = min(input, axes).
#[derive(Debug, Clone)]
pub struct Min {
    /// Axes to reduce along. If None, reduces all elements to a scalar.
    pub axes: Option<Vec<usize>>,
    /// Whether to keep the reduced dimensions as size 1.
    pub keep_dims: bool,
}

impl Min {
    pub fn new() -> Self {
        Self {
            axes: None,
            keep_dims: false,
        }
    }

    pub fn along_axes(axes: Vec<usize>, keep_dims: bool) -> Self {
        Self {
            axes: Some(axes),
            keep_dims,
        }
    }
}

impl Default for Min {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Operator<T> for Min
where
    T: Float,
{
    fn compute(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>, String> {
        check_unary!(inputs, "Min");
        inputs[0].min_reduce(self.axes.as_deref(), self.keep_dims)
    }

    fn gradient(
        &self,
        grad_output: Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>, String> {
        check_unary!(inputs, "Min");
        let input_shape = inputs[0].shape();

        let min_values = inputs[0].min_reduce(self.axes.as_deref(), true)?;
        let restored_min = if min_values.shape() == input_shape {
            min_values
        } else {
            min_values.broadcast_to(input_shape)?
        };
        let mask = inputs[0].equal(&restored_min)?;

        let result_grad = if self.keep_dims && self.axes.is_some() {
            grad_output.broadcast_to(input_shape)?
        } else {
            expand_reduction(grad_output, &self.axes, input_shape)?
        };

        Ok(vec![result_grad.mul(&mask)?])
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn clone_op(&self) -> Box<dyn Operator<T>> {
        Box::new(self.clone())
    }
}
