// src/ops/gather.rs
// Index-gather and stacking operations. FractionalPool2d composes these:
// two IndexSelect applications pick a window corner per output position, and
// Stack lines the four corners up for the reduction.

use crate::backend::{Float, Tensor};
use crate::ops::Operator;

/// Gathers sub-views along one axis at a fixed list of indices. Indices may
/// repeat and appear in any order; the output extent along `axis` equals the
/// number of indices.
#[derive(Debug, Clone)]
pub struct IndexSelect {
    axis: usize,
    indices: Vec<usize>,
}

impl IndexSelect {
    pub fn new(axis: usize, indices: Vec<usize>) -> Self {
        Self { axis, indices }
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl<T> Operator<T> for IndexSelect
where
    T: Float,
{
    fn compute(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>, String> {
        if inputs.len() != 1 {
            return Err("IndexSelect operation requires exactly 1 input".to_string());
        }
        inputs[0].index_select(self.axis, &self.indices)
    }

    fn gradient(
        &self,
        grad_output: Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>, String> {
        if inputs.len() != 1 {
            return Err("IndexSelect operation requires exactly 1 input".to_string());
        }
        // Adjoint of a gather is a scatter-add: positions selected more than
        // once accumulate their gradient contributions.
        let mut grad_input = Tensor::zeros(inputs[0].shape())?;
        grad_input.index_add(self.axis, &self.indices, &grad_output)?;
        Ok(vec![grad_input])
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn clone_op(&self) -> Box<dyn Operator<T>> {
        Box::new(self.clone())
    }
}

/// Stacks `count` equally shaped inputs along a new leading axis.
#[derive(Debug, Clone)]
pub struct Stack {
    count: usize,
}

impl Stack {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

impl<T> Operator<T> for Stack
where
    T: Float,
{
    fn compute(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>, String> {
        if inputs.len() != self.count {
            return Err(format!(
                "Stack operation requires exactly {} inputs, got {}",
                self.count,
                inputs.len()
            ));
        }
        Tensor::stack(inputs)
    }

    fn gradient(
        &self,
        grad_output: Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>, String> {
        if inputs.len() != self.count {
            return Err(format!(
                "Stack operation requires exactly {} inputs, got {}",
                self.count,
                inputs.len()
            ));
        }
        (0..self.count)
            .map(|i| grad_output.index_axis(0, i))
            .collect()
    }

    fn num_inputs(&self) -> usize {
        self.count
    }

    fn clone_op(&self) -> Box<dyn Operator<T>> {
        Box::new(self.clone())
    }
}
