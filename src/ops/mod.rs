// src/ops/mod.rs
// Operators for the computational graph. Every node-producing computation
// implements the common Operator trait so the engine can evaluate it and run
// the backward pass without knowing the concrete operation.

use crate::backend::{Float, Tensor};
use std::any::type_name;

pub mod gather;
pub mod reduction;

pub use gather::{IndexSelect, Stack};
pub use reduction::{Max, Mean, Min};

pub trait Operator<T>: std::fmt::Debug
where
    T: Float,
{
    /// Computes the forward result from the already materialized inputs.
    fn compute(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>, String>;

    /// Computes the gradient of the output with respect to each input,
    /// in input order.
    fn gradient(
        &self,
        grad_output: Tensor<T>,
        inputs: &[&Tensor<T>],
        output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>, String>;

    /// Number of inputs this operator expects.
    fn num_inputs(&self) -> usize;

    fn name(&self) -> String {
        let full_name = type_name::<Self>();
        full_name
            .rsplit("::")
            .next()
            .unwrap_or(full_name)
            .to_string()
    }

    fn clone_op(&self) -> Box<dyn Operator<T>>;
}

// TESTING UTILITIES
// Shared tensor constructors for the operator test modules.
#[cfg(test)]
pub(crate) fn tensor_1d(data: &[f64]) -> Tensor<f64> {
    Tensor::from_vec(data.to_vec(), &[data.len()]).expect("Tensor creation failed")
}

#[cfg(test)]
pub(crate) fn tensor_2d(data: &[f64], rows: usize, cols: usize) -> Tensor<f64> {
    Tensor::from_vec(data.to_vec(), &[rows, cols]).expect("Tensor creation failed")
}

#[cfg(test)]
pub(crate) fn tensor_4d(
    data: &[f64],
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
) -> Tensor<f64> {
    Tensor::from_vec(data.to_vec(), &[batch, channels, height, width])
        .expect("Tensor creation failed")
}

// Runs an op forward through the engine, checks shape and values, then runs
// backward from a Mean loss and checks each gradient shape.
#[cfg(test)]
macro_rules! test_op_with_values {
    ($op:expr, $inputs:expr, $expected_shape:expr, $expected_values:expr, $tolerance:expr, $name:literal) => {
        let mut graph = $crate::graph::GraphEngine::<f64>::new();

        let input_nodes: Vec<_> = $inputs
            .iter()
            .map(|t| graph.create_variable(t.clone(), true))
            .collect();

        let output_node = graph
            .apply_operation(Box::new($op), input_nodes.clone())
            .unwrap_or_else(|e| panic!("{} compute failed: {}", $name, e));

        let output = graph
            .get_tensor(output_node)
            .expect("Output tensor missing");
        assert_eq!(output.shape(), $expected_shape, "{} shape mismatch", $name);

        let actual = output.to_vec();
        let expected: &[f64] = $expected_values;
        assert_eq!(actual.len(), expected.len(), "{} length mismatch", $name);
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!(
                (a - e).abs() <= $tolerance,
                "{} value mismatch at index {}: expected {}, got {}",
                $name,
                i,
                e,
                a
            );
        }

        let loss_node = graph
            .apply_operation(
                Box::new($crate::ops::reduction::Mean::new()),
                vec![output_node],
            )
            .unwrap_or_else(|e| panic!("{} loss creation failed: {}", $name, e));

        graph
            .backward(loss_node)
            .unwrap_or_else(|e| panic!("{} backward pass failed: {}", $name, e));

        for (i, (&input_node, input_tensor)) in input_nodes.iter().zip(&$inputs).enumerate() {
            let grad = graph
                .get_gradient(input_node)
                .unwrap_or_else(|| panic!("{} gradient missing for input {}", $name, i));
            assert_eq!(
                grad.shape(),
                input_tensor.shape(),
                "{} gradient shape mismatch for input {}",
                $name,
                i
            );
        }
    };
}

#[cfg(test)]
pub(crate) use test_op_with_values;
