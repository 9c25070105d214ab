// src/nn/layers/pooling.rs
// Stochastic fractional pooling for 4D [batch, channels, height, width]
// tensors. The spatial reduction ratio is a real number in [1, 2] per axis:
// windows advance by randomly permuted mixtures of 1 and 2, re-drawn on every
// forward pass, and each window is reduced over its four corner samples.

use crate::backend::Float;
use crate::graph::{GraphEngine, NodeId};
use crate::nn::Module;
use crate::nn::sampling::{
    PermutationSource, ThreadRngPermutation, pooled_extent, sample_windows,
};
use crate::ops::Operator;
use crate::ops::gather::{IndexSelect, Stack};
use crate::ops::reduction::{Max, Mean, Min};
use std::marker::PhantomData;
use std::sync::Arc;

/// How the four corner samples of each pooling window are combined.
/// Swapping the reduction never changes which coordinates are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolReduction {
    #[default]
    Max,
    Mean,
    Min,
}

/// Fractional pooling layer with stochastic, overlapping windows.
///
/// Input shape: [batch_size, channels, height, width]
/// Output shape: [batch_size, channels, ceil(height / ratio_h), ceil(width / ratio_w)]
///
/// The ratio and reduction are fixed at construction; window coordinates are
/// ephemeral and re-sampled per call, so two forward passes over the same
/// input generally differ. Use a seeded or fixed `PermutationSource` when
/// reproducibility matters.
#[derive(Debug, Clone)]
pub struct FractionalPool2d<T>
where
    T: Float,
{
    /// Pooling ratio (height, width), each component in [1, 2]
    ratio: (f64, f64),
    /// Corner reduction applied along the stacked sample axis
    reduction: PoolReduction,
    /// Source of the per-call step permutations
    permutations: Arc<dyn PermutationSource>,
    /// Training mode flag
    training: bool,
    /// Phantom data for type parameter
    _phantom: PhantomData<T>,
}

impl<T> FractionalPool2d<T>
where
    T: Float,
{
    /// Creates a fractional max-pooling layer. Fails when either ratio
    /// component lies outside [1, 2].
    pub fn new(ratio: (f64, f64)) -> Result<Self, String> {
        Self::with_reduction(ratio, PoolReduction::default())
    }

    /// Creates a fractional pooling layer with an explicit corner reduction.
    pub fn with_reduction(ratio: (f64, f64), reduction: PoolReduction) -> Result<Self, String> {
        for (axis, r) in [("height", ratio.0), ("width", ratio.1)] {
            if !(1.0..=2.0).contains(&r) {
                return Err(format!(
                    "FractionalPool2d {} ratio must lie in [1, 2], got {}",
                    axis, r
                ));
            }
        }
        Ok(Self {
            ratio,
            reduction,
            permutations: Arc::new(ThreadRngPermutation),
            training: true,
            _phantom: PhantomData,
        })
    }

    /// Replaces the permutation source, e.g. with a seeded one.
    pub fn with_permutations(mut self, source: Arc<dyn PermutationSource>) -> Self {
        self.permutations = source;
        self
    }

    pub fn ratio(&self) -> (f64, f64) {
        self.ratio
    }

    pub fn reduction(&self) -> PoolReduction {
        self.reduction
    }

    /// Output shape for a given input shape. Batch and channel counts pass
    /// through; spatial extents shrink to ceil(extent / ratio). The forward
    /// pass always produces exactly this shape.
    pub fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, String> {
        if input_shape.len() != 4 {
            return Err(
                "FractionalPool2d requires 4D input [batch, channels, height, width]".to_string(),
            );
        }
        Ok(vec![
            input_shape[0],
            input_shape[1],
            pooled_extent(input_shape[2], self.ratio.0),
            pooled_extent(input_shape[3], self.ratio.1),
        ])
    }

    fn reduction_op(&self) -> Box<dyn Operator<T>> {
        // Reduce along the stacked corner axis, dropping it again.
        match self.reduction {
            PoolReduction::Max => Box::new(Max::along_axes(vec![0], false)),
            PoolReduction::Mean => Box::new(Mean::along_axes(vec![0], false)),
            PoolReduction::Min => Box::new(Min::along_axes(vec![0], false)),
        }
    }
}

impl<T> Module<T> for FractionalPool2d<T>
where
    T: Float,
{
    /// Forward pass: sample fresh window coordinates per axis, gather the
    /// four corner slices of every window, stack them and reduce.
    fn forward(&self, graph: &mut GraphEngine<T>, input: NodeId) -> Result<NodeId, String> {
        let input_shape = graph
            .get_tensor(input)
            .ok_or("Input tensor not found in graph")?
            .shape()
            .to_vec();

        if input_shape.len() != 4 {
            return Err(
                "FractionalPool2d requires 4D input [batch, channels, height, width]".to_string(),
            );
        }

        // Independent draws per axis, per call. Nothing is cached.
        let rows = sample_windows(input_shape[2], self.ratio.0, self.permutations.as_ref())?;
        let cols = sample_windows(input_shape[3], self.ratio.1, self.permutations.as_ref())?;

        // Corner order: (start,start), (next,start), (start,next), (next,next).
        let mut corners = Vec::with_capacity(4);
        for col_coords in [&cols.starts, &cols.nexts] {
            for row_coords in [&rows.starts, &rows.nexts] {
                let picked_rows = graph.apply_operation(
                    Box::new(IndexSelect::new(2, row_coords.clone())),
                    vec![input],
                )?;
                let corner = graph.apply_operation(
                    Box::new(IndexSelect::new(3, col_coords.clone())),
                    vec![picked_rows],
                )?;
                corners.push(corner);
            }
        }

        let stacked = graph.apply_operation(Box::new(Stack::new(corners.len())), corners)?;
        graph.apply_operation(self.reduction_op(), vec![stacked])
    }

    fn training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}
