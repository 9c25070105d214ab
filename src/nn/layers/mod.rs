// src/nn/layers/mod.rs
// Module declaration and tests for neural network layers.

pub mod pooling;

pub use pooling::{FractionalPool2d, PoolReduction};
