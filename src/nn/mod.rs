// src/nn/mod.rs
// Neural network building blocks: the module trait, stochastic window
// sampling, and the layers built on top of the graph engine.

pub mod layers;
pub mod module;
pub mod sampling;

pub use layers::{FractionalPool2d, PoolReduction};
pub use module::Module;
pub use sampling::{
    IdentityPermutation, PermutationSource, SeededPermutation, ThreadRngPermutation,
};
