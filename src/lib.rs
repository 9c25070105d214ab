//! # Fracpool
//!
//! Fracpool is a lightweight, CPU-based stochastic fractional max pooling
//! library built on a small reverse-mode automatic differentiation engine.
//!
//! ## Features
//!
//! - Fractional pooling with per-axis ratios in `[1, 2]` and randomly
//!   permuted window layouts
//! - Max, mean, and min window reductions
//! - Reverse-mode automatic differentiation (backpropagation)
//! - Eager and lazy computation graph evaluation
//! - Tensor support via `ndarray`
//! - Written 100% in safe Rust
//!
//! ## Example
//!
//! ```
//! use fracpool::backend::Tensor;
//! use fracpool::graph::GraphEngine;
//! use fracpool::nn::{FractionalPool2d, Module};
//!
//! let mut engine = GraphEngine::<f64>::new();
//! let image = Tensor::from_vec((0..16).map(|v| v as f64).collect(), &[1, 1, 4, 4])?;
//! let input = engine.create_variable(image, true);
//!
//! let pool = FractionalPool2d::new((1.5, 1.5))?;
//! let output = pool.forward(&mut engine, input)?;
//! assert_eq!(engine.get_tensor(output).unwrap().shape(), &[1, 1, 3, 3]);
//! # Ok::<(), String>(())
//! ```

pub mod backend;
pub mod graph;
pub mod nn;
pub mod ops;

// Re-export commonly used types for convenience
pub use backend::{Float, Numeric, Tensor};
pub use graph::{EvaluationMode, GraphEngine, NodeId};
pub use nn::{FractionalPool2d, Module, PoolReduction};
