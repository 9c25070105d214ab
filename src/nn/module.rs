use crate::backend::Float;
use crate::graph::{GraphEngine, NodeId};

/// The base trait for all neural network modules.
///
/// A module maps an input node to an output node on a graph engine and
/// carries a training/evaluation flag. Layers in this crate hold no learnable
/// parameters, so there is no parameter collection here; a module is just a
/// forward function plus its mode.
pub trait Module<T>
where
    T: Float,
{
    /// Performs the forward pass of the module, returning the output node.
    fn forward(&self, graph: &mut GraphEngine<T>, input: NodeId) -> Result<NodeId, String>;

    /// Returns whether the module is in training mode.
    fn training(&self) -> bool {
        true
    }

    /// Sets the training mode for this module.
    fn set_training(&mut self, training: bool);

    /// Equivalent to `set_training(false)`.
    fn eval(&mut self) {
        self.set_training(false);
    }

    /// Equivalent to `set_training(true)`.
    fn train(&mut self) {
        self.set_training(true);
    }
}
