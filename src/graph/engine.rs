use crate::backend::{Float, Tensor};
use crate::ops::Operator;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Atomic auto-incrementing id for all nodes.
static NODE_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn new() -> Self {
        Self(NODE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluation mode for newly applied operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// Build pending nodes and defer computation until `evaluate`.
    Lazy,
    /// Compute immediately when an operation is applied.
    Eager,
}

#[derive(Debug)]
pub enum NodeState<T>
where
    T: Float,
{
    /// Leaf node with a materialized tensor.
    Leaf(Tensor<T>),

    /// Operation recorded but not computed yet (lazy mode).
    Pending {
        op: Box<dyn Operator<T>>,
        inputs: Vec<NodeId>,
    },

    /// Computed node with its result cached. `op` is `None` only for leaves
    /// promoted through this state.
    Evaluated {
        tensor: Tensor<T>,
        op: Option<Box<dyn Operator<T>>>,
        inputs: Vec<NodeId>,
    },
}

impl<T> Clone for NodeState<T>
where
    T: Float,
{
    fn clone(&self) -> Self {
        match self {
            NodeState::Leaf(tensor) => NodeState::Leaf(tensor.clone()),
            NodeState::Pending { op, inputs } => NodeState::Pending {
                op: op.clone_op(),
                inputs: inputs.clone(),
            },
            NodeState::Evaluated { tensor, op, inputs } => NodeState::Evaluated {
                tensor: tensor.clone(),
                op: op.as_ref().map(|o| o.clone_op()),
                inputs: inputs.clone(),
            },
        }
    }
}

/// Computational graph node.
#[derive(Debug, Clone)]
pub struct Node<T>
where
    T: Float,
{
    pub id: NodeId,
    pub state: NodeState<T>,
    pub requires_grad: bool,
}

impl<T> Node<T>
where
    T: Float,
{
    pub fn new_leaf(tensor: Tensor<T>, requires_grad: bool) -> Self {
        Self {
            id: NodeId::new(),
            state: NodeState::Leaf(tensor),
            requires_grad,
        }
    }

    pub fn new_lazy(op: Box<dyn Operator<T>>, inputs: Vec<NodeId>, requires_grad: bool) -> Self {
        Self {
            id: NodeId::new(),
            state: NodeState::Pending { op, inputs },
            requires_grad,
        }
    }

    pub fn new_evaluated(
        tensor: Tensor<T>,
        op: Option<Box<dyn Operator<T>>>,
        inputs: Vec<NodeId>,
        requires_grad: bool,
    ) -> Self {
        Self {
            id: NodeId::new(),
            state: NodeState::Evaluated { tensor, op, inputs },
            requires_grad,
        }
    }

    pub fn get_tensor(&self) -> Option<&Tensor<T>> {
        match &self.state {
            NodeState::Leaf(tensor) => Some(tensor),
            NodeState::Evaluated { tensor, .. } => Some(tensor),
            NodeState::Pending { .. } => None,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        !matches!(self.state, NodeState::Pending { .. })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.state, NodeState::Leaf(_))
    }
}

/// Main computational graph engine: owns the nodes, evaluates operations
/// either eagerly or lazily, and runs reverse-mode differentiation.
#[derive(Debug)]
pub struct GraphEngine<T>
where
    T: Float,
{
    nodes: HashMap<NodeId, Node<T>>,
    gradients: HashMap<NodeId, Tensor<T>>,
    training_mode: bool,
    evaluation_mode: EvaluationMode,
}

impl<T> Default for GraphEngine<T>
where
    T: Float,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GraphEngine<T>
where
    T: Float,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            gradients: HashMap::new(),
            training_mode: true,
            evaluation_mode: EvaluationMode::Eager,
        }
    }

    pub fn set_evaluation_mode(&mut self, mode: EvaluationMode) {
        self.evaluation_mode = mode;
    }

    pub fn evaluation_mode(&self) -> EvaluationMode {
        self.evaluation_mode
    }

    pub fn lazy_mode(&mut self) {
        self.evaluation_mode = EvaluationMode::Lazy;
    }

    pub fn eager_mode(&mut self) {
        self.evaluation_mode = EvaluationMode::Eager;
    }

    pub fn set_training(&mut self, training: bool) {
        self.training_mode = training;
    }

    pub fn is_training(&self) -> bool {
        self.training_mode
    }

    /// Registers a new leaf node holding `tensor`.
    pub fn create_variable(&mut self, tensor: Tensor<T>, requires_grad: bool) -> NodeId {
        let node = Node::new_leaf(tensor, requires_grad);
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node<T>> {
        self.nodes.get(&node_id)
    }

    pub fn get_tensor(&self, node_id: NodeId) -> Option<&Tensor<T>> {
        self.nodes.get(&node_id)?.get_tensor()
    }

    pub fn get_gradient(&self, node_id: NodeId) -> Option<&Tensor<T>> {
        self.gradients.get(&node_id)
    }

    pub fn is_evaluated(&self, node_id: NodeId) -> bool {
        self.nodes
            .get(&node_id)
            .is_some_and(|node| node.is_evaluated())
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_pending_nodes(&self) -> usize {
        self.nodes
            .values()
            .filter(|node| !node.is_evaluated())
            .count()
    }

    pub fn zero_gradients(&mut self) {
        self.gradients.clear();
    }

    fn validate_inputs(
        &self,
        op: &dyn Operator<T>,
        input_ids: &[NodeId],
    ) -> Result<(), String> {
        for &input_id in input_ids {
            if !self.nodes.contains_key(&input_id) {
                return Err(format!("Input node {} not found", input_id.0));
            }
        }
        if input_ids.len() != op.num_inputs() {
            return Err(format!(
                "Operation {} expects {} inputs, got {}",
                op.name(),
                op.num_inputs(),
                input_ids.len()
            ));
        }
        Ok(())
    }

    /// Applies `op` to the given input nodes. In eager mode the result is
    /// computed immediately; in lazy mode a pending node is recorded.
    pub fn apply_operation(
        &mut self,
        op: Box<dyn Operator<T>>,
        input_ids: Vec<NodeId>,
    ) -> Result<NodeId, String> {
        self.validate_inputs(op.as_ref(), &input_ids)?;

        match self.evaluation_mode {
            EvaluationMode::Lazy => {
                let node = Node::new_lazy(op, input_ids, true);
                let id = node.id;
                self.nodes.insert(id, node);
                Ok(id)
            }
            EvaluationMode::Eager => {
                for &input_id in &input_ids {
                    if !self.is_evaluated(input_id) {
                        self.evaluate_node(input_id)?;
                    }
                }

                let result_tensor = {
                    let input_tensors = self.collect_input_tensors(&input_ids)?;
                    op.compute(&input_tensors)?
                };

                // The op is retained for the backward pass.
                let node = Node::new_evaluated(result_tensor, Some(op), input_ids, true);
                let id = node.id;
                self.nodes.insert(id, node);
                Ok(id)
            }
        }
    }

    /// Forces evaluation of a node and returns its tensor.
    pub fn evaluate(&mut self, node_id: NodeId) -> Result<&Tensor<T>, String> {
        self.evaluate_node(node_id)?;
        self.get_tensor(node_id)
            .ok_or_else(|| format!("Failed to evaluate node {}", node_id.0))
    }

    fn evaluate_node(&mut self, node_id: NodeId) -> Result<(), String> {
        if self.is_evaluated(node_id) {
            return Ok(());
        }

        let (op, input_ids) = {
            let node = self
                .nodes
                .get(&node_id)
                .ok_or_else(|| format!("Node {} not found", node_id.0))?;
            match &node.state {
                NodeState::Pending { op, inputs } => (op.clone_op(), inputs.clone()),
                _ => return Ok(()),
            }
        };

        for &input_id in &input_ids {
            self.evaluate_node(input_id)?;
        }

        let result_tensor = {
            let input_tensors = self.collect_input_tensors(&input_ids)?;
            op.compute(&input_tensors)?
        };

        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.state = NodeState::Evaluated {
                tensor: result_tensor,
                op: Some(op),
                inputs: input_ids,
            };
        }
        Ok(())
    }

    fn collect_input_tensors(&self, input_ids: &[NodeId]) -> Result<Vec<&Tensor<T>>, String> {
        input_ids
            .iter()
            .map(|&input_id| {
                self.get_tensor(input_id)
                    .ok_or_else(|| format!("Input node {} not evaluated", input_id.0))
            })
            .collect()
    }

    /// Reverse-mode differentiation from `loss_id` down to the leaves.
    pub fn backward(&mut self, loss_id: NodeId) -> Result<(), String> {
        if !self.training_mode {
            return Ok(());
        }

        if !self.is_evaluated(loss_id) {
            return Err(
                "Cannot run backward on an unevaluated node. Call evaluate() first.".to_string(),
            );
        }

        let loss_tensor = self
            .get_tensor(loss_id)
            .ok_or_else(|| "Loss node not found".to_string())?;
        let seed_grad = Tensor::ones(loss_tensor.shape())?;
        self.gradients.insert(loss_id, seed_grad);

        let mut visited = HashSet::new();
        let mut topo_order = Vec::new();
        self.topological_sort(loss_id, &mut visited, &mut topo_order);
        topo_order.reverse();

        for &node_id in &topo_order {
            self.backward_node(node_id)?;
        }
        Ok(())
    }

    fn backward_node(&mut self, node_id: NodeId) -> Result<(), String> {
        let grad_output = match self.gradients.remove(&node_id) {
            Some(grad) => grad,
            None => return Ok(()),
        };

        let (op, input_ids, output) = {
            let node = self
                .nodes
                .get(&node_id)
                .ok_or_else(|| format!("Node {} not found", node_id.0))?;
            match &node.state {
                NodeState::Evaluated {
                    tensor,
                    op: Some(op),
                    inputs,
                } => (op.clone_op(), inputs.clone(), tensor.clone()),
                _ => {
                    // Leaf: the gradient stops here.
                    self.gradients.insert(node_id, grad_output);
                    return Ok(());
                }
            }
        };

        let input_grads = {
            let input_tensors = self.collect_input_tensors(&input_ids)?;
            op.gradient(grad_output, &input_tensors, &output)?
        };

        if input_grads.len() != input_ids.len() {
            return Err(format!(
                "Operation {} produced {} gradients for {} inputs",
                op.name(),
                input_grads.len(),
                input_ids.len()
            ));
        }

        for (&input_id, input_grad) in input_ids.iter().zip(input_grads) {
            self.accumulate_gradient(input_id, input_grad)?;
        }
        Ok(())
    }

    fn accumulate_gradient(&mut self, node_id: NodeId, grad: Tensor<T>) -> Result<(), String> {
        match self.gradients.remove(&node_id) {
            Some(existing) => {
                let accumulated = existing.add(&grad)?;
                self.gradients.insert(node_id, accumulated);
            }
            None => {
                self.gradients.insert(node_id, grad);
            }
        }
        Ok(())
    }

    fn topological_sort(
        &self,
        node_id: NodeId,
        visited: &mut HashSet<NodeId>,
        topo_order: &mut Vec<NodeId>,
    ) {
        if !visited.insert(node_id) {
            return;
        }
        if let Some(node) = self.nodes.get(&node_id) {
            if let NodeState::Evaluated { inputs, .. } = &node.state {
                for &input_id in inputs {
                    self.topological_sort(input_id, visited, topo_order);
                }
            }
        }
        topo_order.push(node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::reduction::Mean;

    fn leaf(engine: &mut GraphEngine<f64>, values: &[f64]) -> NodeId {
        let tensor = Tensor::from_vec(values.to_vec(), &[values.len()]).unwrap();
        engine.create_variable(tensor, true)
    }

    #[test]
    fn eager_mode_evaluates_immediately() {
        let mut engine = GraphEngine::<f64>::new();
        let input = leaf(&mut engine, &[1.0, 2.0, 3.0]);
        let out = engine
            .apply_operation(Box::new(Mean::new()), vec![input])
            .unwrap();
        assert!(engine.is_evaluated(out));
        assert_eq!(engine.get_tensor(out).unwrap().first().unwrap(), 2.0);
        assert!(engine.get_node(input).unwrap().is_leaf());
        assert!(!engine.get_node(out).unwrap().is_leaf());
        assert_eq!(engine.num_nodes(), 2);
    }

    #[test]
    fn mode_accessors() {
        let mut engine = GraphEngine::<f64>::new();
        assert_eq!(engine.evaluation_mode(), EvaluationMode::Eager);
        engine.set_evaluation_mode(EvaluationMode::Lazy);
        assert_eq!(engine.evaluation_mode(), EvaluationMode::Lazy);
        engine.eager_mode();
        assert_eq!(engine.evaluation_mode(), EvaluationMode::Eager);
        assert!(engine.is_training());
    }

    #[test]
    fn backward_is_a_no_op_outside_training() {
        let mut engine = GraphEngine::<f64>::new();
        engine.set_training(false);
        let input = leaf(&mut engine, &[1.0, 2.0]);
        let out = engine
            .apply_operation(Box::new(Mean::new()), vec![input])
            .unwrap();
        engine.backward(out).unwrap();
        assert!(engine.get_gradient(input).is_none());
    }

    #[test]
    fn lazy_mode_defers_until_evaluate() {
        let mut engine = GraphEngine::<f64>::new();
        engine.lazy_mode();
        let input = leaf(&mut engine, &[2.0, 4.0]);
        let out = engine
            .apply_operation(Box::new(Mean::new()), vec![input])
            .unwrap();
        assert!(!engine.is_evaluated(out));
        assert_eq!(engine.num_pending_nodes(), 1);
        let tensor = engine.evaluate(out).unwrap();
        assert_eq!(tensor.first().unwrap(), 3.0);
        assert_eq!(engine.num_pending_nodes(), 0);
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let mut engine = GraphEngine::<f64>::new();
        let a = leaf(&mut engine, &[1.0]);
        let b = leaf(&mut engine, &[2.0]);
        let result = engine.apply_operation(Box::new(Mean::new()), vec![a, b]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_input_is_rejected() {
        let mut engine = GraphEngine::<f64>::new();
        let ghost = NodeId::new();
        let result = engine.apply_operation(Box::new(Mean::new()), vec![ghost]);
        assert!(result.is_err());
    }

    #[test]
    fn backward_reaches_leaves_and_zeroes() {
        let mut engine = GraphEngine::<f64>::new();
        let input = leaf(&mut engine, &[1.0, 3.0, 5.0, 7.0]);
        let out = engine
            .apply_operation(Box::new(Mean::new()), vec![input])
            .unwrap();
        engine.backward(out).unwrap();
        let grad = engine.get_gradient(input).unwrap();
        assert_eq!(grad.shape(), &[4]);
        assert_eq!(grad.to_vec(), vec![0.25, 0.25, 0.25, 0.25]);
        engine.zero_gradients();
        assert!(engine.get_gradient(input).is_none());
    }
}
