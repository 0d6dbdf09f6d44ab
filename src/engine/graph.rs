use std::collections::{ HashMap, HashSet };

use itertools::Itertools;

use crate::{
  shape::{ Shape, UNKNOWN },
  tensor::Tensor,
  engine::{ kernels, DType, Engine, EngineError, EngineResult, Op, Operand },
};


#[derive(Debug, Clone)]
enum Kind {
  Variable(String),
  Op(Op),
}

#[derive(Debug, Clone)]
struct Node {
  id: usize,
  kind: Kind,
  previous: Vec<usize>,
}


/// In-process reference [Engine].
///
/// Operations get appended to a flat node list. Fetching a node evaluates
/// its history in creation order, which is always a valid topological order
/// because operands must exist before the operations using them.

#[derive(Debug, Clone, Default)]
pub struct Graph {
  nodes: Vec<Node>,
  names: HashMap<String, usize>,
  variables: HashMap<String, Tensor>,
  closed: bool,
}

impl Graph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Names of all variables, in no particular order.

  pub fn variables(&self) -> impl Iterator<Item = &str> {
    self.variables.keys().map(|name| name.as_str() )
  }

  fn check_open(&self) -> EngineResult<()> {
    if self.closed { Err(EngineError::Closed) } else { Ok(()) }
  }

  fn register(&mut self, kind: Kind, previous: Vec<usize>, name: Option<&str>) -> EngineResult<Operand> {
    let id = self.nodes.len();
    if let Some(name) = name {
      if self.names.contains_key(name) {
        return Err(EngineError::DuplicateName(name.to_string()))
      }
      self.names.insert(name.to_string(), id);
    }
    log::trace!("graph node #{id}: {:?}", kind);
    self.nodes.push(Node { id, kind, previous });
    Ok(Operand(id))
  }

  fn lookup(&self, name: &str) -> EngineResult<usize> {
    self.names.get(name).copied().ok_or_else(|| EngineError::UnknownName(name.to_string()) )
  }

  fn history(&self, outputs: &[usize]) -> Vec<usize> {
    let mut visited = HashSet::new();
    for &id in outputs {
      self.history_recurse(id, &mut visited);
    }
    visited.into_iter().sorted().collect()
  }

  fn history_recurse(&self, id: usize, visited: &mut HashSet<usize>) {
    if !visited.insert(id) { return }
    for &prev in &self.nodes[id].previous {
      self.history_recurse(prev, visited);
    }
  }

  fn evaluate(&self, node: &Node, values: &HashMap<usize, Tensor>, feeds: &HashMap<usize, &Tensor>) -> EngineResult<Tensor> {
    let inputs: Vec<&Tensor> = node.previous.iter().map(|id| &values[id] ).collect();
    match &node.kind {
      Kind::Variable(name) => self.variables.get(name)
        .cloned()
        .ok_or_else(|| EngineError::UnknownName(name.clone()) ),
      Kind::Op(op) => match op {
        Op::Placeholder { shape } => {
          let value = feeds.get(&node.id).ok_or_else(|| {
            let name = self.names.iter()
              .find(|(_, &id)| id == node.id )
              .map_or_else(|| format!("#{}", node.id), |(name, _)| name.clone() );
            EngineError::MissingFeed(name)
          })?;
          check_feed(shape, value)?;
          Ok((*value).clone())
        },
        Op::Constant(tensor) => Ok(tensor.clone()),
        Op::Conv2D { strides, padding } => kernels::conv2d(inputs[0], inputs[1], *strides, *padding),
        Op::DepthwiseConv2D { strides, padding } => kernels::depthwise_conv2d(inputs[0], inputs[1], *strides, *padding),
        Op::MaxPool { window, strides, padding } => kernels::max_pool(inputs[0], *window, *strides, *padding),
        Op::AvgPool { window, strides, padding } => kernels::avg_pool(inputs[0], *window, *strides, *padding),
        Op::Slice { begin, size } => kernels::slice(inputs[0], begin, size),
        Op::Reshape { shape } => kernels::reshape(inputs[0], shape),
        Op::MatMul => kernels::matmul(inputs[0], inputs[1]),
        Op::BiasAdd => kernels::bias_add(inputs[0], inputs[1]),
        Op::Relu { max_value, threshold } => Ok(kernels::relu(inputs[0], *max_value, *threshold)),
        Op::Sigmoid => Ok(kernels::sigmoid(inputs[0])),
        Op::Tanh => Ok(kernels::tanh(inputs[0])),
        Op::Softplus => Ok(kernels::softplus(inputs[0])),
        Op::Softmax => Ok(kernels::softmax(inputs[0])),
        Op::Identity => Ok(inputs[0].clone()),
        Op::MeanSquaredError => kernels::mean_squared_error(inputs[0], inputs[1]),
        Op::SoftmaxCrossEntropy => kernels::softmax_cross_entropy(inputs[0], inputs[1]),
      },
    }
  }
}

fn check_feed(shape: &Shape, value: &Tensor) -> EngineResult<()> {
  let fits = shape.rank() == value.rank() &&
    shape.dims.iter().zip(value.dims()).all(|(&want, &got)| want == UNKNOWN || want as usize == got );
  if fits { Ok(()) } else {
    Err(EngineError::ShapeMismatch(format!("cannot feed {:?} into placeholder of shape {shape}", value.dims())))
  }
}

impl Engine for Graph {
  fn create_variable(&mut self, name: &str, dims: &[usize], _dtype: DType) -> EngineResult<Operand> {
    self.check_open()?;
    let operand = self.register(Kind::Variable(name.to_string()), vec![], Some(name))?;
    self.variables.insert(name.to_string(), Tensor::zeros(dims));
    Ok(operand)
  }

  fn assign(&mut self, name: &str, value: Tensor) -> EngineResult<()> {
    self.check_open()?;
    let current = self.variables.get_mut(name)
      .ok_or_else(|| EngineError::UnknownName(name.to_string()) )?;
    if current.dims() != value.dims() {
      return Err(EngineError::ShapeMismatch(
        format!("cannot assign {:?} to variable '{name}' of shape {:?}", value.dims(), current.dims())
      ))
    }
    *current = value;
    Ok(())
  }

  fn build_op(&mut self, op: Op, operands: &[Operand], name: Option<&str>) -> EngineResult<Operand> {
    self.check_open()?;
    if operands.len() != op.arity() {
      return Err(EngineError::ShapeMismatch(
        format!("{:?} takes {} operands, got {}", op, op.arity(), operands.len())
      ))
    }
    if let Some(unknown) = operands.iter().find(|operand| operand.0 >= self.nodes.len() ) {
      return Err(EngineError::UnknownOperand(unknown.0))
    }
    let previous = operands.iter().map(|operand| operand.0 ).collect();
    self.register(Kind::Op(op), previous, name)
  }

  fn run_fetch(&mut self, feeds: &[(&str, &Tensor)], fetches: &[&str]) -> EngineResult<Vec<Tensor>> {
    self.check_open()?;
    let feeds = feeds.iter()
      .map(|&(name, tensor)| Ok((self.lookup(name)?, tensor)) )
      .collect::<EngineResult<HashMap<_, _>>>()?;
    let outputs = fetches.iter()
      .map(|name| self.lookup(name) )
      .collect::<EngineResult<Vec<_>>>()?;

    let mut values = HashMap::new();
    for id in self.history(&outputs) {
      let value = self.evaluate(&self.nodes[id], &values, &feeds)?;
      values.insert(id, value);
    }
    Ok(outputs.iter().map(|id| values[id].clone() ).collect())
  }

  fn close(&mut self) -> EngineResult<()> {
    self.check_open()?;
    log::debug!("closing graph session with {} nodes", self.nodes.len());
    self.closed = true;
    self.variables.clear();
    Ok(())
  }

  fn is_closed(&self) -> bool {
    self.closed
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::contract::Padding;

  #[test]
  fn fetch_variable() {
    let mut graph = Graph::new();
    graph.create_variable("w", &[2], DType::Float32).unwrap();
    graph.assign("w", Tensor::vec(&[1.0, 2.0])).unwrap();
    let out = graph.run_fetch(&[], &["w"]).unwrap();
    assert_eq!(out, vec![Tensor::vec(&[1.0, 2.0])]);
  }

  #[test]
  fn feed_and_compute() {
    let mut graph = Graph::new();
    let x = graph.build_op(Op::Placeholder { shape: Shape::new(&[-1, 2]) }, &[], Some("x")).unwrap();
    let b = graph.create_variable("b", &[2], DType::Float32).unwrap();
    graph.assign("b", Tensor::vec(&[10.0, 20.0])).unwrap();
    let y = graph.build_op(Op::BiasAdd, &[x, b], None).unwrap();
    graph.build_op(Op::Relu { max_value: None, threshold: 0.0 }, &[y], Some("y")).unwrap();

    let input = Tensor::new(&[1, 2], vec![-30.0, 1.0]);
    let out = graph.run_fetch(&[("x", &input)], &["y"]).unwrap();
    assert_eq!(out[0].raw(), &[0.0, 21.0]);
  }

  #[test]
  fn missing_feed() {
    let mut graph = Graph::new();
    graph.build_op(Op::Placeholder { shape: Shape::new(&[-1]) }, &[], Some("x")).unwrap();
    assert_eq!(graph.run_fetch(&[], &["x"]), Err(EngineError::MissingFeed("x".into())));
  }

  #[test]
  fn wrong_feed_shape() {
    let mut graph = Graph::new();
    graph.build_op(Op::Placeholder { shape: Shape::new(&[-1, 3]) }, &[], Some("x")).unwrap();
    let input = Tensor::zeros(&[1, 2]);
    assert!(matches!(graph.run_fetch(&[("x", &input)], &["x"]), Err(EngineError::ShapeMismatch(_))));
  }

  #[test]
  fn duplicate_names() {
    let mut graph = Graph::new();
    graph.create_variable("w", &[1], DType::Float32).unwrap();
    assert_eq!(
      graph.create_variable("w", &[1], DType::Float32),
      Err(EngineError::DuplicateName("w".into()))
    );
  }

  #[test]
  fn arity_and_unknown_operands() {
    let mut graph = Graph::new();
    assert!(graph.build_op(Op::MatMul, &[], None).is_err());
    assert_eq!(graph.build_op(Op::Identity, &[Operand(3)], None), Err(EngineError::UnknownOperand(3)));
  }

  #[test]
  fn zero_strides_fail_at_run() {
    let mut graph = Graph::new();
    let x = graph.build_op(Op::Placeholder { shape: Shape::new(&[-1, 3, 3, 1]) }, &[], Some("x")).unwrap();
    let k = graph.build_op(Op::Constant(Tensor::ones(&[1, 1, 1, 1])), &[], None).unwrap();
    graph.build_op(Op::Conv2D { strides: [0, 0], padding: Padding::Same }, &[x, k], Some("y")).unwrap();
    let input = Tensor::zeros(&[1, 3, 3, 1]);
    assert!(matches!(graph.run_fetch(&[("x", &input)], &["y"]), Err(EngineError::ShapeMismatch(_))));
  }

  #[test]
  fn closed_session() {
    let mut graph = Graph::new();
    graph.create_variable("w", &[1], DType::Float32).unwrap();
    graph.close().unwrap();
    assert!(graph.is_closed());
    assert_eq!(graph.run_fetch(&[], &["w"]), Err(EngineError::Closed));
    assert_eq!(graph.close(), Err(EngineError::Closed));
  }
}
