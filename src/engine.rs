//! The narrow capability interface layers use to talk to a tensor engine.
//!
//! Layers never touch engine internals. They create named variables,
//! append operations to the engine's graph and let the model fetch results.

use serde::{Serialize, Deserialize};
use thiserror::Error;

mod graph;
mod kernels;

pub use graph::Graph;

use crate::{
  contract::Padding,
  shape::Shape,
  tensor::Tensor,
};


pub type EngineResult<T> = std::result::Result<T, EngineError>;


#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
  #[error("operand #{0} does not belong to this graph")]
  UnknownOperand(usize),

  #[error("nothing named '{0}' in this graph")]
  UnknownName(String),

  #[error("the name '{0}' is already taken")]
  DuplicateName(String),

  #[error("placeholder '{0}' needs to be fed")]
  MissingFeed(String),

  #[error("shape mismatch: {0}")]
  ShapeMismatch(String),

  #[error("unsupported operation: {0}")]
  Unsupported(String),

  #[error("session is closed")]
  Closed,
}


/// Handle to a node in an engine's computation graph.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand(pub(crate) usize);

impl Operand {
  pub fn id(&self) -> usize {
    self.0
  }
}


/// Element type of a variable.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
  Float32,
}


/// Operations a layer may ask the engine to build.
///
/// Spatial operations work on NHWC data.

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
  /// Value supplied at run time under the node's name.
  Placeholder { shape: Shape },
  Constant(Tensor),
  /// `[input, kernel[kh, kw, cin, cout]]`
  Conv2D { strides: [usize; 2], padding: Padding },
  /// `[input, kernel[kh, kw, cin, multiplier]]`
  DepthwiseConv2D { strides: [usize; 2], padding: Padding },
  MaxPool { window: [usize; 2], strides: [usize; 2], padding: Padding },
  AvgPool { window: [usize; 2], strides: [usize; 2], padding: Padding },
  /// Sub-tensor starting at `begin`. A size of `-1` extends to the end of the axis.
  Slice { begin: Vec<usize>, size: Vec<i64> },
  /// A single `-1` extent gets inferred.
  Reshape { shape: Shape },
  /// `[lhs[m, k], rhs[k, n]]`
  MatMul,
  /// `[input, bias]`, bias broadcast along the last axis.
  BiasAdd,
  Relu { max_value: Option<f32>, threshold: f32 },
  Sigmoid,
  Tanh,
  Softplus,
  /// Over the last axis.
  Softmax,
  Identity,
  /// `[prediction, target]` reduced to a scalar mean.
  MeanSquaredError,
  /// `[logits, labels]` reduced to a scalar mean over the batch.
  SoftmaxCrossEntropy,
}

impl Op {
  pub fn arity(&self) -> usize {
    match self {
      Self::Placeholder { .. } | Self::Constant(_) => 0,
      Self::Conv2D { .. }
      | Self::DepthwiseConv2D { .. }
      | Self::MatMul
      | Self::BiasAdd
      | Self::MeanSquaredError
      | Self::SoftmaxCrossEntropy => 2,
      _ => 1,
    }
  }
}


/// Capabilities a tensor engine must provide for models to be compiled and run on it.
///
/// An engine owns a session. Once [close](Engine::close) has been called,
/// every other method fails with [EngineError::Closed].

pub trait Engine {
  /// Create a zero-filled variable that can be found under `name`.
  fn create_variable(&mut self, name: &str, dims: &[usize], dtype: DType) -> EngineResult<Operand>;

  /// Overwrite a variable's value. Extents must match.
  fn assign(&mut self, name: &str, value: Tensor) -> EngineResult<()>;

  /// Append an operation to the graph, optionally registering it under `name`.
  fn build_op(&mut self, op: Op, operands: &[Operand], name: Option<&str>) -> EngineResult<Operand>;

  /// Evaluate the named nodes after feeding the named placeholders.
  fn run_fetch(&mut self, feeds: &[(&str, &Tensor)], fetches: &[&str]) -> EngineResult<Vec<Tensor>>;

  fn close(&mut self) -> EngineResult<()>;

  fn is_closed(&self) -> bool;
}
