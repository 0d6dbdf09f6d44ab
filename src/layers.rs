//! Layers and the capability set every layer provides.

use std::any::Any;
use std::fmt::Debug;

mod activation;
mod conv;
mod cropping;
mod dense;
mod flatten;
mod input;
mod pooling;

pub use activation::{ ActivationLayer, ReLU };
pub use conv::{ Conv2D, DepthwiseConv2D };
pub use cropping::{ Cropping1D, Cropping2D, Cropping3D };
pub use dense::Dense;
pub use flatten::Flatten;
pub use input::{ Input, INPUT_PLACEHOLDER };
pub use pooling::{ MaxPool2D, AvgPool2D };

use crate::{
  config::LayerConfig,
  engine::{ DType, Engine, Operand },
  error::{ Error, Result },
  initializers::Initializer,
  shape::{ Shape, UNKNOWN },
  tensor::Tensor,
};


/// A named, composable unit with a shape contract.
///
/// Layers are constructed from hyperparameters alone. Their variables come
/// into existence when a model feeds them their input shape during compilation.

pub trait Layer: Debug {
  fn name(&self) -> &str;

  /// Names are assigned once, while a model is being assembled.
  fn set_name(&mut self, name: String);

  /// Display name of this layer's kind, e.g. `Conv2D`.
  fn kind(&self) -> &'static str;

  /// Lowercase tag used for generated names, e.g. `conv2d`.
  fn tag(&self) -> &'static str;

  fn is_trainable(&self) -> bool {
    true
  }

  fn has_activation(&self) -> bool {
    false
  }

  /// Create and initialize this layer's variables for the given input shape.
  ///
  /// May only succeed once per layer.
  fn define_variables(&mut self, engine: &mut dyn Engine, input_shape: &Shape) -> Result<()>;

  fn compute_output_shape(&self, input_shape: &Shape) -> Result<Shape>;

  /// Append this layer's forward computation to the engine's graph.
  fn transform_input(&self, engine: &mut dyn Engine, input: Operand) -> Result<Operand>;

  /// Number of scalars across all trainable variables.
  fn params(&self) -> Result<usize>;

  /// Current values of this layer's variables.
  fn weights(&self, _engine: &mut dyn Engine) -> Result<Vec<Tensor>> {
    Ok(vec![])
  }

  fn config(&self) -> LayerConfig;

  fn as_any(&self) -> &dyn Any;
}


/// Kernel and bias variables of a weighted layer.

#[derive(Debug, Clone)]
pub(crate) struct Weights {
  pub kernel: Operand,
  pub bias: Operand,
  kernel_name: String,
  bias_name: String,
  kernel_dims: Vec<usize>,
  bias_dims: Vec<usize>,
}

impl Weights {
  pub fn define(
    engine: &mut dyn Engine,
    layer: &str,
    kernel_dims: Vec<usize>,
    bias_dims: Vec<usize>,
    kernel_initializer: &Initializer,
    bias_initializer: &Initializer,
  ) -> Result<Self> {
    let kernel_name = format!("{layer}_kernel");
    let bias_name = format!("{layer}_bias");

    let kernel = engine.create_variable(&kernel_name, &kernel_dims, DType::Float32)?;
    engine.assign(&kernel_name, kernel_initializer.generate(&kernel_dims))?;

    let bias = engine.create_variable(&bias_name, &bias_dims, DType::Float32)?;
    engine.assign(&bias_name, bias_initializer.generate(&bias_dims))?;

    Ok(Self { kernel, bias, kernel_name, bias_name, kernel_dims, bias_dims })
  }

  pub fn params(&self) -> usize {
    self.kernel_dims.iter().product::<usize>() + self.bias_dims.iter().product::<usize>()
  }

  pub fn fetch(&self, engine: &mut dyn Engine) -> Result<Vec<Tensor>> {
    Ok(engine.run_fetch(&[], &[&self.kernel_name, &self.bias_name])?)
  }
}


pub(crate) fn check_rank(layer: &str, shape: &Shape, expected: usize) -> Result<()> {
  if shape.rank() != expected {
    return Err(Error::rank(layer, expected, shape.rank()))
  }
  Ok(())
}

/// Extent of the channel axis, which has to be known to size a kernel.

pub(crate) fn channels(layer: &str, shape: &Shape) -> Result<usize> {
  match shape.at(-1) {
    Some(n) if n != UNKNOWN && n > 0 => Ok(n as usize),
    _ => Err(Error::config(format!("layer {layer} needs a known channel extent, got {shape}"))),
  }
}

pub(crate) fn uninitialized(layer: &str) -> Error {
  Error::UninitializedModel(format!("variables of layer '{layer}' have not been defined yet"))
}

pub(crate) fn already_defined(layer: &str) -> Error {
  Error::config(format!("variables of layer '{layer}' are already defined"))
}
