use std::any::Any;

use crate::{
  activations::Activation,
  config::LayerConfig,
  contract::{ self, Padding },
  engine::{ Engine, Op, Operand },
  error::{ Error, Result },
  initializers::Initializer,
  shape::{ Shape, UNKNOWN },
  tensor::Tensor,
};

use super::{ Layer, Weights, already_defined, channels, check_rank, uninitialized };


/// 2D convolution over NHWC inputs, followed by a bias and an activation.

#[derive(Debug, Clone)]
pub struct Conv2D {
  name: String,
  filters: usize,
  kernel_size: [usize; 2],
  strides: [usize; 2],
  padding: Padding,
  activation: Activation,
  kernel_initializer: Initializer,
  bias_initializer: Initializer,
  weights: Option<Weights>,
}

impl Conv2D {
  /// `kernel_size` is `[h, w]`, `strides` either `[h, w]` or `[1, h, w, 1]`.

  pub fn new(filters: usize, kernel_size: &[usize], strides: &[usize], padding: Padding) -> Result<Self> {
    if filters == 0 {
      return Err(Error::config("number of filters must be positive"))
    }
    Ok(Self {
      name: String::new(),
      filters,
      kernel_size: contract::normalize_window(kernel_size, "kernel size")?,
      strides: contract::normalize_window(strides, "strides")?,
      padding,
      activation: Activation::Relu,
      kernel_initializer: Initializer::default(),
      bias_initializer: Initializer::Zeros,
      weights: None,
    })
  }

  pub fn activation(mut self, activation: Activation) -> Self {
    self.activation = activation;
    self
  }

  pub fn kernel_initializer(mut self, initializer: Initializer) -> Self {
    self.kernel_initializer = initializer;
    self
  }

  pub fn bias_initializer(mut self, initializer: Initializer) -> Self {
    self.bias_initializer = initializer;
    self
  }

  pub fn named(mut self, name: &str) -> Self {
    self.name = name.to_string();
    self
  }

  pub fn filters(&self) -> usize {
    self.filters
  }

  pub fn kernel_size(&self) -> [usize; 2] {
    self.kernel_size
  }

  pub fn strides(&self) -> [usize; 2] {
    self.strides
  }

  pub fn padding(&self) -> Padding {
    self.padding
  }

  pub fn activation_fn(&self) -> Activation {
    self.activation
  }
}

impl Layer for Conv2D {
  fn name(&self) -> &str {
    &self.name
  }

  fn set_name(&mut self, name: String) {
    self.name = name;
  }

  fn kind(&self) -> &'static str {
    "Conv2D"
  }

  fn tag(&self) -> &'static str {
    "conv2d"
  }

  fn has_activation(&self) -> bool {
    true
  }

  fn define_variables(&mut self, engine: &mut dyn Engine, input_shape: &Shape) -> Result<()> {
    if self.weights.is_some() { return Err(already_defined(&self.name)) }
    check_rank(&self.name, input_shape, 4)?;
    let [kh, kw] = self.kernel_size;
    let kernel_dims = vec![kh, kw, channels(&self.name, input_shape)?, self.filters];
    self.weights = Some(Weights::define(
      engine,
      &self.name,
      kernel_dims,
      vec![self.filters],
      &self.kernel_initializer,
      &self.bias_initializer,
    )?);
    Ok(())
  }

  fn compute_output_shape(&self, input_shape: &Shape) -> Result<Shape> {
    check_rank(&self.name, input_shape, 4)?;
    contract::window_output(&self.name, input_shape, self.kernel_size, self.strides, self.padding, self.filters as i64)
  }

  fn transform_input(&self, engine: &mut dyn Engine, input: Operand) -> Result<Operand> {
    let weights = self.weights.as_ref().ok_or_else(|| uninitialized(&self.name) )?;
    let conv = engine.build_op(
      Op::Conv2D { strides: self.strides, padding: self.padding },
      &[input, weights.kernel],
      None,
    )?;
    let biased = engine.build_op(Op::BiasAdd, &[conv, weights.bias], None)?;
    self.activation.apply(engine, biased)
  }

  fn params(&self) -> Result<usize> {
    self.weights.as_ref()
      .map(|weights| weights.params() )
      .ok_or_else(|| uninitialized(&self.name) )
  }

  fn weights(&self, engine: &mut dyn Engine) -> Result<Vec<Tensor>> {
    self.weights.as_ref().ok_or_else(|| uninitialized(&self.name) )?.fetch(engine)
  }

  fn config(&self) -> LayerConfig {
    LayerConfig::Conv2D {
      name: self.name.clone(),
      filters: self.filters,
      kernel_size: self.kernel_size.to_vec(),
      strides: self.strides.to_vec(),
      padding: self.padding,
      activation: self.activation,
      kernel_initializer: self.kernel_initializer,
      bias_initializer: self.bias_initializer,
    }
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}


/// Per-channel 2D convolution.
///
/// Each input channel is convolved with `depth_multiplier` filters of its own,
/// so the output has `channels * depth_multiplier` channels.

#[derive(Debug, Clone)]
pub struct DepthwiseConv2D {
  name: String,
  depth_multiplier: usize,
  kernel_size: [usize; 2],
  strides: [usize; 2],
  padding: Padding,
  activation: Activation,
  kernel_initializer: Initializer,
  bias_initializer: Initializer,
  weights: Option<Weights>,
}

impl DepthwiseConv2D {
  pub fn new(kernel_size: &[usize], strides: &[usize], padding: Padding) -> Result<Self> {
    Ok(Self {
      name: String::new(),
      depth_multiplier: 1,
      kernel_size: contract::normalize_window(kernel_size, "kernel size")?,
      strides: contract::normalize_window(strides, "strides")?,
      padding,
      activation: Activation::Relu,
      kernel_initializer: Initializer::default(),
      bias_initializer: Initializer::Zeros,
      weights: None,
    })
  }

  pub fn depth_multiplier(mut self, multiplier: usize) -> Result<Self> {
    if multiplier == 0 {
      return Err(Error::config("depth multiplier must be positive"))
    }
    self.depth_multiplier = multiplier;
    Ok(self)
  }

  pub fn activation(mut self, activation: Activation) -> Self {
    self.activation = activation;
    self
  }

  pub fn kernel_initializer(mut self, initializer: Initializer) -> Self {
    self.kernel_initializer = initializer;
    self
  }

  pub fn bias_initializer(mut self, initializer: Initializer) -> Self {
    self.bias_initializer = initializer;
    self
  }

  pub fn named(mut self, name: &str) -> Self {
    self.name = name.to_string();
    self
  }

  pub fn multiplier(&self) -> usize {
    self.depth_multiplier
  }
}

impl Layer for DepthwiseConv2D {
  fn name(&self) -> &str {
    &self.name
  }

  fn set_name(&mut self, name: String) {
    self.name = name;
  }

  fn kind(&self) -> &'static str {
    "DepthwiseConv2D"
  }

  fn tag(&self) -> &'static str {
    "depthwise_conv2d"
  }

  fn has_activation(&self) -> bool {
    true
  }

  fn define_variables(&mut self, engine: &mut dyn Engine, input_shape: &Shape) -> Result<()> {
    if self.weights.is_some() { return Err(already_defined(&self.name)) }
    check_rank(&self.name, input_shape, 4)?;
    let [kh, kw] = self.kernel_size;
    let channels = channels(&self.name, input_shape)?;
    self.weights = Some(Weights::define(
      engine,
      &self.name,
      vec![kh, kw, channels, self.depth_multiplier],
      vec![channels * self.depth_multiplier],
      &self.kernel_initializer,
      &self.bias_initializer,
    )?);
    Ok(())
  }

  fn compute_output_shape(&self, input_shape: &Shape) -> Result<Shape> {
    check_rank(&self.name, input_shape, 4)?;
    let channels = match input_shape[-1] {
      UNKNOWN => UNKNOWN,
      n => n * self.depth_multiplier as i64,
    };
    contract::window_output(&self.name, input_shape, self.kernel_size, self.strides, self.padding, channels)
  }

  fn transform_input(&self, engine: &mut dyn Engine, input: Operand) -> Result<Operand> {
    let weights = self.weights.as_ref().ok_or_else(|| uninitialized(&self.name) )?;
    let conv = engine.build_op(
      Op::DepthwiseConv2D { strides: self.strides, padding: self.padding },
      &[input, weights.kernel],
      None,
    )?;
    let biased = engine.build_op(Op::BiasAdd, &[conv, weights.bias], None)?;
    self.activation.apply(engine, biased)
  }

  fn params(&self) -> Result<usize> {
    self.weights.as_ref()
      .map(|weights| weights.params() )
      .ok_or_else(|| uninitialized(&self.name) )
  }

  fn weights(&self, engine: &mut dyn Engine) -> Result<Vec<Tensor>> {
    self.weights.as_ref().ok_or_else(|| uninitialized(&self.name) )?.fetch(engine)
  }

  fn config(&self) -> LayerConfig {
    LayerConfig::DepthwiseConv2D {
      name: self.name.clone(),
      depth_multiplier: self.depth_multiplier,
      kernel_size: self.kernel_size.to_vec(),
      strides: self.strides.to_vec(),
      padding: self.padding,
      activation: self.activation,
      kernel_initializer: self.kernel_initializer,
      bias_initializer: self.bias_initializer,
    }
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::Graph;

  fn conv() -> Conv2D {
    Conv2D::new(32, &[5, 5], &[1, 1, 1, 1], Padding::Same).unwrap().named("conv2d_1")
  }

  #[test]
  fn output_shape() {
    let shape = conv().compute_output_shape(&Shape::batched(&[28, 28, 1])).unwrap();
    assert_eq!(shape, Shape::new(&[-1, 28, 28, 32]));
  }

  #[test]
  fn rank_mismatch() {
    let err = conv().compute_output_shape(&Shape::batched(&[28, 28])).unwrap_err();
    assert!(matches!(err, Error::Rank { expected: 4, actual: 3, .. }));
  }

  #[test]
  fn params_after_define() {
    let mut graph = Graph::new();
    let mut layer = conv();
    assert!(matches!(layer.params(), Err(Error::UninitializedModel(_))));
    layer.define_variables(&mut graph, &Shape::batched(&[28, 28, 1])).unwrap();
    assert_eq!(layer.params().unwrap(), 832);
    assert!(layer.define_variables(&mut graph, &Shape::batched(&[28, 28, 1])).is_err());
  }

  #[test]
  fn variable_values() {
    let mut graph = Graph::new();
    let mut layer = conv().bias_initializer(Initializer::Constant(0.1));
    layer.define_variables(&mut graph, &Shape::batched(&[28, 28, 1])).unwrap();
    let weights = layer.weights(&mut graph).unwrap();
    assert_eq!(weights[0].dims(), &[5, 5, 1, 32]);
    assert_eq!(weights[1], Tensor::fill(&[32], 0.1));
  }

  #[test]
  fn rejects_bad_hyperparameters() {
    assert!(Conv2D::new(0, &[3, 3], &[1, 1], Padding::Same).is_err());
    assert!(Conv2D::new(8, &[3, 3, 3], &[1, 1], Padding::Same).is_err());
    assert!(Conv2D::new(8, &[3, 3], &[2, 1, 1, 1], Padding::Same).is_err());
  }

  #[test]
  fn depthwise_channels() {
    let mut graph = Graph::new();
    let mut layer = DepthwiseConv2D::new(&[3, 3], &[1, 1], Padding::Same).unwrap()
      .depth_multiplier(2).unwrap()
      .named("depthwise_conv2d_1");
    let input = Shape::batched(&[8, 8, 3]);
    assert_eq!(layer.compute_output_shape(&input).unwrap(), Shape::new(&[-1, 8, 8, 6]));
    layer.define_variables(&mut graph, &input).unwrap();
    assert_eq!(layer.params().unwrap(), 3 * 3 * 3 * 2 + 6);
  }
}
