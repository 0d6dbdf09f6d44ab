use std::any::Any;

use crate::{
  activations::Activation,
  config::LayerConfig,
  engine::{ Engine, Op, Operand },
  error::{ Error, Result },
  initializers::Initializer,
  shape::{ Shape, UNKNOWN },
  tensor::Tensor,
};

use super::{ Layer, Weights, already_defined, channels, uninitialized };


/// Fully connected layer over flat feature vectors.
///
/// Accepts `[features]` as produced by [Flatten](super::Flatten) or a batched
/// `[-1, features]` input. Anything of higher rank has to be flattened first.

#[derive(Debug, Clone)]
pub struct Dense {
  name: String,
  units: usize,
  activation: Activation,
  kernel_initializer: Initializer,
  bias_initializer: Initializer,
  weights: Option<Weights>,
}

impl Dense {
  pub fn new(units: usize) -> Result<Self> {
    if units == 0 {
      return Err(Error::config("number of units must be positive"))
    }
    Ok(Self {
      name: String::new(),
      units,
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

  pub fn units(&self) -> usize {
    self.units
  }

  fn features(&self, input_shape: &Shape) -> Result<usize> {
    let flat = match input_shape.rank() {
      1 => true,
      2 => input_shape[0] == UNKNOWN,
      _ => false,
    };
    if !flat {
      return Err(Error::rank(&self.name, 2, input_shape.rank()))
    }
    channels(&self.name, input_shape)
  }
}

impl Layer for Dense {
  fn name(&self) -> &str {
    &self.name
  }

  fn set_name(&mut self, name: String) {
    self.name = name;
  }

  fn kind(&self) -> &'static str {
    "Dense"
  }

  fn tag(&self) -> &'static str {
    "dense"
  }

  fn has_activation(&self) -> bool {
    true
  }

  fn define_variables(&mut self, engine: &mut dyn Engine, input_shape: &Shape) -> Result<()> {
    if self.weights.is_some() { return Err(already_defined(&self.name)) }
    let inputs = self.features(input_shape)?;
    self.weights = Some(Weights::define(
      engine,
      &self.name,
      vec![inputs, self.units],
      vec![self.units],
      &self.kernel_initializer,
      &self.bias_initializer,
    )?);
    Ok(())
  }

  /// Always `[units]`, without a batch axis.
  fn compute_output_shape(&self, input_shape: &Shape) -> Result<Shape> {
    self.features(input_shape)?;
    Ok(Shape::new(&[self.units as i64]))
  }

  fn transform_input(&self, engine: &mut dyn Engine, input: Operand) -> Result<Operand> {
    let weights = self.weights.as_ref().ok_or_else(|| uninitialized(&self.name) )?;
    let product = engine.build_op(Op::MatMul, &[input, weights.kernel], None)?;
    let biased = engine.build_op(Op::BiasAdd, &[product, weights.bias], None)?;
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
    LayerConfig::Dense {
      name: self.name.clone(),
      units: self.units,
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

  #[test]
  fn params() {
    let mut graph = Graph::new();
    let mut dense = Dense::new(512).unwrap().named("dense_1");
    dense.define_variables(&mut graph, &Shape::new(&[3136])).unwrap();
    assert_eq!(dense.params().unwrap(), 1_606_144);
    assert_eq!(dense.compute_output_shape(&Shape::new(&[3136])).unwrap(), Shape::new(&[512]));
  }

  #[test]
  fn forward() {
    let mut graph = Graph::new();
    let x = graph.build_op(Op::Placeholder { shape: Shape::new(&[-1, 2]) }, &[], Some("x")).unwrap();
    let mut dense = Dense::new(1).unwrap()
      .activation(Activation::Linear)
      .kernel_initializer(Initializer::Ones)
      .bias_initializer(Initializer::Constant(0.5))
      .named("dense");
    dense.define_variables(&mut graph, &Shape::new(&[-1, 2])).unwrap();
    let y = dense.transform_input(&mut graph, x).unwrap();
    graph.build_op(Op::Identity, &[y], Some("y")).unwrap();
    let out = graph.run_fetch(&[("x", &Tensor::new(&[1, 2], vec![1.0, 2.0]))], &["y"]).unwrap();
    assert_eq!(out[0].raw(), &[3.5]);
  }

  #[test]
  fn needs_flat_input() {
    let mut graph = Graph::new();
    let mut dense = Dense::new(3).unwrap().named("dense_1");
    let image = Shape::batched(&[4, 4, 1]);
    assert!(matches!(dense.compute_output_shape(&image), Err(Error::Rank { expected: 2, actual: 4, .. })));
    assert!(matches!(dense.define_variables(&mut graph, &image), Err(Error::Rank { .. })));
    assert!(dense.compute_output_shape(&Shape::new(&[4, 4])).is_err());
    assert_eq!(dense.compute_output_shape(&Shape::batched(&[16])).unwrap(), Shape::new(&[3]));
  }

  #[test]
  fn zero_units() {
    assert!(Dense::new(0).is_err());
  }
}
