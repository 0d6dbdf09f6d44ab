use std::any::Any;

use crate::{
  activations::Activation,
  config::LayerConfig,
  engine::{ Engine, Op, Operand },
  error::{ Error, Result },
  shape::Shape,
};

use super::{ Layer, already_defined };


/// Applies an [Activation] on its own, leaving the shape untouched.

#[derive(Debug, Clone)]
pub struct ActivationLayer {
  name: String,
  activation: Activation,
  defined: bool,
}

impl ActivationLayer {
  pub fn new(activation: Activation) -> Self {
    Self { name: String::new(), activation, defined: false }
  }

  pub fn named(mut self, name: &str) -> Self {
    self.name = name.to_string();
    self
  }

  pub fn activation(&self) -> Activation {
    self.activation
  }
}

impl Layer for ActivationLayer {
  fn name(&self) -> &str {
    &self.name
  }

  fn set_name(&mut self, name: String) {
    self.name = name;
  }

  fn kind(&self) -> &'static str {
    "Activation"
  }

  fn tag(&self) -> &'static str {
    "activation"
  }

  fn has_activation(&self) -> bool {
    true
  }

  fn define_variables(&mut self, _engine: &mut dyn Engine, _input_shape: &Shape) -> Result<()> {
    if self.defined { return Err(already_defined(&self.name)) }
    self.defined = true;
    Ok(())
  }

  fn compute_output_shape(&self, input_shape: &Shape) -> Result<Shape> {
    Ok(input_shape.clone())
  }

  fn transform_input(&self, engine: &mut dyn Engine, input: Operand) -> Result<Operand> {
    self.activation.apply(engine, input)
  }

  fn params(&self) -> Result<usize> {
    Ok(0)
  }

  fn config(&self) -> LayerConfig {
    LayerConfig::Activation { name: self.name.clone(), activation: self.activation }
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}


/// Rectified linear unit with an optional cap and threshold.
///
/// Computes `max_value` capped `x` for `x >= threshold` and zero otherwise.
/// Leaky variants with a non-zero `negative_slope` can be configured but not compiled.

#[derive(Debug, Clone)]
pub struct ReLU {
  name: String,
  max_value: Option<f32>,
  negative_slope: f32,
  threshold: f32,
  defined: bool,
}

impl ReLU {
  pub fn new() -> Self {
    Self { name: String::new(), max_value: None, negative_slope: 0.0, threshold: 0.0, defined: false }
  }

  pub fn max_value(mut self, max_value: f32) -> Result<Self> {
    if max_value < 0.0 {
      return Err(Error::config(format!("max value must not be negative, got {max_value}")))
    }
    self.max_value = Some(max_value);
    Ok(self)
  }

  pub fn negative_slope(mut self, negative_slope: f32) -> Result<Self> {
    if negative_slope < 0.0 {
      return Err(Error::config(format!("negative slope must not be negative, got {negative_slope}")))
    }
    self.negative_slope = negative_slope;
    Ok(self)
  }

  pub fn threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn named(mut self, name: &str) -> Self {
    self.name = name.to_string();
    self
  }
}

impl Default for ReLU {
  fn default() -> Self {
    Self::new()
  }
}

impl Layer for ReLU {
  fn name(&self) -> &str {
    &self.name
  }

  fn set_name(&mut self, name: String) {
    self.name = name;
  }

  fn kind(&self) -> &'static str {
    "ReLU"
  }

  fn tag(&self) -> &'static str {
    "relu"
  }

  fn has_activation(&self) -> bool {
    true
  }

  fn define_variables(&mut self, _engine: &mut dyn Engine, _input_shape: &Shape) -> Result<()> {
    if self.defined { return Err(already_defined(&self.name)) }
    self.defined = true;
    Ok(())
  }

  fn compute_output_shape(&self, input_shape: &Shape) -> Result<Shape> {
    Ok(input_shape.clone())
  }

  fn transform_input(&self, engine: &mut dyn Engine, input: Operand) -> Result<Operand> {
    if self.negative_slope != 0.0 {
      return Err(Error::Unsupported(format!(
        "layer {} would need a leaky ReLU with slope {}", self.name, self.negative_slope
      )))
    }
    let op = Op::Relu { max_value: self.max_value, threshold: self.threshold };
    Ok(engine.build_op(op, &[input], None)?)
  }

  fn params(&self) -> Result<usize> {
    Ok(0)
  }

  fn config(&self) -> LayerConfig {
    LayerConfig::ReLU {
      name: self.name.clone(),
      max_value: self.max_value,
      negative_slope: self.negative_slope,
      threshold: self.threshold,
    }
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ engine::Graph, tensor::Tensor };

  fn run(layer: &dyn Layer, input: &[f32]) -> Result<Vec<f32>> {
    let mut graph = Graph::new();
    let x = graph.build_op(Op::Placeholder { shape: Shape::new(&[-1]) }, &[], Some("x"))?;
    let y = layer.transform_input(&mut graph, x)?;
    graph.build_op(Op::Identity, &[y], Some("y"))?;
    Ok(graph.run_fetch(&[("x", &Tensor::vec(input))], &["y"])?[0].raw().to_vec())
  }

  #[test]
  fn keeps_shape() {
    let layer = ActivationLayer::new(Activation::Sigmoid);
    assert_eq!(layer.compute_output_shape(&Shape::new(&[-1, 4])).unwrap(), Shape::new(&[-1, 4]));
    assert_eq!(run(&layer, &[0.0]).unwrap(), vec![0.5]);
  }

  #[test]
  fn capped_relu() {
    let layer = ReLU::new().max_value(2.0).unwrap().threshold(0.5);
    assert_eq!(run(&layer, &[0.25, 1.0, 3.0]).unwrap(), vec![0.0, 1.0, 2.0]);
  }

  #[test]
  fn leaky_relu_unsupported() {
    let layer = ReLU::new().negative_slope(0.1).unwrap();
    assert!(matches!(run(&layer, &[1.0]), Err(Error::Unsupported(_))));
  }

  #[test]
  fn defines_once() {
    let mut graph = Graph::new();
    let shape = Shape::new(&[-1, 4]);
    let mut layer = ActivationLayer::new(Activation::Tanh).named("activation_1");
    layer.define_variables(&mut graph, &shape).unwrap();
    assert!(matches!(layer.define_variables(&mut graph, &shape), Err(Error::Configuration(_))));
    let mut relu = ReLU::new().named("relu_2");
    relu.define_variables(&mut graph, &shape).unwrap();
    assert!(matches!(relu.define_variables(&mut graph, &shape), Err(Error::Configuration(_))));
  }

  #[test]
  fn rejects_negative_hyperparameters() {
    assert!(ReLU::new().max_value(-1.0).is_err());
    assert!(ReLU::new().negative_slope(-0.1).is_err());
  }
}
