use std::any::Any;

use crate::{
  config::LayerConfig,
  engine::{ Engine, Op, Operand },
  error::{ Error, Result },
  shape::Shape,
};

use super::{ Layer, already_defined, uninitialized };


/// Name of the placeholder models feed their data into.
pub const INPUT_PLACEHOLDER: &str = "x";


/// Declares the per-example shape of the data fed into a model.
///
/// Compiling creates a placeholder of shape `[-1, dims..]`.

#[derive(Debug, Clone)]
pub struct Input {
  name: String,
  dims: Vec<usize>,
  placeholder: Option<Operand>,
}

impl Input {
  pub fn new(dims: &[usize]) -> Result<Self> {
    if dims.is_empty() || dims.contains(&0) {
      return Err(Error::config(format!("input extents must be positive, got {dims:?}")))
    }
    Ok(Self { name: String::new(), dims: dims.to_vec(), placeholder: None })
  }

  pub fn named(mut self, name: &str) -> Self {
    self.name = name.to_string();
    self
  }

  pub fn dims(&self) -> &[usize] {
    &self.dims
  }

  pub fn shape(&self) -> Shape {
    Shape::batched(&self.dims)
  }

  /// The placeholder created by [define_variables](Layer::define_variables).

  pub fn placeholder(&self) -> Result<Operand> {
    self.placeholder.ok_or_else(|| uninitialized(&self.name) )
  }
}

impl Layer for Input {
  fn name(&self) -> &str {
    &self.name
  }

  fn set_name(&mut self, name: String) {
    self.name = name;
  }

  fn kind(&self) -> &'static str {
    "Input"
  }

  fn tag(&self) -> &'static str {
    "input"
  }

  fn is_trainable(&self) -> bool {
    false
  }

  /// Creates the input placeholder. The given shape is ignored, an input
  /// declares its own.
  fn define_variables(&mut self, engine: &mut dyn Engine, _input_shape: &Shape) -> Result<()> {
    if self.placeholder.is_some() { return Err(already_defined(&self.name)) }
    let placeholder = engine.build_op(Op::Placeholder { shape: self.shape() }, &[], Some(INPUT_PLACEHOLDER))?;
    self.placeholder = Some(placeholder);
    Ok(())
  }

  fn compute_output_shape(&self, _input_shape: &Shape) -> Result<Shape> {
    Ok(self.shape())
  }

  fn transform_input(&self, _engine: &mut dyn Engine, _input: Operand) -> Result<Operand> {
    self.placeholder()
  }

  fn params(&self) -> Result<usize> {
    Ok(0)
  }

  fn config(&self) -> LayerConfig {
    LayerConfig::Input { name: self.name.clone(), dims: self.dims.clone() }
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
  fn placeholder_shape() {
    let mut graph = Graph::new();
    let mut input = Input::new(&[28, 28, 1]).unwrap();
    assert_eq!(input.shape(), Shape::new(&[-1, 28, 28, 1]));
    input.define_variables(&mut graph, &Shape::new(&[])).unwrap();
    assert_eq!(graph.len(), 1);
    assert!(input.define_variables(&mut graph, &Shape::new(&[])).is_err());
  }

  #[test]
  fn rejects_empty_extents() {
    assert!(Input::new(&[]).is_err());
    assert!(Input::new(&[28, 0]).is_err());
  }
}
