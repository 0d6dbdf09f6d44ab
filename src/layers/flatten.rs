use std::any::Any;

use crate::{
  config::LayerConfig,
  contract,
  engine::{ Engine, Op, Operand },
  error::Result,
  shape::{ Shape, UNKNOWN },
};

use super::{ Layer, already_defined, uninitialized };


/// Collapses all non-batch axes into one.

#[derive(Debug, Clone, Default)]
pub struct Flatten {
  name: String,
  units: Option<i64>,
}

impl Flatten {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn named(mut self, name: &str) -> Self {
    self.name = name.to_string();
    self
  }
}

impl Layer for Flatten {
  fn name(&self) -> &str {
    &self.name
  }

  fn set_name(&mut self, name: String) {
    self.name = name;
  }

  fn kind(&self) -> &'static str {
    "Flatten"
  }

  fn tag(&self) -> &'static str {
    "flatten"
  }

  fn define_variables(&mut self, _engine: &mut dyn Engine, input_shape: &Shape) -> Result<()> {
    if self.units.is_some() { return Err(already_defined(&self.name)) }
    let output = contract::flatten_output(input_shape)?;
    self.units = Some(output[0]);
    Ok(())
  }

  fn compute_output_shape(&self, input_shape: &Shape) -> Result<Shape> {
    contract::flatten_output(input_shape)
  }

  fn transform_input(&self, engine: &mut dyn Engine, input: Operand) -> Result<Operand> {
    let units = self.units.ok_or_else(|| uninitialized(&self.name) )?;
    let reshape = Op::Reshape { shape: Shape::new(&[UNKNOWN, units]) };
    Ok(engine.build_op(reshape, &[input], None)?)
  }

  fn params(&self) -> Result<usize> {
    Ok(0)
  }

  fn config(&self) -> LayerConfig {
    LayerConfig::Flatten { name: self.name.clone() }
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}
