//! Positional naming of a model's layers.

use std::collections::HashSet;

use crate::{
  error::{ Error, Result },
  layers::Layer,
};


/// Name every unnamed layer after its kind and position, then make sure
/// no name is used twice.
///
/// The input layer sits at position 0, so the first layer after it becomes
/// e.g. `conv2d_1`. An unnamed input layer is simply named after its tag.

pub fn resolve(layers: &mut [&mut dyn Layer]) -> Result<()> {
  assign_names(layers);
  validate_unique(layers)
}

pub fn assign_names(layers: &mut [&mut dyn Layer]) {
  for (index, layer) in layers.iter_mut().enumerate() {
    if !layer.name().is_empty() { continue }
    let name = if index == 0 {
      layer.tag().to_string()
    } else {
      format!("{}_{}", layer.tag(), index)
    };
    layer.set_name(name);
  }
}

/// Fail with the first name that was already used by an earlier layer.

pub fn validate_unique(layers: &[&mut dyn Layer]) -> Result<()> {
  let mut seen = HashSet::new();
  for layer in layers {
    if !seen.insert(layer.name()) {
      return Err(Error::DuplicateName { name: layer.name().to_string() })
    }
  }
  Ok(())
}
