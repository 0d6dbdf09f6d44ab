use std::any::Any;

use crate::{
  config::LayerConfig,
  contract::{ self, Padding },
  engine::{ Engine, Op, Operand },
  error::Result,
  shape::Shape,
};

use super::{ Layer, already_defined, check_rank };


#[derive(Debug, Clone, Copy, PartialEq)]
struct Window {
  size: [usize; 2],
  strides: [usize; 2],
  padding: Padding,
}

impl Window {
  fn new(pool_size: &[usize], strides: &[usize], padding: Padding) -> Result<Self> {
    Ok(Self {
      size: contract::normalize_window(pool_size, "pool size")?,
      strides: contract::normalize_window(strides, "strides")?,
      padding,
    })
  }

  fn output(&self, layer: &str, input_shape: &Shape) -> Result<Shape> {
    check_rank(layer, input_shape, 4)?;
    contract::window_output(layer, input_shape, self.size, self.strides, self.padding, input_shape[-1])
  }
}


macro_rules! pooling_layer {
  ($(#[$meta:meta])* $name:ident, $kind:literal, $tag:literal, $op:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone)]
    pub struct $name {
      name: String,
      window: Window,
      defined: bool,
    }

    impl $name {
      /// Both `pool_size` and `strides` are given either as `[h, w]` or `[1, h, w, 1]`.

      pub fn new(pool_size: &[usize], strides: &[usize], padding: Padding) -> Result<Self> {
        Ok(Self { name: String::new(), window: Window::new(pool_size, strides, padding)?, defined: false })
      }

      pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
      }

      pub fn pool_size(&self) -> [usize; 2] {
        self.window.size
      }

      pub fn strides(&self) -> [usize; 2] {
        self.window.strides
      }

      pub fn padding(&self) -> Padding {
        self.window.padding
      }
    }

    impl Layer for $name {
      fn name(&self) -> &str {
        &self.name
      }

      fn set_name(&mut self, name: String) {
        self.name = name;
      }

      fn kind(&self) -> &'static str {
        $kind
      }

      fn tag(&self) -> &'static str {
        $tag
      }

      fn define_variables(&mut self, _engine: &mut dyn Engine, input_shape: &Shape) -> Result<()> {
        if self.defined { return Err(already_defined(&self.name)) }
        check_rank(&self.name, input_shape, 4)?;
        self.defined = true;
        Ok(())
      }

      fn compute_output_shape(&self, input_shape: &Shape) -> Result<Shape> {
        self.window.output(&self.name, input_shape)
      }

      fn transform_input(&self, engine: &mut dyn Engine, input: Operand) -> Result<Operand> {
        let op = Op::$op {
          window: self.window.size,
          strides: self.window.strides,
          padding: self.window.padding,
        };
        Ok(engine.build_op(op, &[input], None)?)
      }

      fn params(&self) -> Result<usize> {
        Ok(0)
      }

      fn config(&self) -> LayerConfig {
        LayerConfig::$name {
          name: self.name.clone(),
          pool_size: self.window.size.to_vec(),
          strides: self.window.strides.to_vec(),
          padding: self.window.padding,
        }
      }

      fn as_any(&self) -> &dyn Any {
        self
      }
    }
  };
}

pooling_layer!(
  /// Maximum over each window of every channel.
  MaxPool2D, "MaxPool2D", "maxpool2d", MaxPool
);

pooling_layer!(
  /// Mean over each window of every channel.
  AvgPool2D, "AvgPool2D", "avgpool2d", AvgPool
);


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ engine::Graph, error::Error, tensor::Tensor };

  #[test]
  fn halves_spatial_axes() {
    let pool = MaxPool2D::new(&[1, 2, 2, 1], &[1, 2, 2, 1], Padding::Valid).unwrap();
    let out = pool.compute_output_shape(&Shape::new(&[-1, 28, 28, 32])).unwrap();
    assert_eq!(out, Shape::new(&[-1, 14, 14, 32]));
    assert_eq!(pool.params().unwrap(), 0);
  }

  #[test]
  fn same_padding_rounds_up() {
    let pool = AvgPool2D::new(&[3, 3], &[2, 2], Padding::Same).unwrap();
    let out = pool.compute_output_shape(&Shape::new(&[-1, 7, 7, 4])).unwrap();
    assert_eq!(out, Shape::new(&[-1, 4, 4, 4]));
  }

  #[test]
  fn requires_rank_four() {
    let pool = MaxPool2D::new(&[2, 2], &[2, 2], Padding::Valid).unwrap().named("pool");
    assert!(matches!(pool.compute_output_shape(&Shape::new(&[-1, 28])), Err(Error::Rank { .. })));
  }

  #[test]
  fn defines_once() {
    let mut graph = Graph::new();
    let mut pool = MaxPool2D::new(&[2, 2], &[2, 2], Padding::Valid).unwrap().named("pool");
    assert!(matches!(pool.define_variables(&mut graph, &Shape::batched(&[4, 4])), Err(Error::Rank { .. })));
    pool.define_variables(&mut graph, &Shape::batched(&[4, 4, 1])).unwrap();
    assert!(matches!(pool.define_variables(&mut graph, &Shape::batched(&[4, 4, 1])), Err(Error::Configuration(_))));
  }

  #[test]
  fn forward() {
    let mut graph = Graph::new();
    let x = graph.build_op(Op::Placeholder { shape: Shape::new(&[-1, 2, 2, 1]) }, &[], Some("x")).unwrap();
    let pool = AvgPool2D::new(&[2, 2], &[2, 2], Padding::Valid).unwrap();
    let y = pool.transform_input(&mut graph, x).unwrap();
    graph.build_op(Op::Identity, &[y], Some("y")).unwrap();
    let input = Tensor::new(&[1, 2, 2, 1], vec![1.0, 2.0, 3.0, 6.0]);
    let out = graph.run_fetch(&[("x", &input)], &["y"]).unwrap();
    assert_eq!(out[0].raw(), &[3.0]);
  }
}
