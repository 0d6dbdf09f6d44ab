use std::any::Any;

use crate::{
  config::LayerConfig,
  contract,
  engine::{ Engine, Op, Operand },
  error::{ Error, Result },
  shape::{ Shape, UNKNOWN },
};

use super::{ Layer, already_defined, check_rank, uninitialized };


/// Slice that strips `[left, right]` elements off each spatial axis of
/// `[batch, spatial.., channels]`.

#[derive(Debug, Clone)]
struct Crop {
  pairs: Vec<[usize; 2]>,
  input_shape: Option<Shape>,
}

impl Crop {
  fn rank(&self) -> usize {
    self.pairs.len() + 2
  }

  fn remember(&mut self, layer: &str, input_shape: &Shape) -> Result<()> {
    if self.input_shape.is_some() { return Err(already_defined(layer)) }
    check_rank(layer, input_shape, self.rank())?;
    self.input_shape = Some(input_shape.clone());
    Ok(())
  }

  fn output(&self, layer: &str, input_shape: &Shape) -> Result<Shape> {
    contract::cropping_output(layer, input_shape, &self.pairs)
  }

  fn build(&self, layer: &str, engine: &mut dyn Engine, input: Operand) -> Result<Operand> {
    let input_shape = self.input_shape.as_ref().ok_or_else(|| uninitialized(layer) )?;
    let output = contract::cropping_output(layer, input_shape, &self.pairs)?;

    let mut begin = vec![0; self.rank()];
    let mut size = vec![UNKNOWN; self.rank()];
    for (axis, &[left, right]) in self.pairs.iter().enumerate() {
      begin[axis + 1] = left;
      size[axis + 1] = match (output[axis as isize + 1], right) {
        (_, 0) => UNKNOWN,
        (UNKNOWN, _) => return Err(Error::Unsupported(format!(
          "layer {layer} cannot crop from the end of spatial axis {axis} with unknown extent"
        ))),
        (extent, _) => extent,
      };
    }
    Ok(engine.build_op(Op::Slice { begin, size }, &[input], None)?)
  }
}


macro_rules! cropping_layer {
  ($(#[$meta:meta])* $name:ident, $kind:literal, $tag:literal) => {
    $(#[$meta])*
    #[derive(Debug, Clone)]
    pub struct $name {
      name: String,
      crop: Crop,
    }

    impl $name {
      pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
      }

      /// `[left, right]` per spatial axis.

      pub fn cropping(&self) -> &[[usize; 2]] {
        &self.crop.pairs
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
        self.crop.remember(&self.name, input_shape)
      }

      fn compute_output_shape(&self, input_shape: &Shape) -> Result<Shape> {
        self.crop.output(&self.name, input_shape)
      }

      fn transform_input(&self, engine: &mut dyn Engine, input: Operand) -> Result<Operand> {
        self.crop.build(&self.name, engine, input)
      }

      fn params(&self) -> Result<usize> {
        Ok(0)
      }

      fn config(&self) -> LayerConfig {
        LayerConfig::$name {
          name: self.name.clone(),
          cropping: self.crop.pairs.iter().map(|pair| pair.to_vec() ).collect(),
        }
      }

      fn as_any(&self) -> &dyn Any {
        self
      }
    }
  };
}

cropping_layer!(
  /// Crops the temporal axis of `[batch, steps, channels]` inputs.
  Cropping1D, "Cropping1D", "cropping1d"
);

cropping_layer!(
  /// Crops height and width of `[batch, h, w, channels]` inputs.
  Cropping2D, "Cropping2D", "cropping2d"
);

cropping_layer!(
  /// Crops all three spatial axes of `[batch, d, h, w, channels]` inputs.
  Cropping3D, "Cropping3D", "cropping3d"
);

fn crop<C: AsRef<[usize]>>(cropping: &[C], axes: usize) -> Result<Crop> {
  Ok(Crop { pairs: contract::validate_cropping(cropping, axes)?, input_shape: None })
}

impl Cropping1D {
  /// `cropping` is a single `[left, right]` pair.

  pub fn new(cropping: &[usize]) -> Result<Self> {
    Ok(Self { name: String::new(), crop: crop(&[cropping], 1)? })
  }
}

impl Cropping2D {
  pub fn new<C: AsRef<[usize]>>(cropping: &[C]) -> Result<Self> {
    Ok(Self { name: String::new(), crop: crop(cropping, 2)? })
  }
}

impl Cropping3D {
  pub fn new<C: AsRef<[usize]>>(cropping: &[C]) -> Result<Self> {
    Ok(Self { name: String::new(), crop: crop(cropping, 3)? })
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ engine::Graph, tensor::Tensor };

  #[test]
  fn validation() {
    assert!(Cropping1D::new(&[1, 2]).is_ok());
    assert!(Cropping1D::new(&[1, 2, 3]).is_err());
    assert!(Cropping2D::new(&[[1usize, 2]]).is_err());
    assert!(Cropping2D::new(&[vec![1usize, 2], vec![3]]).is_err());
    assert!(Cropping3D::new(&[[1usize, 1], [0, 0], [2, 0]]).is_ok());
  }

  #[test]
  fn error_messages() {
    let err = Cropping2D::new(&[[1usize, 2]]).unwrap_err();
    assert_eq!(err.to_string(), "invalid configuration: The cropping should be an array of size 2.");
  }

  #[test]
  fn output_shapes() {
    let layer = Cropping2D::new(&[[1usize, 2], [0, 3]]).unwrap();
    let out = layer.compute_output_shape(&Shape::batched(&[10, 10, 3])).unwrap();
    assert_eq!(out, Shape::new(&[-1, 7, 7, 3]));
    assert!(matches!(layer.compute_output_shape(&Shape::batched(&[10, 3])), Err(Error::Rank { .. })));
  }

  #[test]
  fn slices_input() {
    let mut graph = Graph::new();
    let input_shape = Shape::batched(&[5, 1]);
    let x = graph.build_op(Op::Placeholder { shape: input_shape.clone() }, &[], Some("x")).unwrap();
    let mut layer = Cropping1D::new(&[1, 2]).unwrap();
    layer.define_variables(&mut graph, &input_shape).unwrap();
    let y = layer.transform_input(&mut graph, x).unwrap();
    graph.build_op(Op::Identity, &[y], Some("y")).unwrap();

    let input = Tensor::new(&[1, 5, 1], vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let out = graph.run_fetch(&[("x", &input)], &["y"]).unwrap();
    assert_eq!(out[0].dims(), &[1, 2, 1]);
    assert_eq!(out[0].raw(), &[2.0, 3.0]);
  }

  #[test]
  fn needs_input_shape() {
    let mut graph = Graph::new();
    let x = graph.build_op(Op::Placeholder { shape: Shape::batched(&[5, 1]) }, &[], None).unwrap();
    let layer = Cropping1D::new(&[1, 2]).unwrap();
    assert!(matches!(layer.transform_input(&mut graph, x), Err(Error::UninitializedModel(_))));
  }
}
