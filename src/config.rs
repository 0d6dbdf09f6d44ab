//! Serializable descriptions of layers and models.

use std::{ fs, path::Path };

use serde::{Serialize, Deserialize};

use crate::{
  activations::Activation,
  contract::Padding,
  error::{ Error, Result },
  initializers::Initializer,
  layers::*,
};


/// Hyperparameters of a single layer, enough to rebuild it.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerConfig {
  Input {
    name: String,
    dims: Vec<usize>,
  },
  Conv2D {
    name: String,
    filters: usize,
    kernel_size: Vec<usize>,
    strides: Vec<usize>,
    padding: Padding,
    activation: Activation,
    kernel_initializer: Initializer,
    bias_initializer: Initializer,
  },
  DepthwiseConv2D {
    name: String,
    depth_multiplier: usize,
    kernel_size: Vec<usize>,
    strides: Vec<usize>,
    padding: Padding,
    activation: Activation,
    kernel_initializer: Initializer,
    bias_initializer: Initializer,
  },
  MaxPool2D {
    name: String,
    pool_size: Vec<usize>,
    strides: Vec<usize>,
    padding: Padding,
  },
  AvgPool2D {
    name: String,
    pool_size: Vec<usize>,
    strides: Vec<usize>,
    padding: Padding,
  },
  Cropping1D {
    name: String,
    cropping: Vec<Vec<usize>>,
  },
  Cropping2D {
    name: String,
    cropping: Vec<Vec<usize>>,
  },
  Cropping3D {
    name: String,
    cropping: Vec<Vec<usize>>,
  },
  Flatten {
    name: String,
  },
  Dense {
    name: String,
    units: usize,
    activation: Activation,
    kernel_initializer: Initializer,
    bias_initializer: Initializer,
  },
  Activation {
    name: String,
    activation: Activation,
  },
  ReLU {
    name: String,
    max_value: Option<f32>,
    negative_slope: f32,
    threshold: f32,
  },
}

impl LayerConfig {
  /// Instantiate a fresh, variable-less layer.

  pub fn build(&self) -> Result<Box<dyn Layer>> {
    let layer: Box<dyn Layer> = match self {
      Self::Input { .. } => Box::new(self.build_input()?),
      Self::Conv2D { name, filters, kernel_size, strides, padding, activation, kernel_initializer, bias_initializer } => {
        Box::new(Conv2D::new(*filters, kernel_size, strides, *padding)?
          .activation(*activation)
          .kernel_initializer(*kernel_initializer)
          .bias_initializer(*bias_initializer)
          .named(name))
      },
      Self::DepthwiseConv2D { name, depth_multiplier, kernel_size, strides, padding, activation, kernel_initializer, bias_initializer } => {
        Box::new(DepthwiseConv2D::new(kernel_size, strides, *padding)?
          .depth_multiplier(*depth_multiplier)?
          .activation(*activation)
          .kernel_initializer(*kernel_initializer)
          .bias_initializer(*bias_initializer)
          .named(name))
      },
      Self::MaxPool2D { name, pool_size, strides, padding } => {
        Box::new(MaxPool2D::new(pool_size, strides, *padding)?.named(name))
      },
      Self::AvgPool2D { name, pool_size, strides, padding } => {
        Box::new(AvgPool2D::new(pool_size, strides, *padding)?.named(name))
      },
      Self::Cropping1D { name, cropping } => {
        let pair = match cropping.as_slice() {
          [pair] => pair,
          _ => return Err(Error::config("The cropping should be an array of size 1.")),
        };
        Box::new(Cropping1D::new(pair)?.named(name))
      },
      Self::Cropping2D { name, cropping } => Box::new(Cropping2D::new(cropping)?.named(name)),
      Self::Cropping3D { name, cropping } => Box::new(Cropping3D::new(cropping)?.named(name)),
      Self::Flatten { name } => Box::new(Flatten::new().named(name)),
      Self::Dense { name, units, activation, kernel_initializer, bias_initializer } => {
        Box::new(Dense::new(*units)?
          .activation(*activation)
          .kernel_initializer(*kernel_initializer)
          .bias_initializer(*bias_initializer)
          .named(name))
      },
      Self::Activation { name, activation } => Box::new(ActivationLayer::new(*activation).named(name)),
      Self::ReLU { name, max_value, negative_slope, threshold } => {
        let mut relu = ReLU::new().negative_slope(*negative_slope)?.threshold(*threshold).named(name);
        if let Some(max_value) = max_value {
          relu = relu.max_value(*max_value)?;
        }
        Box::new(relu)
      },
    };
    Ok(layer)
  }

  pub fn build_input(&self) -> Result<Input> {
    match self {
      Self::Input { name, dims } => Ok(Input::new(dims)?.named(name)),
      other => Err(Error::config(format!("expected an input layer, got {other:?}"))),
    }
  }

  pub fn name(&self) -> &str {
    match self {
      Self::Input { name, .. }
      | Self::Conv2D { name, .. }
      | Self::DepthwiseConv2D { name, .. }
      | Self::MaxPool2D { name, .. }
      | Self::AvgPool2D { name, .. }
      | Self::Cropping1D { name, .. }
      | Self::Cropping2D { name, .. }
      | Self::Cropping3D { name, .. }
      | Self::Flatten { name }
      | Self::Dense { name, .. }
      | Self::Activation { name, .. }
      | Self::ReLU { name, .. } => name,
    }
  }
}


/// Architecture of a sequential model.
///
/// Only hyperparameters are stored. Variable values are not part of a config.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
  pub input: LayerConfig,
  pub layers: Vec<LayerConfig>,
}

impl ModelConfig {
  pub fn load(filename: impl AsRef<Path>) -> Result<Self> {
    let bytes = fs::read(filename)?;
    Ok(postcard::from_bytes(&bytes)?)
  }

  pub fn save(&self, filename: impl AsRef<Path>) -> Result<()> {
    let data: Vec<u8> = postcard::to_allocvec(self)?;
    fs::write(filename, data)?;
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn layer_round_trip() {
    let conv = Conv2D::new(32, &[5, 5], &[1, 1, 1, 1], Padding::Same).unwrap()
      .kernel_initializer(Initializer::he_normal(12))
      .named("conv2d_1");
    let rebuilt = conv.config().build().unwrap();
    assert_eq!(rebuilt.name(), "conv2d_1");
    assert_eq!(rebuilt.kind(), "Conv2D");
    assert_eq!(rebuilt.config(), conv.config());
  }

  #[test]
  fn relu_round_trip() {
    let relu = ReLU::new().max_value(6.0).unwrap().threshold(0.5).named("relu_3");
    assert_eq!(relu.config().build().unwrap().config(), relu.config());
  }

  #[test]
  fn invalid_configs() {
    let bad = LayerConfig::Cropping2D { name: "crop".into(), cropping: vec![vec![1, 2]] };
    assert!(matches!(bad.build(), Err(Error::Configuration(_))));
    assert!(LayerConfig::Flatten { name: "f".into() }.build_input().is_err());
  }

  #[test]
  fn postcard_encoding() {
    let config = ModelConfig {
      input: LayerConfig::Input { name: "input".into(), dims: vec![28, 28, 1] },
      layers: vec![
        LayerConfig::Flatten { name: "flatten_1".into() },
        LayerConfig::ReLU { name: "relu_2".into(), max_value: None, negative_slope: 0.0, threshold: 0.0 },
      ],
    };
    let bytes = postcard::to_allocvec(&config).unwrap();
    let decoded: ModelConfig = postcard::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, config);
  }
}
