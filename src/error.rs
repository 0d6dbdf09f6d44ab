use thiserror::Error;

use crate::engine::EngineError;


/// Result type used throughout the crate.

pub type Result<T> = std::result::Result<T, Error>;


/// Everything that can go wrong while assembling, compiling or running a model.
///
/// All variants are local and synchronous. Nothing here is worth retrying.

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed hyperparameters, detected at construction or shape-computation time.
  #[error("invalid configuration: {0}")]
  Configuration(String),

  #[error("layer {layer} expects an input of rank {expected}, got rank {actual}")]
  Rank {
    layer: String,
    expected: usize,
    actual: usize,
  },

  #[error("The layer name {name} is used in previous layers. The layer name should be unique.")]
  DuplicateName { name: String },

  #[error("uninitialized model: {0}")]
  UninitializedModel(String),

  #[error("unsupported: {0}")]
  Unsupported(String),

  #[error("model is already compiled")]
  DoubleCompile,

  #[error("model has been disposed")]
  Disposed,

  #[error("engine error: {0}")]
  Engine(#[from] EngineError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("could not (de)serialize model config: {0}")]
  Serialization(#[from] postcard::Error),
}

impl Error {
  pub(crate) fn config(msg: impl Into<String>) -> Self {
    Self::Configuration(msg.into())
  }

  pub(crate) fn rank(layer: &str, expected: usize, actual: usize) -> Self {
    Self::Rank { layer: layer.to_string(), expected, actual }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn duplicate_name_message() {
    let err = Error::DuplicateName { name: "conv2d_1".into() };
    assert_eq!(
      err.to_string(),
      "The layer name conv2d_1 is used in previous layers. The layer name should be unique."
    );
  }

  #[test]
  fn engine_errors_convert() {
    let err: Error = EngineError::Closed.into();
    assert!(matches!(err, Error::Engine(EngineError::Closed)));
  }
}
