use serde::{Serialize, Deserialize};

use crate::{
  engine::{ Engine, Op, Operand },
  error::Result,
};


/// Optimization strategy bound to a model at compile time.
///
/// Training loops belong to the engine. The model only records which
/// strategy and hyperparameters the engine should use.

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Optimizer {
  /// Stochastic Gradient Descent
  SGD { learning_rate: f32 },
  /// Stochastic Gradient Descent with momentum
  Momentum { learning_rate: f32, momentum: f32 },
  /// Stochastic Gradient Descent with Nesterov momentum
  Nesterov { learning_rate: f32, momentum: f32 },
  /// Adaptive Movement Estimation (ADAM)
  Adam { learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32 },
}

impl Optimizer {
  pub fn sgd(learning_rate: f32) -> Self {
    Self::SGD { learning_rate }
  }

  pub fn momentum(learning_rate: f32) -> Self {
    Self::Momentum { learning_rate, momentum: 0.9 }
  }

  pub fn nesterov(learning_rate: f32) -> Self {
    Self::Nesterov { learning_rate, momentum: 0.9 }
  }

  pub fn adam() -> Self {
    Self::Adam { learning_rate: 0.001, beta1: 0.9, beta2: 0.999, epsilon: 1e-8 }
  }

  pub fn learning_rate(&self) -> f32 {
    match *self {
      Self::SGD { learning_rate }
      | Self::Momentum { learning_rate, .. }
      | Self::Nesterov { learning_rate, .. }
      | Self::Adam { learning_rate, .. } => learning_rate,
    }
  }
}

impl Default for Optimizer {
  fn default() -> Self {
    Self::adam()
  }
}


/// Objective reduced to a scalar by the engine.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loss {
  MeanSquaredError,
  SoftmaxCrossEntropyWithLogits,
}

impl Loss {
  pub fn build(&self, engine: &mut dyn Engine, prediction: Operand, target: Operand, name: &str) -> Result<Operand> {
    let op = match self {
      Self::MeanSquaredError => Op::MeanSquaredError,
      Self::SoftmaxCrossEntropyWithLogits => Op::SoftmaxCrossEntropy,
    };
    Ok(engine.build_op(op, &[prediction, target], Some(name))?)
  }
}
