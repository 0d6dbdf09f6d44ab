use serde::{Serialize, Deserialize};

use crate::{
  engine::{ Engine, Op, Operand },
  error::Result,
};


/// Element-wise activation applied after a layer's primary transform.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
  Linear,
  #[default]
  Relu,
  Relu6,
  Sigmoid,
  Tanh,
  Softmax,
  Softplus,
}

impl Activation {
  pub fn apply(&self, engine: &mut dyn Engine, input: Operand) -> Result<Operand> {
    let op = match self {
      Self::Linear => return Ok(input),
      Self::Relu => Op::Relu { max_value: None, threshold: 0.0 },
      Self::Relu6 => Op::Relu { max_value: Some(6.0), threshold: 0.0 },
      Self::Sigmoid => Op::Sigmoid,
      Self::Tanh => Op::Tanh,
      Self::Softmax => Op::Softmax,
      Self::Softplus => Op::Softplus,
    };
    Ok(engine.build_op(op, &[input], None)?)
  }
}
