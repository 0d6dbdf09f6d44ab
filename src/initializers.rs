use rand::{ Rng, SeedableRng, rngs::StdRng };
use serde::{Serialize, Deserialize};

use crate::{
  internal::*,
  tensor::Tensor,
};


/// Strategy for filling a freshly created variable.
///
/// Seeded variants are deterministic. Variance-scaling variants derive their
/// scale from the variable's fan-in and fan-out.

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
  Zeros,
  Ones,
  Constant(f32),
  RandomNormal { mean: f32, stddev: f32, seed: Option<u64> },
  RandomUniform { min: f32, max: f32, seed: Option<u64> },
  GlorotNormal { seed: Option<u64> },
  GlorotUniform { seed: Option<u64> },
  HeNormal { seed: Option<u64> },
  HeUniform { seed: Option<u64> },
  LeCunNormal { seed: Option<u64> },
}

impl Initializer {
  pub fn glorot_uniform() -> Self {
    Self::GlorotUniform { seed: None }
  }

  pub fn he_normal(seed: u64) -> Self {
    Self::HeNormal { seed: Some(seed) }
  }

  /// Produce a tensor of the given extents.

  pub fn generate(&self, dims: &[usize]) -> Tensor {
    let (fan_in, fan_out) = fans(dims);
    let (fan_in, fan_out) = (fan_in.max(1) as f32, fan_out.max(1) as f32);
    match *self {
      Self::Zeros => Tensor::zeros(dims),
      Self::Ones => Tensor::ones(dims),
      Self::Constant(value) => Tensor::fill(dims, value),
      Self::RandomNormal { mean, stddev, seed } => normal(dims, mean, stddev, seed),
      Self::RandomUniform { min, max, seed } => uniform(dims, min, max, seed),
      Self::GlorotNormal { seed } => normal(dims, 0.0, (2.0 / (fan_in + fan_out)).sqrt(), seed),
      Self::GlorotUniform { seed } => {
        let limit = (6.0 / (fan_in + fan_out)).sqrt();
        uniform(dims, -limit, limit, seed)
      },
      Self::HeNormal { seed } => normal(dims, 0.0, (2.0 / fan_in).sqrt(), seed),
      Self::HeUniform { seed } => {
        let limit = (6.0 / fan_in).sqrt();
        uniform(dims, -limit, limit, seed)
      },
      Self::LeCunNormal { seed } => normal(dims, 0.0, (1.0 / fan_in).sqrt(), seed),
    }
  }
}

impl Default for Initializer {
  fn default() -> Self {
    Self::glorot_uniform()
  }
}


/// Fan-in and fan-out of a weight tensor.
///
/// Convolution kernels are laid out `[kh, kw, in, out]`.

pub fn fans(dims: &[usize]) -> (usize, usize) {
  match *dims {
    [] => (1, 1),
    [n] => (n, n),
    [fan_in, fan_out] => (fan_in, fan_out),
    _ => {
      let (spatial, channels) = dims.split_at(dims.len() - 2);
      let receptive: usize = spatial.iter().product();
      (receptive * channels[0], receptive * channels[1])
    },
  }
}

fn rng(seed: Option<u64>) -> StdRng {
  match seed {
    Some(seed) => StdRng::seed_from_u64(seed),
    None => StdRng::from_entropy(),
  }
}

fn normal(dims: &[usize], mean: f32, stddev: f32, seed: Option<u64>) -> Tensor {
  let mut rng = rng(seed);
  let mut spare = None;
  Tensor::init(dims, || {
    let sample = match spare.take() {
      Some(sample) => sample,
      None => {
        let (a, b) = randn(&mut rng);
        spare = Some(b);
        a
      },
    };
    mean + sample * stddev
  })
}

fn uniform(dims: &[usize], min: f32, max: f32, seed: Option<u64>) -> Tensor {
  let mut rng = rng(seed);
  if min >= max { return Tensor::fill(dims, min) }
  Tensor::init(dims, || rng.gen_range(min, max) )
}
