use itertools::Itertools;
use serde::{Serialize, Deserialize};

use crate::internal::*;


/// Extent used for axes whose size is only known at run time (the batch axis).

pub const UNKNOWN: i64 = -1;


/// The shape of a layer's input or output.
///
/// The first axis of an activation shape is conventionally the batch axis,
/// which holds [UNKNOWN].

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
  pub dims: Vec<i64>,
}

impl Shape {
  pub fn new(dims: &[i64]) -> Self {
    Self { dims: dims.to_vec() }
  }

  /// Prepend an unknown batch axis to the given extents.

  pub fn batched(dims: &[usize]) -> Self {
    let dims = std::iter::once(UNKNOWN)
      .chain(dims.iter().map(|&n| n as i64 ))
      .collect();
    Self { dims }
  }

  pub fn rank(&self) -> usize {
    self.dims.len()
  }

  /// Number of elements per batch item, i.e. the product of all known extents.

  pub fn size(&self) -> usize {
    self.dims.iter()
      .filter(|&&n| n != UNKNOWN )
      .map(|&n| n as usize )
      .product()
  }

  pub fn is_fully_known(&self) -> bool {
    self.dims.iter().all(|&n| n != UNKNOWN )
  }

  /// Extents without the leading batch axis.

  pub fn features(&self) -> &[i64] {
    if self.dims.first() == Some(&UNKNOWN) { &self.dims[1..] } else { &self.dims }
  }

  /// Concrete extents, substituting `batch` for every unknown axis.

  pub fn resolve(&self, batch: usize) -> Vec<usize> {
    self.dims.iter()
      .map(|&n| if n == UNKNOWN { batch } else { n as usize })
      .collect()
  }

  pub fn at(&self, idx: isize) -> Option<i64> {
    let off_bounds = if idx < 0 {
      idx.unsigned_abs() > self.rank()
    } else {
      idx as usize >= self.rank()
    };
    if off_bounds { None } else { Some(self[idx]) }
  }
}

impl std::ops::Index<isize> for Shape {
  type Output = i64;

  fn index(&self, i: isize) -> &i64 {
    let idx = negative_index(i, self.rank());
    &self.dims[idx]
  }
}

impl From<Vec<i64>> for Shape {
  fn from(dims: Vec<i64>) -> Self {
    Self { dims }
  }
}

impl std::fmt::Display for Shape {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "[{}]", self.dims.iter().join(", "))
  }
}
