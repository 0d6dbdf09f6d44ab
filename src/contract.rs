//! Shape arithmetic shared by the layers and the reference engine.
//!
//! Everything here is pure: the same inputs always produce the same shape.

use serde::{Serialize, Deserialize};

use crate::{
  internal::*,
  shape::{ Shape, UNKNOWN },
  error::{ Error, Result },
};


/// How spatial output extents are derived from kernel size and stride.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
  /// Output extent is `ceil(input / stride)`.
  Same,
  /// No padding. Output extent is `ceil((input - kernel + 1) / stride)`.
  Valid,
  /// Declared for compatibility with Keras configs. Not implemented.
  Full,
}

impl std::fmt::Display for Padding {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match self {
      Self::Same => write!(f, "SAME"),
      Self::Valid => write!(f, "VALID"),
      Self::Full => write!(f, "FULL"),
    }
  }
}


/// Spatial output extent of a sliding window.
///
/// Unknown extents stay unknown.

pub fn conv_output_extent(input: i64, kernel: usize, stride: usize, padding: Padding) -> Result<i64> {
  if kernel == 0 || stride == 0 {
    return Err(Error::config(format!("window size and stride must be positive, got {kernel} and {stride}")))
  }
  if input == UNKNOWN { return Ok(UNKNOWN) }
  let (kernel, stride) = (kernel as i64, stride as i64);
  let output = match padding {
    Padding::Same => ceil_div(input, stride),
    Padding::Valid => ceil_div(input - kernel + 1, stride),
    Padding::Full => return Err(Error::Unsupported("FULL padding is not supported".into())),
  };
  if output <= 0 {
    return Err(Error::config(format!(
      "window of size {kernel} with stride {stride} and {padding} padding produces an empty output from an extent of {input}"
    )))
  }
  Ok(output)
}


/// Output of a 2D window (convolution or pooling) over an NHWC input.

pub fn window_output(
  layer: &str,
  input: &Shape,
  kernel: [usize; 2],
  strides: [usize; 2],
  padding: Padding,
  channels: i64,
) -> Result<Shape> {
  if input.rank() != 4 { return Err(Error::rank(layer, 4, input.rank())) }
  let height = conv_output_extent(input[1], kernel[0], strides[0], padding)?;
  let width = conv_output_extent(input[2], kernel[1], strides[1], padding)?;
  Ok(Shape::new(&[input[0], height, width, channels]))
}


/// Accept window parameters either as `[h, w]` or in NHWC form `[1, h, w, 1]`.

pub fn normalize_window(values: &[usize], what: &str) -> Result<[usize; 2]> {
  let window = match *values {
    [h, w] => [h, w],
    [1, h, w, 1] => [h, w],
    _ => return Err(Error::config(format!(
      "{what} should have the form [h, w] or [1, h, w, 1], got {values:?}"
    ))),
  };
  if window.contains(&0) {
    return Err(Error::config(format!("{what} must be positive, got {values:?}")))
  }
  Ok(window)
}


/// Check that `cropping` holds exactly one `[left, right]` pair per spatial axis.

pub fn validate_cropping<C: AsRef<[usize]>>(cropping: &[C], axes: usize) -> Result<Vec<[usize; 2]>> {
  if cropping.len() != axes {
    return Err(Error::config(format!("The cropping should be an array of size {axes}.")))
  }
  cropping.iter()
    .map(|pair| match pair.as_ref() {
      &[left, right] => Ok([left, right]),
      _ => Err(Error::config("All elements of cropping should be arrays of size 2.")),
    })
    .collect()
}


/// Remove `left` and `right` elements from each spatial axis.
///
/// The input is `[batch, spatial.., channels]`.

pub fn cropping_output(layer: &str, input: &Shape, cropping: &[[usize; 2]]) -> Result<Shape> {
  let rank = cropping.len() + 2;
  if input.rank() != rank { return Err(Error::rank(layer, rank, input.rank())) }
  let mut dims = input.dims.clone();
  for (axis, [left, right]) in cropping.iter().enumerate() {
    let extent = &mut dims[axis + 1];
    if *extent == UNKNOWN { continue }
    let cropped = *extent - *left as i64 - *right as i64;
    if cropped <= 0 {
      return Err(Error::config(format!(
        "cropping ({left}, {right}) leaves nothing of spatial axis {axis} with extent {extent}"
      )))
    }
    *extent = cropped;
  }
  Ok(dims.into())
}


/// Single-axis shape holding all non-batch elements.

pub fn flatten_output(input: &Shape) -> Result<Shape> {
  let features = input.features();
  if features.iter().any(|&n| n == UNKNOWN ) {
    return Err(Error::config(format!("cannot flatten {input} with unknown inner extents")))
  }
  Ok(Shape::new(&[features.iter().product()]))
}
