use serde::{Serialize, Deserialize};


/// Dense, row-major multidimensional array of `f32`.
///
/// Tensors are what flows in and out of an [Engine](crate::engine::Engine):
/// fed into placeholders, assigned to variables and returned from fetches.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
  dims: Vec<usize>,
  data: Vec<f32>,
}

impl Tensor {
  /// # Panics
  /// When the number of elements in `data` doesn't match `dims`.

  pub fn new(dims: &[usize], data: Vec<f32>) -> Self {
    assert_eq!(dims.iter().product::<usize>(), data.len(),
      "Tensor{:?} doesn't match data length {}", dims, data.len());
    Self { dims: dims.to_vec(), data }
  }

  pub fn scalar(item: f32) -> Self {
    Self::new(&[], vec![item])
  }

  pub fn vec(vec: &[f32]) -> Self {
    Self::new(&[vec.len()], vec.to_vec())
  }

  pub fn fill(dims: &[usize], filler: f32) -> Self {
    Self::new(dims, vec![filler; dims.iter().product()])
  }

  pub fn zeros(dims: &[usize]) -> Self {
    Self::fill(dims, 0.0)
  }

  pub fn ones(dims: &[usize]) -> Self {
    Self::fill(dims, 1.0)
  }

  pub fn arrange(dims: &[usize], start: f32, step: f32) -> Self {
    let len = dims.iter().product();
    let data = (0..len).map(|i| start + step * i as f32 ).collect();
    Self::new(dims, data)
  }

  pub fn init(dims: &[usize], mut cb: impl FnMut() -> f32) -> Self {
    let len = dims.iter().product();
    let data = (0..len).map(|_| cb() ).collect();
    Self::new(dims, data)
  }

  pub fn dims(&self) -> &[usize] {
    &self.dims
  }

  pub fn rank(&self) -> usize {
    self.dims.len()
  }

  pub fn size(&self) -> usize {
    self.data.len()
  }

  pub fn raw(&self) -> &[f32] {
    &self.data
  }

  pub fn raw_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }

  pub fn into_raw(self) -> Vec<f32> {
    self.data
  }

  /// The single value of a tensor with exactly one element.

  pub fn item(&self) -> Option<f32> {
    (self.data.len() == 1).then(|| self.data[0] )
  }

  /// Same data, new extents. Returns `None` when the element count differs.

  pub fn reshaped(self, dims: &[usize]) -> Option<Self> {
    if dims.iter().product::<usize>() != self.data.len() { return None }
    Some(Self { dims: dims.to_vec(), data: self.data })
  }

  pub fn vectorize(&self, cb: impl Fn(f32) -> f32) -> Self {
    Self { dims: self.dims.clone(), data: self.data.iter().map(|&a| cb(a) ).collect() }
  }

  /// Element-wise comparison within an absolute tolerance.

  pub fn approx_eq(&self, rhs: &Self, eps: f32) -> bool {
    self.dims == rhs.dims &&
      self.data.iter().zip(&rhs.data).all(|(a, b)| (a - b).abs() <= eps )
  }
}

impl std::fmt::Display for Tensor {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Tensor{:?} ", self.dims)?;
    print_chunks(0, &self.dims, &self.data, f)
  }
}

fn print_chunks(idx: usize, dims: &[usize], vec: &[f32], f: &mut std::fmt::Formatter) -> std::fmt::Result {
  let indent = (0..idx * 2).map(|_| " ").collect::<String>();
  if dims.is_empty() {
    write!(f, "{indent}{:?}", vec[0])?;
  } else if idx == dims.len() - 1 || vec.is_empty() {
    writeln!(f, "{indent}{:?}", vec)?;
  } else {
    let chunks = vec.chunks(vec.len() / dims[idx]);
    writeln!(f, "{indent}[")?;
    for chunk in chunks {
      print_chunks(idx + 1, dims, chunk, f)?;
    }
    writeln!(f, "{indent}]")?;
  }
  Ok(())
}
