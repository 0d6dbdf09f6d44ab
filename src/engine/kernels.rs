#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::{
  contract::{ self, Padding },
  error::Error,
  shape::{ Shape, UNKNOWN },
  tensor::Tensor,
  engine::{ EngineError, EngineResult },
};


enum Reduction {
  Max,
  Average,
}


fn dims4(tensor: &Tensor, what: &str) -> EngineResult<[usize; 4]> {
  tensor.dims().try_into().map_err(|_| EngineError::ShapeMismatch(
    format!("{what} must have rank 4, got {:?}", tensor.dims())
  ))
}

// Output extent and leading padding of a sliding window
fn window(input: usize, kernel: usize, stride: usize, padding: Padding) -> EngineResult<(usize, usize)> {
  let output = contract::conv_output_extent(input as i64, kernel, stride, padding)
    .map_err(|err| match err {
      Error::Unsupported(msg) => EngineError::Unsupported(msg),
      err => EngineError::ShapeMismatch(err.to_string()),
    })? as usize;
  let pad = match padding {
    Padding::Same => ((output - 1) * stride + kernel).saturating_sub(input) / 2,
    _ => 0,
  };
  Ok((output, pad))
}

#[inline]
fn source(out: usize, k: usize, stride: usize, pad: usize, extent: usize) -> Option<usize> {
  let pos = (out * stride + k).checked_sub(pad)?;
  (pos < extent).then(|| pos )
}

// Run `cb` once per batch item on that item's slice of the output
fn for_each_item<F>(out: &mut [f32], per_item: usize, cb: F)
where
  F: Fn(usize, &mut [f32]) + Send + Sync,
{
  if per_item == 0 { return }

  #[cfg(feature = "rayon")]
  out.par_chunks_mut(per_item).enumerate().for_each(|(b, chunk)| cb(b, chunk) );

  #[cfg(not(feature = "rayon"))]
  out.chunks_mut(per_item).enumerate().for_each(|(b, chunk)| cb(b, chunk) );
}


pub fn conv2d(input: &Tensor, kernel: &Tensor, strides: [usize; 2], padding: Padding) -> EngineResult<Tensor> {
  let [n, h, w, c] = dims4(input, "conv2d input")?;
  let [kh, kw, kc, f] = dims4(kernel, "conv2d kernel")?;
  if kc != c {
    return Err(EngineError::ShapeMismatch(format!("kernel expects {kc} input channels, got {c}")))
  }
  let (oh, pad_top) = window(h, kh, strides[0], padding)?;
  let (ow, pad_left) = window(w, kw, strides[1], padding)?;

  let x = input.raw();
  let k = kernel.raw();
  let mut out = vec![0.0; n * oh * ow * f];
  for_each_item(&mut out, oh * ow * f, |b, item| {
    for oy in 0..oh {
      for ox in 0..ow {
        let o = &mut item[(oy * ow + ox) * f..(oy * ow + ox + 1) * f];
        for ky in 0..kh {
          let Some(iy) = source(oy, ky, strides[0], pad_top, h) else { continue };
          for kx in 0..kw {
            let Some(ix) = source(ox, kx, strides[1], pad_left, w) else { continue };
            let xi = ((b * h + iy) * w + ix) * c;
            for ci in 0..c {
              let xv = x[xi + ci];
              let ki = ((ky * kw + kx) * c + ci) * f;
              for (o, kv) in o.iter_mut().zip(&k[ki..ki + f]) {
                *o += xv * kv;
              }
            }
          }
        }
      }
    }
  });
  Ok(Tensor::new(&[n, oh, ow, f], out))
}


pub fn depthwise_conv2d(input: &Tensor, kernel: &Tensor, strides: [usize; 2], padding: Padding) -> EngineResult<Tensor> {
  let [n, h, w, c] = dims4(input, "depthwise input")?;
  let [kh, kw, kc, m] = dims4(kernel, "depthwise kernel")?;
  if kc != c {
    return Err(EngineError::ShapeMismatch(format!("kernel expects {kc} input channels, got {c}")))
  }
  let (oh, pad_top) = window(h, kh, strides[0], padding)?;
  let (ow, pad_left) = window(w, kw, strides[1], padding)?;
  let co = c * m;

  let x = input.raw();
  let k = kernel.raw();
  let mut out = vec![0.0; n * oh * ow * co];
  for_each_item(&mut out, oh * ow * co, |b, item| {
    for oy in 0..oh {
      for ox in 0..ow {
        let o = &mut item[(oy * ow + ox) * co..(oy * ow + ox + 1) * co];
        for ky in 0..kh {
          let Some(iy) = source(oy, ky, strides[0], pad_top, h) else { continue };
          for kx in 0..kw {
            let Some(ix) = source(ox, kx, strides[1], pad_left, w) else { continue };
            let xi = ((b * h + iy) * w + ix) * c;
            for ci in 0..c {
              let xv = x[xi + ci];
              let ki = ((ky * kw + kx) * c + ci) * m;
              for j in 0..m {
                o[ci * m + j] += xv * k[ki + j];
              }
            }
          }
        }
      }
    }
  });
  Ok(Tensor::new(&[n, oh, ow, co], out))
}


pub fn max_pool(input: &Tensor, size: [usize; 2], strides: [usize; 2], padding: Padding) -> EngineResult<Tensor> {
  pool(input, size, strides, padding, Reduction::Max)
}

pub fn avg_pool(input: &Tensor, size: [usize; 2], strides: [usize; 2], padding: Padding) -> EngineResult<Tensor> {
  pool(input, size, strides, padding, Reduction::Average)
}

fn pool(input: &Tensor, size: [usize; 2], strides: [usize; 2], padding: Padding, reduction: Reduction) -> EngineResult<Tensor> {
  let [n, h, w, c] = dims4(input, "pooling input")?;
  let (oh, pad_top) = window(h, size[0], strides[0], padding)?;
  let (ow, pad_left) = window(w, size[1], strides[1], padding)?;

  let x = input.raw();
  let mut out = vec![0.0; n * oh * ow * c];
  for_each_item(&mut out, oh * ow * c, |b, item| {
    for oy in 0..oh {
      for ox in 0..ow {
        for ci in 0..c {
          let mut acc = match reduction {
            Reduction::Max => f32::NEG_INFINITY,
            Reduction::Average => 0.0,
          };
          let mut count = 0;
          for ky in 0..size[0] {
            let Some(iy) = source(oy, ky, strides[0], pad_top, h) else { continue };
            for kx in 0..size[1] {
              let Some(ix) = source(ox, kx, strides[1], pad_left, w) else { continue };
              let xv = x[((b * h + iy) * w + ix) * c + ci];
              acc = match reduction {
                Reduction::Max => acc.max(xv),
                Reduction::Average => acc + xv,
              };
              count += 1;
            }
          }
          item[(oy * ow + ox) * c + ci] = match reduction {
            Reduction::Max => acc,
            Reduction::Average => acc / count.max(1) as f32,
          };
        }
      }
    }
  });
  Ok(Tensor::new(&[n, oh, ow, c], out))
}


/// Multiply the last axis of `lhs` with a `[k, n]` matrix.

pub fn matmul(lhs: &Tensor, rhs: &Tensor) -> EngineResult<Tensor> {
  let (Some((&k, outer)), &[rows_r, cols_r]) = (lhs.dims().split_last(), rhs.dims()) else {
    return Err(EngineError::ShapeMismatch(format!("cannot multiply {:?} with {:?}", lhs.dims(), rhs.dims())))
  };
  if k != rows_r {
    return Err(EngineError::ShapeMismatch(format!("cannot multiply {:?} with {:?}", lhs.dims(), rhs.dims())))
  }
  let rows_l: usize = outer.iter().product();
  let data = matmul_raw(lhs.raw(), rhs.raw(), rows_l, k, cols_r);
  let dims = [outer, &[cols_r]].concat();
  Ok(Tensor::new(&dims, data))
}

#[cfg(feature = "unsafe")]
fn matmul_raw(lhs: &[f32], rhs: &[f32], rows_l: usize, cols_l: usize, cols_r: usize) -> Vec<f32> {
  let mut data = vec![0.0; rows_l * cols_r];
  if data.is_empty() || cols_l == 0 { return data }
  unsafe {
    matrixmultiply::sgemm(
      rows_l,
      cols_l,
      cols_r,
      1.0,
      lhs.as_ptr(),
      cols_l as isize,
      1,
      rhs.as_ptr(),
      cols_r as isize,
      1,
      0.0,
      data.as_mut_ptr(),
      cols_r as isize,
      1,
    );
  };
  data
}

#[cfg(not(feature = "unsafe"))]
fn matmul_raw(lhs: &[f32], rhs: &[f32], rows_l: usize, cols_l: usize, cols_r: usize) -> Vec<f32> {
  let mut data = vec![0.0; rows_l * cols_r];
  for i in 0..rows_l {
    for j in 0..cols_r {
      for k in 0..cols_l {
        data[i * cols_r + j] += lhs[i * cols_l + k] * rhs[k * cols_r + j];
      }
    }
  }
  data
}


pub fn bias_add(input: &Tensor, bias: &Tensor) -> EngineResult<Tensor> {
  let channels = input.dims().last().copied().unwrap_or(1);
  if bias.dims() != [channels] {
    return Err(EngineError::ShapeMismatch(
      format!("bias {:?} doesn't match last axis of {:?}", bias.dims(), input.dims())
    ))
  }
  let b = bias.raw();
  let data = input.raw()
    .chunks(channels.max(1))
    .flat_map(|row| row.iter().zip(b).map(|(x, b)| x + b ) )
    .collect();
  Ok(Tensor::new(input.dims(), data))
}


pub fn slice(input: &Tensor, begin: &[usize], size: &[i64]) -> EngineResult<Tensor> {
  let dims = input.dims();
  if begin.len() != dims.len() || size.len() != dims.len() {
    return Err(EngineError::ShapeMismatch(
      format!("slice of rank {} applied to {:?}", begin.len(), dims)
    ))
  }
  let out_dims = dims.iter().zip(begin).zip(size)
    .map(|((&extent, &start), &len)| {
      let len = if len == UNKNOWN { extent.saturating_sub(start) } else { len as usize };
      if start + len > extent {
        Err(EngineError::ShapeMismatch(format!("slice {begin:?}+{size:?} out of bounds for {dims:?}")))
      } else {
        Ok(len)
      }
    })
    .collect::<EngineResult<Vec<_>>>()?;

  let mut strides = vec![1; dims.len()];
  for d in (1..dims.len()).rev() {
    strides[d - 1] = strides[d] * dims[d];
  }

  let total = out_dims.iter().product();
  let x = input.raw();
  let mut data = Vec::with_capacity(total);
  let mut idx = vec![0; dims.len()];
  for _ in 0..total {
    let offset: usize = idx.iter().zip(begin).zip(&strides)
      .map(|((i, b), s)| (i + b) * s )
      .sum();
    data.push(x[offset]);
    for d in (0..idx.len()).rev() {
      idx[d] += 1;
      if idx[d] < out_dims[d] { break }
      idx[d] = 0;
    }
  }
  Ok(Tensor::new(&out_dims, data))
}


pub fn reshape(input: &Tensor, shape: &Shape) -> EngineResult<Tensor> {
  let known: usize = shape.size();
  let unknown = shape.dims.iter().filter(|&&n| n == UNKNOWN ).count();
  let mismatch = || EngineError::ShapeMismatch(format!("cannot reshape {:?} into {shape}", input.dims()));
  let dims = match unknown {
    0 => shape.resolve(0),
    1 if known > 0 && input.size() % known == 0 => shape.resolve(input.size() / known),
    _ => return Err(mismatch()),
  };
  input.clone().reshaped(&dims).ok_or_else(mismatch)
}


pub fn relu(input: &Tensor, max_value: Option<f32>, threshold: f32) -> Tensor {
  input.vectorize(|x| {
    let x = if x >= threshold { x } else { 0.0 };
    max_value.map_or(x, |max| x.min(max) )
  })
}

pub fn sigmoid(input: &Tensor) -> Tensor {
  input.vectorize(|x| 1.0 / (1.0 + (-x).exp()) )
}

pub fn tanh(input: &Tensor) -> Tensor {
  input.vectorize(f32::tanh)
}

pub fn softplus(input: &Tensor) -> Tensor {
  input.vectorize(|x| x.exp().ln_1p() )
}

pub fn softmax(input: &Tensor) -> Tensor {
  let classes = input.dims().last().copied().unwrap_or(1).max(1);
  let data = input.raw()
    .chunks(classes)
    .flat_map(|row| {
      let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
      let exp: Vec<f32> = row.iter().map(|x| (x - max).exp() ).collect();
      let sum: f32 = exp.iter().sum();
      exp.into_iter().map(move |e| e / sum )
    })
    .collect();
  Tensor::new(input.dims(), data)
}


pub fn mean_squared_error(prediction: &Tensor, target: &Tensor) -> EngineResult<Tensor> {
  if prediction.dims() != target.dims() {
    return Err(EngineError::ShapeMismatch(
      format!("prediction {:?} vs target {:?}", prediction.dims(), target.dims())
    ))
  }
  let sum: f32 = prediction.raw().iter().zip(target.raw())
    .map(|(p, t)| (p - t) * (p - t) )
    .sum();
  Ok(Tensor::scalar(sum / prediction.size().max(1) as f32))
}

pub fn softmax_cross_entropy(logits: &Tensor, labels: &Tensor) -> EngineResult<Tensor> {
  if logits.dims() != labels.dims() {
    return Err(EngineError::ShapeMismatch(
      format!("logits {:?} vs labels {:?}", logits.dims(), labels.dims())
    ))
  }
  let classes = logits.dims().last().copied().unwrap_or(1).max(1);
  let rows = logits.size() / classes;
  let total: f32 = logits.raw().chunks(classes)
    .zip(labels.raw().chunks(classes))
    .map(|(row, label)| {
      let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
      let log_sum = row.iter().map(|x| (x - max).exp() ).sum::<f32>().ln();
      -row.iter().zip(label).map(|(x, l)| l * (x - max - log_sum) ).sum::<f32>()
    })
    .sum();
  Ok(Tensor::scalar(total / rows.max(1) as f32))
}


#[cfg(test)]
mod tests {
  use super::*;

  fn image(h: usize, w: usize) -> Tensor {
    Tensor::arrange(&[1, h, w, 1], 1.0, 1.0)
  }

  #[test]
  fn conv_identity_kernel() {
    let x = image(3, 3);
    let k = Tensor::new(&[1, 1, 1, 1], vec![2.0]);
    let y = conv2d(&x, &k, [1, 1], Padding::Valid).unwrap();
    assert_eq!(y.dims(), &[1, 3, 3, 1]);
    assert_eq!(y.raw(), x.vectorize(|v| v * 2.0 ).raw());
  }

  #[test]
  fn conv_same_padding() {
    let x = image(3, 3);
    let k = Tensor::ones(&[3, 3, 1, 1]);
    let y = conv2d(&x, &k, [1, 1], Padding::Same).unwrap();
    assert_eq!(y.dims(), &[1, 3, 3, 1]);
    // Center sees everything, corner sees its 2x2 neighbourhood
    assert_eq!(y.raw()[4], 45.0);
    assert_eq!(y.raw()[0], 1.0 + 2.0 + 4.0 + 5.0);
  }

  #[test]
  fn conv_valid_stride() {
    let x = image(4, 4);
    let k = Tensor::ones(&[2, 2, 1, 2]);
    let y = conv2d(&x, &k, [2, 2], Padding::Valid).unwrap();
    assert_eq!(y.dims(), &[1, 2, 2, 2]);
    assert_eq!(y.raw()[0], 1.0 + 2.0 + 5.0 + 6.0);
    assert_eq!(y.raw()[1], 1.0 + 2.0 + 5.0 + 6.0);
  }

  #[test]
  fn conv_full_padding() {
    let k = Tensor::ones(&[1, 1, 1, 1]);
    assert!(matches!(conv2d(&image(2, 2), &k, [1, 1], Padding::Full), Err(EngineError::Unsupported(_))));
  }

  #[test]
  fn depthwise() {
    let x = Tensor::new(&[1, 1, 1, 2], vec![3.0, 5.0]);
    let k = Tensor::new(&[1, 1, 2, 2], vec![1.0, 2.0, 10.0, 20.0]);
    let y = depthwise_conv2d(&x, &k, [1, 1], Padding::Valid).unwrap();
    assert_eq!(y.dims(), &[1, 1, 1, 4]);
    assert_eq!(y.raw(), &[3.0, 6.0, 50.0, 100.0]);
  }

  #[test]
  fn pooling() {
    let x = image(4, 4);
    let y = max_pool(&x, [2, 2], [2, 2], Padding::Valid).unwrap();
    assert_eq!(y.raw(), &[6.0, 8.0, 14.0, 16.0]);
    let y = avg_pool(&x, [2, 2], [2, 2], Padding::Valid).unwrap();
    assert_eq!(y.raw(), &[3.5, 5.5, 11.5, 13.5]);
  }

  #[test]
  fn matmul_batched() {
    let a = Tensor::new(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let b = Tensor::new(&[3, 1], vec![1.0, 0.0, 1.0]);
    let c = matmul(&a, &b).unwrap();
    assert_eq!(c.dims(), &[2, 1]);
    assert_eq!(c.raw(), &[4.0, 10.0]);
    assert!(matmul(&a, &a).is_err());
  }

  #[test]
  fn bias() {
    let x = Tensor::zeros(&[2, 2]);
    let y = bias_add(&x, &Tensor::vec(&[1.0, 2.0])).unwrap();
    assert_eq!(y.raw(), &[1.0, 2.0, 1.0, 2.0]);
    assert!(bias_add(&x, &Tensor::vec(&[1.0])).is_err());
  }

  #[test]
  fn slicing() {
    let x = Tensor::arrange(&[2, 4, 3], 1.0, 1.0);
    let y = slice(&x, &[0, 1, 0], &[-1, 1, -1]).unwrap();
    assert_eq!(y.dims(), &[2, 1, 3]);
    assert_eq!(y.raw(), &[4.0, 5.0, 6.0, 16.0, 17.0, 18.0]);
    assert!(slice(&x, &[0, 3, 0], &[-1, 2, -1]).is_err());
  }

  #[test]
  fn reshaping() {
    let x = Tensor::zeros(&[2, 3, 4]);
    assert_eq!(reshape(&x, &Shape::new(&[-1, 12])).unwrap().dims(), &[2, 12]);
    assert!(reshape(&x, &Shape::new(&[-1, 5])).is_err());
  }

  #[test]
  fn activations() {
    let x = Tensor::vec(&[-3.0, -1.0, 0.0, 2.0]);
    assert_eq!(relu(&x, None, 0.0).raw(), &[0.0, 0.0, 0.0, 2.0]);
    assert_eq!(relu(&x, Some(1.0), 0.0).raw(), &[0.0, 0.0, 0.0, 1.0]);
    assert_eq!(relu(&x, None, 1.5).raw(), &[0.0, 0.0, 0.0, 2.0]);
    assert_eq!(sigmoid(&Tensor::scalar(0.0)).item(), Some(0.5));
    let s = softmax(&Tensor::new(&[2, 2], vec![1.0, 1.0, 0.0, 0.0]));
    assert_eq!(s.raw(), &[0.5, 0.5, 0.5, 0.5]);
  }

  #[test]
  fn losses() {
    let p = Tensor::vec(&[1.0, 3.0]);
    let t = Tensor::vec(&[1.0, 1.0]);
    assert_eq!(mean_squared_error(&p, &t).unwrap().item(), Some(2.0));
    let logits = Tensor::new(&[1, 2], vec![0.0, 0.0]);
    let labels = Tensor::new(&[1, 2], vec![1.0, 0.0]);
    let ce = softmax_cross_entropy(&logits, &labels).unwrap().item().unwrap();
    assert!((ce - std::f32::consts::LN_2).abs() < 1e-6);
  }
}
