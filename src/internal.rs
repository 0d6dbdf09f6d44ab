use rand::Rng;


#[inline]
pub fn negative_index(i: isize, n: usize) -> usize {
  if i < 0 {
    (n as isize + i) as usize
  } else {
    i as usize
  }
}

#[inline]
pub fn ceil_div(a: i64, b: i64) -> i64 {
  (a + b - 1) / b
}


// Polar Box-Muller transformation

pub fn randn(rng: &mut impl Rng) -> (f32, f32) {
  loop {
    let u: f32 = rng.gen_range(-1.0, 1.0);
    let v: f32 = rng.gen_range(-1.0, 1.0);
    let r = u * u + v * v;
    // Try again if outside interval
    if r == 0.0 || r >= 1.0 { continue }
    let c = (-2.0 * r.ln() / r).sqrt();
    return (u * c, v * c)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use rand::{ SeedableRng, rngs::StdRng };

  #[test]
  fn negative() {
    assert_eq!(negative_index(-1, 4), 3);
    assert_eq!(negative_index(-4, 4), 0);
    assert_eq!(negative_index(2, 4), 2);
  }

  #[test]
  fn ceil() {
    assert_eq!(ceil_div(28, 2), 14);
    assert_eq!(ceil_div(27, 2), 14);
    assert_eq!(ceil_div(1, 3), 1);
  }

  #[test]
  fn normal_samples() {
    let mut rng = StdRng::seed_from_u64(7);
    let n = 2000;
    let samples: Vec<f32> = (0..n / 2)
      .flat_map(|_| { let (a, b) = randn(&mut rng); [a, b] })
      .collect();
    let mean = samples.iter().sum::<f32>() / n as f32;
    assert!(mean.abs() < 0.1);
  }
}
