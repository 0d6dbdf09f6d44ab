// This example builds the classic two-layer convolutional MNIST network,
// compiles it onto the bundled reference engine and prints its summary.

// The architecture is then saved to a file and rebuilt from there,
// without access to the original code.

use microlayers::*;

fn main() -> Result<()> {
  env_logger::init();

  let filename = "mnist.arch";

  let mut model = Sequential::builder(Input::new(&[28, 28, 1])?)
    .add(Conv2D::new(32, &[5, 5], &[1, 1, 1, 1], Padding::Same)?
      .kernel_initializer(Initializer::he_normal(12)))
    .add(MaxPool2D::new(&[1, 2, 2, 1], &[1, 2, 2, 1], Padding::Valid)?)
    .add(Conv2D::new(64, &[5, 5], &[1, 1, 1, 1], Padding::Same)?
      .kernel_initializer(Initializer::he_normal(12)))
    .add(MaxPool2D::new(&[1, 2, 2, 1], &[1, 2, 2, 1], Padding::Valid)?)
    .add(Flatten::new())
    .add(Dense::new(512)?
      .bias_initializer(Initializer::Constant(0.1)))
    .add(Dense::new(10)?
      .activation(Activation::Linear)
      .bias_initializer(Initializer::Constant(0.1)))
    .build()?;

  model.compile(Optimizer::adam(), Loss::SoftmaxCrossEntropyWithLogits)?;

  for row in model.summary()? {
    println!("{row}");
  }
  println!("Total params: {}", model.params_count()?);

  // Run a batch of blank images through the network
  let logits = model.predict(&Tensor::zeros(&[2, 28, 28, 1]))?;
  println!("Logits of shape {:?}", logits.dims());

  // Save the architecture and rebuild it elsewhere
  model.save_config(filename)?;
  model.dispose()?;

  let mut restored = Sequential::from_config(&ModelConfig::load(filename)?)?;
  restored.compile(Optimizer::adam(), Loss::SoftmaxCrossEntropyWithLogits)?;
  restored.log_summary()?;

  std::fs::remove_file(filename)?;
  Ok(())
}
