//! Linear stacks of layers compiled onto an [Engine].

use std::path::Path;

use crate::{
  config::{ LayerConfig, ModelConfig },
  engine::{ Engine, EngineError, Graph, Op },
  error::{ Error, Result },
  layers::{ Input, Layer, INPUT_PLACEHOLDER },
  optimize::{ Loss, Optimizer },
  registry,
  shape::{ Shape, UNKNOWN },
  tensor::Tensor,
};


/// Graph name of a compiled model's prediction.
pub const OUTPUT: &str = "output";

/// Placeholder for the training targets.
pub const TARGET: &str = "y";

/// Graph name of the scalar loss.
pub const LOSS: &str = "loss";


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
  Created,
  Compiled,
  Disposed,
}


/// A layer together with the shapes it was compiled for.

#[derive(Debug)]
pub struct Slot {
  layer: Box<dyn Layer>,
  input_shape: Option<Shape>,
  output_shape: Option<Shape>,
}

impl Slot {
  fn new(layer: Box<dyn Layer>) -> Self {
    Self { layer, input_shape: None, output_shape: None }
  }

  pub fn layer(&self) -> &dyn Layer {
    self.layer.as_ref()
  }

  pub fn name(&self) -> &str {
    self.layer.name()
  }

  /// The concrete layer, if it is an `L`.

  pub fn downcast<L: Layer + 'static>(&self) -> Option<&L> {
    self.layer.as_any().downcast_ref()
  }

  pub fn input_shape(&self) -> Result<&Shape> {
    self.input_shape.as_ref().ok_or_else(|| not_compiled(self.name()) )
  }

  pub fn output_shape(&self) -> Result<&Shape> {
    self.output_shape.as_ref().ok_or_else(|| not_compiled(self.name()) )
  }

  pub fn params(&self) -> Result<usize> {
    self.output_shape()?;
    self.layer.params()
  }
}

fn not_compiled(layer: &str) -> Error {
  Error::UninitializedModel(format!("layer '{layer}' is part of a model that has not been compiled yet"))
}


/// Layers applied one after another, starting from an [Input].
///
/// ```
/// use microlayers::{ Sequential, Input, Conv2D, MaxPool2D, Flatten, Dense, Padding, Optimizer, Loss };
///
/// let mut model = Sequential::builder(Input::new(&[28, 28, 1])?)
///   .add(Conv2D::new(32, &[5, 5], &[1, 1], Padding::Same)?)
///   .add(MaxPool2D::new(&[2, 2], &[2, 2], Padding::Valid)?)
///   .add(Flatten::new())
///   .add(Dense::new(10)?)
///   .build()?;
///
/// model.compile(Optimizer::adam(), Loss::SoftmaxCrossEntropyWithLogits)?;
/// assert_eq!(model.params_count()?, 832 + 62730);
/// # Ok::<(), microlayers::Error>(())
/// ```

pub struct Sequential<E: Engine = Graph> {
  engine: E,
  input: Input,
  slots: Vec<Slot>,
  state: ModelState,
  optimizer: Option<Optimizer>,
  loss: Option<Loss>,
  params: usize,
}

impl Sequential<Graph> {
  pub fn of(input: Input, layers: Vec<Box<dyn Layer>>) -> Result<Self> {
    Self::of_with_engine(Graph::new(), input, layers)
  }

  pub fn builder(input: Input) -> SequentialBuilder<Graph> {
    Self::builder_with_engine(Graph::new(), input)
  }

  pub fn from_config(config: &ModelConfig) -> Result<Self> {
    Self::from_config_with_engine(Graph::new(), config)
  }
}

impl<E: Engine> Sequential<E> {
  /// Assemble a model, naming every unnamed layer.
  ///
  /// Fails if two layers end up with the same name.

  pub fn of_with_engine(engine: E, mut input: Input, mut layers: Vec<Box<dyn Layer>>) -> Result<Self> {
    if let Some(layer) = layers.iter().find(|layer| layer.as_any().is::<Input>() ) {
      return Err(Error::config(format!("input layer {} may only appear first", layer.name())))
    }

    let mut all: Vec<&mut dyn Layer> = Vec::with_capacity(layers.len() + 1);
    all.push(&mut input);
    for layer in layers.iter_mut() {
      all.push(layer.as_mut());
    }
    registry::resolve(&mut all)?;

    Ok(Self {
      engine,
      input,
      slots: layers.into_iter().map(Slot::new).collect(),
      state: ModelState::Created,
      optimizer: None,
      loss: None,
      params: 0,
    })
  }

  pub fn builder_with_engine(engine: E, input: Input) -> SequentialBuilder<E> {
    SequentialBuilder { engine, input, layers: vec![] }
  }

  pub fn from_config_with_engine(engine: E, config: &ModelConfig) -> Result<Self> {
    let input = config.input.build_input()?;
    let layers = config.layers.iter()
      .map(|layer| match layer {
        LayerConfig::Input { name, .. } => Err(Error::config(format!("input layer {name} may only appear first"))),
        layer => layer.build(),
      })
      .collect::<Result<Vec<_>>>()?;
    Self::of_with_engine(engine, input, layers)
  }

  /// Define every layer's variables, derive all shapes and build the
  /// forward and loss graphs.
  ///
  /// A model can only be compiled once. Failures after the first variable
  /// was created leave the engine partially populated, so such a model
  /// should be dropped.

  pub fn compile(&mut self, optimizer: Optimizer, loss: Loss) -> Result<()> {
    match self.state {
      ModelState::Created => {},
      ModelState::Compiled => return Err(Error::DoubleCompile),
      ModelState::Disposed => return Err(Error::Disposed),
    }
    if self.engine.is_closed() { return Err(Error::Disposed) }

    let mut shape = self.input.shape();
    self.input.define_variables(&mut self.engine, &shape)?;

    let mut params = 0;
    for slot in &mut self.slots {
      slot.layer.define_variables(&mut self.engine, &shape)?;
      let output_shape = slot.layer.compute_output_shape(&shape)?;
      let layer_params = slot.layer.params()?;
      log::debug!("{}({}): {shape} -> {output_shape}, {layer_params} params",
        slot.layer.name(), slot.layer.kind());
      params += layer_params;
      slot.input_shape = Some(shape);
      slot.output_shape = Some(output_shape.clone());
      shape = output_shape;
    }

    let mut output = self.input.placeholder()?;
    for slot in &self.slots {
      output = slot.layer.transform_input(&mut self.engine, output)?;
    }
    let output = self.engine.build_op(Op::Identity, &[output], Some(OUTPUT))?;

    let target_shape: Vec<i64> = std::iter::once(UNKNOWN)
      .chain(shape.features().iter().copied())
      .collect();
    let target = self.engine.build_op(Op::Placeholder { shape: target_shape.into() }, &[], Some(TARGET))?;
    loss.build(&mut self.engine, output, target, LOSS)?;

    self.optimizer = Some(optimizer);
    self.loss = Some(loss);
    self.params = params;
    self.state = ModelState::Compiled;
    log::info!("compiled sequential model with {} layers and {params} trainable params", self.slots.len());
    Ok(())
  }

  fn check_compiled(&self) -> Result<()> {
    match self.state {
      ModelState::Compiled => Ok(()),
      ModelState::Created => Err(Error::UninitializedModel("model has not been compiled yet".into())),
      ModelState::Disposed => Err(Error::Disposed),
    }
  }

  /// Total number of trainable scalars.

  pub fn params_count(&self) -> Result<usize> {
    self.check_compiled()?;
    Ok(self.params)
  }

  /// One line per layer: name and kind, output shape, parameter count.

  pub fn summary(&self) -> Result<Vec<String>> {
    self.check_compiled()?;
    self.slots.iter()
      .map(|slot| Ok(format!("{:<29}{:<26}{}",
        format!("{}({})", slot.name(), slot.layer.kind()),
        slot.output_shape()?.to_string(),
        slot.params()?,
      )))
      .collect()
  }

  pub fn log_summary(&self) -> Result<()> {
    let rows = self.summary()?;
    log::info!("{:<29}{:<26}{}", "Layer (type)", "Output Shape", "Param #");
    log::info!("{}", "=".repeat(65));
    for row in rows {
      log::info!("{row}");
    }
    log::info!("{}", "=".repeat(65));
    log::info!("Total params: {}", self.params);
    Ok(())
  }

  /// Run the forward graph on a batch of inputs.

  pub fn predict(&mut self, x: &Tensor) -> Result<Tensor> {
    self.check_compiled()?;
    let mut outputs = self.engine.run_fetch(&[(INPUT_PLACEHOLDER, x)], &[OUTPUT])?;
    Ok(outputs.pop().ok_or_else(|| EngineError::UnknownName(OUTPUT.to_string()) )?)
  }

  /// Loss of the predictions for `x` against the targets `y`.

  pub fn evaluate(&mut self, x: &Tensor, y: &Tensor) -> Result<f32> {
    self.check_compiled()?;
    let outputs = self.engine.run_fetch(&[(INPUT_PLACEHOLDER, x), (TARGET, y)], &[LOSS])?;
    outputs.first()
      .and_then(|loss| loss.item() )
      .ok_or_else(|| Error::Engine(EngineError::ShapeMismatch("loss did not reduce to a scalar".into())) )
  }

  /// Current variable values of every layer that has any.

  pub fn weights(&mut self) -> Result<Vec<(String, Vec<Tensor>)>> {
    self.check_compiled()?;
    let mut weights = vec![];
    for slot in &self.slots {
      let values = slot.layer.weights(&mut self.engine)?;
      if !values.is_empty() {
        weights.push((slot.name().to_string(), values));
      }
    }
    Ok(weights)
  }

  pub fn layers(&self) -> &[Slot] {
    &self.slots
  }

  pub fn layer(&self, name: &str) -> Option<&Slot> {
    self.slots.iter().find(|slot| slot.name() == name )
  }

  pub fn input(&self) -> &Input {
    &self.input
  }

  pub fn state(&self) -> ModelState {
    self.state
  }

  pub fn is_compiled(&self) -> bool {
    self.state == ModelState::Compiled
  }

  pub fn optimizer(&self) -> Option<Optimizer> {
    self.optimizer
  }

  pub fn loss(&self) -> Option<Loss> {
    self.loss
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn config(&self) -> ModelConfig {
    ModelConfig {
      input: self.input.config(),
      layers: self.slots.iter().map(|slot| slot.layer.config() ).collect(),
    }
  }

  pub fn save_config(&self, filename: impl AsRef<Path>) -> Result<()> {
    self.config().save(filename)
  }

  /// Close the engine session.

  pub fn dispose(mut self) -> Result<()> {
    self.state = ModelState::Disposed;
    if self.engine.is_closed() { return Ok(()) }
    self.engine.close()?;
    Ok(())
  }
}

impl<E: Engine> std::fmt::Debug for Sequential<E> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    f.debug_struct("Sequential")
      .field("input", &self.input)
      .field("layers", &self.slots)
      .field("state", &self.state)
      .finish()
  }
}

impl<E: Engine> Drop for Sequential<E> {
  fn drop(&mut self) {
    if self.state == ModelState::Disposed || self.engine.is_closed() { return }
    self.state = ModelState::Disposed;
    if let Err(err) = self.engine.close() {
      log::warn!("could not close engine session: {err}");
    }
  }
}


/// Fluent construction of a [Sequential] model.

pub struct SequentialBuilder<E: Engine = Graph> {
  engine: E,
  input: Input,
  layers: Vec<Box<dyn Layer>>,
}

impl<E: Engine> SequentialBuilder<E> {
  pub fn add(mut self, layer: impl Layer + 'static) -> Self {
    self.layers.push(Box::new(layer));
    self
  }

  pub fn add_boxed(mut self, layer: Box<dyn Layer>) -> Self {
    self.layers.push(layer);
    self
  }

  pub fn build(self) -> Result<Sequential<E>> {
    Sequential::of_with_engine(self.engine, self.input, self.layers)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    activations::Activation,
    contract::Padding,
    initializers::Initializer,
    layers::*,
  };

  fn lenet() -> Sequential {
    Sequential::builder(Input::new(&[28, 28, 1]).unwrap())
      .add(Conv2D::new(32, &[5, 5], &[1, 1, 1, 1], Padding::Same).unwrap())
      .add(MaxPool2D::new(&[1, 2, 2, 1], &[1, 2, 2, 1], Padding::Valid).unwrap())
      .add(Flatten::new())
      .add(Dense::new(10).unwrap().activation(Activation::Linear))
      .build()
      .unwrap()
  }

  #[test]
  fn names_are_assigned() {
    let model = lenet();
    let names: Vec<_> = model.layers().iter().map(|slot| slot.name() ).collect();
    assert_eq!(names, vec!["conv2d_1", "maxpool2d_2", "flatten_3", "dense_4"]);
    assert_eq!(model.input().name(), "input");
    assert!(model.layer("flatten_3").unwrap().downcast::<Flatten>().is_some());
  }

  #[test]
  fn queries_before_compile() {
    let model = lenet();
    assert!(matches!(model.params_count(), Err(Error::UninitializedModel(_))));
    assert!(matches!(model.summary(), Err(Error::UninitializedModel(_))));
    assert!(matches!(model.layers()[0].params(), Err(Error::UninitializedModel(_))));
    assert!(matches!(model.layers()[1].params(), Err(Error::UninitializedModel(_))));
    assert!(matches!(model.layers()[2].params(), Err(Error::UninitializedModel(_))));
    assert!(matches!(model.layers()[0].output_shape(), Err(Error::UninitializedModel(_))));
    assert_eq!(model.state(), ModelState::Created);
  }

  #[test]
  fn compile_and_shapes() {
    let mut model = lenet();
    model.compile(Optimizer::adam(), Loss::SoftmaxCrossEntropyWithLogits).unwrap();
    let shapes: Vec<_> = model.layers().iter().map(|slot| slot.output_shape().unwrap().clone() ).collect();
    assert_eq!(shapes, vec![
      Shape::new(&[-1, 28, 28, 32]),
      Shape::new(&[-1, 14, 14, 32]),
      Shape::new(&[6272]),
      Shape::new(&[10]),
    ]);
    let params: Vec<_> = model.layers().iter().map(|slot| slot.params().unwrap() ).collect();
    assert_eq!(params, vec![832, 0, 0, 62730]);
    assert_eq!(model.params_count().unwrap(), 63562);
    assert_eq!(model.layers()[1].input_shape().unwrap(), &Shape::new(&[-1, 28, 28, 32]));
  }

  #[test]
  fn compiles_once() {
    let mut model = lenet();
    model.compile(Optimizer::adam(), Loss::MeanSquaredError).unwrap();
    assert!(matches!(model.compile(Optimizer::adam(), Loss::MeanSquaredError), Err(Error::DoubleCompile)));
    assert_eq!(model.optimizer(), Some(Optimizer::adam()));
  }

  #[test]
  fn predict_and_evaluate() {
    let mut model = Sequential::builder(Input::new(&[2]).unwrap())
      .add(Dense::new(1).unwrap()
        .activation(Activation::Linear)
        .kernel_initializer(Initializer::Ones)
        .bias_initializer(Initializer::Constant(1.0)))
      .build()
      .unwrap();
    model.compile(Optimizer::sgd(0.1), Loss::MeanSquaredError).unwrap();

    let x = Tensor::new(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    let prediction = model.predict(&x).unwrap();
    assert_eq!(prediction.dims(), &[2, 1]);
    assert_eq!(prediction.raw(), &[4.0, 8.0]);

    let y = Tensor::new(&[2, 1], vec![4.0, 6.0]);
    assert_eq!(model.evaluate(&x, &y).unwrap(), 2.0);

    let weights = model.weights().unwrap();
    assert_eq!(weights[0].0, "dense_1");
    assert_eq!(weights[0].1[0], Tensor::ones(&[2, 1]));
  }

  #[test]
  fn misplaced_input() {
    let layers: Vec<Box<dyn Layer>> = vec![Box::new(Input::new(&[3]).unwrap())];
    assert!(Sequential::of(Input::new(&[3]).unwrap(), layers).is_err());
  }

  #[test]
  fn dispose_closes_session() {
    let mut model = lenet();
    model.compile(Optimizer::adam(), Loss::MeanSquaredError).unwrap();
    model.dispose().unwrap();
  }

  #[test]
  fn closed_engine() {
    let mut graph = Graph::new();
    graph.close().unwrap();
    let mut model = Sequential::builder_with_engine(graph, Input::new(&[3]).unwrap()).build().unwrap();
    assert!(matches!(model.compile(Optimizer::adam(), Loss::MeanSquaredError), Err(Error::Disposed)));
    assert!(model.engine().is_closed());
  }
}
