//! Keras-style layers and sequential models over a pluggable tensor engine.
//! Small. Few dependencies. CPU reference engine included.
//!
//! # Features
//!
//! - **Shape contracts** — Every layer knows the output shape it produces for
//! a given input shape, so whole models get validated while compiling,
//! before any data flows.
//!
//! - **Positional naming** — Unnamed layers get names like `conv2d_1` from
//! their kind and position. Duplicate names are rejected up front.
//!
//! - **Pluggable engines** — Layers only talk to the narrow [Engine] trait.
//! The bundled [Graph] engine evaluates NHWC convolutions, pooling and dense
//! layers on the CPU.
//!
//! - **Serializable architectures** — Models can be saved as a [ModelConfig]
//! and rebuilt elsewhere, without access to the original code.
//!
//! # Examples
//!
//! Building and inspecting a small convolutional network:
//! ```
//! use microlayers::{ Sequential, Input, Conv2D, MaxPool2D, Flatten, Dense, Padding, Optimizer, Loss };
//!
//! fn main() -> microlayers::Result<()> {
//!   let mut model = Sequential::of(Input::new(&[28, 28, 1])?, vec![
//!     Box::new(Conv2D::new(32, &[5, 5], &[1, 1, 1, 1], Padding::Same)?),
//!     Box::new(MaxPool2D::new(&[1, 2, 2, 1], &[1, 2, 2, 1], Padding::Valid)?),
//!     Box::new(Flatten::new()),
//!     Box::new(Dense::new(10)?),
//!   ])?;
//!
//!   model.compile(Optimizer::adam(), Loss::SoftmaxCrossEntropyWithLogits)?;
//!
//!   for row in model.summary()? {
//!     println!("{row}");
//!   }
//!   Ok(())
//! }
//! ```
//!
//! ## More examples
//! Check the `/demos` folder for more example code.
//!
//!
//! # Optional features
//!
//! Some features can be toggled in your `Cargo.toml`.
//!
//! - `unsafe` *(default)* — Accelerated matrix math using the `matrixmultiply` crate.
//! - `rayon` — Windowed kernels of the reference engine run in parallel over the batch axis.

mod internal;
mod shape;
mod tensor;
mod error;

pub mod activations;
pub mod config;
pub mod contract;
pub mod engine;
pub mod initializers;
pub mod layers;
pub mod model;
pub mod optimize;
pub mod registry;

pub use shape::{ Shape, UNKNOWN };
pub use tensor::Tensor;
pub use error::{ Error, Result };
pub use activations::Activation;
pub use config::{ LayerConfig, ModelConfig };
pub use contract::Padding;
pub use engine::{ Engine, EngineError, Graph };
pub use initializers::Initializer;
pub use layers::*;
pub use model::{ ModelState, Sequential, SequentialBuilder, Slot };
pub use optimize::{ Loss, Optimizer };
