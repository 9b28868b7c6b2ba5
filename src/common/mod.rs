//! Common types, traits, configuration and error definitions
//!
//! This module provides the foundational building blocks shared by the
//! spline solver, the controllers, the vehicle models and the trainer.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::{Config, Environment};
