pub mod checkpoint;
pub mod classes;
pub mod data;
pub mod decode;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod module;
pub mod schedule;
pub mod training;

pub use error::{Error, Result};
