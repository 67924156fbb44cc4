//! Small utilities shared by every crate in the workspace: the coordinate
//! math for the infinite board, the process logger, and the layered TOML
//! config loader.

#[macro_use]
extern crate log;

pub mod config;
pub mod logging;
pub mod math;

pub use logging::{init, init_with_level};
