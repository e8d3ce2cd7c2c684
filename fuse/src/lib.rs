pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod garbage;
pub mod kubectl;
pub(crate) mod process;
pub mod registry;
pub mod rollout;

pub use error::{Error, Result};
