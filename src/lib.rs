pub mod commands;
pub mod counter;
pub mod error;
pub mod gateway;
pub mod http;
pub mod manifest;
pub mod package;
pub mod registry;
pub mod runtime;
pub mod version;
pub mod workspace;

pub use error::{Error, Result};
