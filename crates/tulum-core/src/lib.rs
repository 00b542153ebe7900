//! tulum-core: types shared by the tulum engine and its command-line front end
//!
//! - `error`: the error taxonomy every engine operation reports through
//! - `config`: the `tulum.toml` schema and its defaults

pub mod config;
pub mod error;

pub use config::TulumConfig;
pub use error::{TulumError, TulumResult};
