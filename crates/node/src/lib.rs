#![doc = include_str!("../README.md")]
pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod stress;
pub mod util;
