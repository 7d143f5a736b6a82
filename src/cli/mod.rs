//! Command-line front ends
//!
//! This module is only available when the "cli" feature is enabled.

mod args;
#[path = "main.rs"]
mod main_impl;
#[cfg(all(feature = "server", feature = "onnx"))]
mod server;

pub use args::SessionArgs;
pub use main_impl::{main, Cli};
#[cfg(all(feature = "server", feature = "onnx"))]
pub use server::{main as server_main, ServerCli};
