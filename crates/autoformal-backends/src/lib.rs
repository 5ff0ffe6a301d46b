//! Autoformal Backends
//!
//! Concrete services behind the engine's traits:
//! - [`LeanCompiler`]: runs a Lean toolchain command and parses its diagnostics
//! - [`ChatGenerationClient`]: OpenAI-compatible chat completions over HTTP

pub mod chat;
pub mod diagnostics;
pub mod error;
pub mod lean_compiler;

pub use chat::ChatGenerationClient;
pub use error::{BackendError, Result};
pub use lean_compiler::LeanCompiler;
