//! # Confstate Core Kernel
//!
//! Crate-wide plumbing shared by every subsystem.
//!
//! - **Core Constants**: reserved spec names, well-known macros and the storage
//!   document version, in the `constants` submodule.
//! - **Error Handling**: the crate-wide [`Error`](error::Error) aggregating subsystem
//!   errors, and the `Result` alias, in the `error` submodule.
pub mod constants;
pub mod error;

pub use error::{Error, Result};
