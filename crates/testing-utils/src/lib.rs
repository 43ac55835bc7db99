//! # Codebot Testing Utils
//!
//! Shared testing utilities for the dispatcher workspace: task builders,
//! deterministic executors and small async helpers.
//!
//! ```toml
//! [dev-dependencies]
//! codebot-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
