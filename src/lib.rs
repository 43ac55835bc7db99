pub mod common;
pub mod executor;
pub mod intake;
