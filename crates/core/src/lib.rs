pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod outcome;
pub mod task;

pub use batch::*;
pub use error::*;
pub use outcome::*;
pub use task::*;
