//! Function identifiers and in-process function modules.

pub mod handler;
pub mod identifier;

pub use handler::{EdgeFunction, FunctionContext, FunctionError};
pub use identifier::{FunctionIdentifier, InvalidIdentifier};
