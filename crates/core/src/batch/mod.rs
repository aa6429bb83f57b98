#![forbid(unsafe_code)]

mod types;
mod validate;

pub use types::*;
pub use validate::*;
