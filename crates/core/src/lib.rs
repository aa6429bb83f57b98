#![forbid(unsafe_code)]

pub mod batch;
pub mod clock;
pub mod envelope;
pub mod model_version;
