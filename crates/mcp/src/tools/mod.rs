#![forbid(unsafe_code)]

mod batch;
mod definitions;
mod dispatch;
mod snapshot;
mod sync;

pub(crate) use definitions::tool_definitions;
pub(crate) use dispatch::dispatch_tool;
