#![forbid(unsafe_code)]

mod ai;
mod args;
mod config;
mod jsonrpc;
mod session_log;

pub(crate) use ai::*;
pub(crate) use args::*;
pub(crate) use config::*;
pub(crate) use jsonrpc::*;
pub(crate) use session_log::*;
