//! Leaf command handlers. Every handler has the `Handler` signature and is
//! referenced from the command table in `registry/mod.rs`.

pub mod common;
pub mod control;
pub mod files;
pub mod local;
pub mod query;
pub mod session;
