pub mod changes;
pub mod client;
pub mod command;
mod error;
pub mod finalizer;
pub mod job;
pub mod merge;
pub mod ownership;
pub mod schedule;

pub use self::error::{Error, Result};
