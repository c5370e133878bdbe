#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate lazy_static;

pub mod command;
pub mod cursor;
pub mod diag;
pub mod dispatch;
pub mod gemini;
pub mod logging;
pub mod migrator;
pub mod options;
pub mod point;
pub mod scanner;
pub mod shard;
pub mod stats;
