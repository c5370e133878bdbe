#[macro_use]
extern crate anyhow;

pub mod time;
