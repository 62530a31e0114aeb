// src/lib.rs

//! jobscout Library

pub mod error;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod sources;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;
