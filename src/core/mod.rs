// src/core/mod.rs

pub mod pace;
pub mod sanitize;

pub use pace::{CancelToken, Pacer};
