pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod models;
#[cfg(test)]
pub mod test_helpers;
