//! Content Pipeline: job dispatch core for staged content classification.

pub mod api;
pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod worker;

#[cfg(test)]
mod testing;
