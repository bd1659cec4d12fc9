//! Core module containing fundamental data structures and utilities

pub mod config;
pub mod error_handler;
pub mod errors;
pub mod models;
pub mod step_logger;
