//! Classification of input files with trained models

pub mod report;
pub mod runner;
