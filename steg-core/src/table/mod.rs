//! Tabular feature storage shared by training and inference

pub mod feature_table;
