//! Offline training: corpus construction and classifier fitting

pub mod corpus;
pub mod trainer;
