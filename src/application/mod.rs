//! Application services layer.

pub mod error;
pub mod jobs;
pub mod recommendations;
pub mod repos;
