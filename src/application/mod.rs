//! Application services and the persistence ports they depend on.

pub mod board;
pub mod error;
pub mod repos;
