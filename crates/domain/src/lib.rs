pub mod builders;
pub mod error;
pub mod memory;
pub mod model;
pub mod normalize;
pub mod persistence;
pub mod phase;
pub mod ports;
pub mod reconstruct;
pub mod rows;
pub mod service;
pub mod summary;
pub mod transaction;

pub type DomainResult<T> = Result<T, error::DomainError>;
