//! API request/response models.

pub mod errors;

pub use errors::ErrorBody;
