pub mod error;
pub(crate) mod persist;
pub mod types;
pub mod utils;
