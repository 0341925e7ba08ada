pub mod auth;
pub mod error;
pub mod events;
pub mod project;
pub mod search;
pub mod storage;

pub use error::{ErrorKind, StoreError};
