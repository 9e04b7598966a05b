//! Types shared by every Duet crate: the message model, HTTP payloads and the
//! error taxonomy the core returns.

pub mod api;
pub mod error;
pub mod models;

pub use error::{Error, Result};
