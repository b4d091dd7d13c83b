//! Core types shared by every stage of the update pipeline.
//!
//! Currently this is the error taxonomy; see [`error`].

pub mod error;

pub use error::{ErrorContext, UpdateError, user_friendly_error};
