//! # Configuration persistence.
//!
//! - [`ConfigDocument`] / [`AppSettings`]: the serialized document
//! - [`ConfigStore`]: async load/save seam
//! - [`JsonFileStore`]: cached JSON file implementation with atomic writes

mod document;
mod json;

pub use document::{AppSettings, ConfigDocument, DOCUMENT_VERSION};
pub use json::{ConfigStore, JsonFileStore};
