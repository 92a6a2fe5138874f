//! URL handling module for Tidemark
//!
//! This module provides URL normalization and host extraction. Every URL the
//! crawler fetches, stores or links to passes through [`normalize`] first, so
//! the normalized string doubles as the primary key of URL records.

mod domain;
mod normalize;

pub use domain::extract_host;
pub use normalize::{canonicalize, normalize};
