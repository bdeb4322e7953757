//! Public facade crate for `helpme`.
//!
//! This crate intentionally contains no IO or provider-specific logic.
//! It re-exports the envelope, error taxonomy and collaborator traits from `helpme-core`.

pub use helpme_core::*;
