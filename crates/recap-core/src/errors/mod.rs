//! Error vocabulary shared across Recap crates.
//!
//! Summarizer failures arrive as free text (provider error strings or the
//! model's own reply). [`parse::classify_failure`] is the single place where
//! that text is matched against known patterns, so the matching rules can
//! change without touching retry control flow.

pub mod parse;

pub use parse::{FailureCategory, FailureClass, classify_failure, classify_response};
