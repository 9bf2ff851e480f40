//! # recap-core
//!
//! Foundation types, error classification, and utilities for Recap.
//!
//! This crate provides the shared vocabulary the runtime depends on:
//!
//! - **Branded IDs**: [`ids::StableId`] (per message) and [`ids::SceneId`] as newtypes,
//!   plus the injectable [`ids::IdGenerator`]
//! - **Messages**: [`messages::Message`], the host-owned chat element as seen by Recap
//! - **Errors**: [`errors::parse::classify_failure`] splits summarizer failures into
//!   transient and non-retryable
//! - **Retry**: backoff calculation in [`retry`]
//! - **Text**: UTF-8–safe truncation in [`text`]
//! - **Logging**: [`logging::init_subscriber`]
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `recap-settings` and `recap-runtime`.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod retry;
pub mod text;

pub use ids::{IdGenerator, SceneId, SequentialIds, StableId, UuidV7Generator};
pub use messages::Message;
