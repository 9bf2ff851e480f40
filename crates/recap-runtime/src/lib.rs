//! # recap-runtime
//!
//! Scene tracking and summarization over a host-owned, externally mutable
//! message sequence.
//!
//! - [`identity`]: stable ids and id-to-position resolution
//! - [`store`]: scenes, creation rules, membership queries
//! - [`reconcile`]: repair after external deletion and duplication
//! - [`lifecycle`]: status transitions, undo, folding, edit tracking
//! - [`queue`] and [`worker`]: single-flight cancellable summarization
//! - [`manager`]: the façade hosts talk to
//!
//! All chat state sits behind one [`parking_lot::Mutex`] ([`SharedChat`]);
//! it is never held across an `.await`.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod identity;
pub mod lifecycle;
pub mod manager;
pub mod persistence;
pub mod queue;
pub mod reconcile;
pub mod selection;
pub mod state;
pub mod store;
pub mod summarizer;
pub mod view;
pub mod worker;

pub use errors::{RuntimeError, SceneError};
pub use events::{EventEmitter, ItemOutcome, QueueEvent, QueueProgress};
pub use identity::{IdIndex, build_index, ensure_id, resolve};
pub use manager::{LoadReport, SceneManager};
pub use persistence::{NoopPersistence, Persistence};
pub use queue::{CancelOutcome, SummaryQueue};
pub use reconcile::{DeletionReport, reconcile_deletions, reconcile_duplicates};
pub use selection::{SelectionSession, SelectionState};
pub use state::{ChatState, SharedChat};
pub use store::{Scene, ScenePatch, SceneStatus, SceneStore};
pub use summarizer::{DEFAULT_INSTRUCTIONS, Summarizer, SummarizerError, build_prompt};
pub use view::{MessageRole, MessageView, render};
pub use worker::{SceneWorker, SummarizeWorker};
