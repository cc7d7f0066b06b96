//! fieldlog: an offline-first synchronization engine for field-observation
//! datasets.
//!
//! Observations (spots with photos and audio, sites, routes, external
//! files) are recorded into a project-partitioned local dataset and kept
//! consistent with a remote object store when connectivity allows. The
//! engine owns the master document, detects divergence between the two
//! sides, merges concurrent edits, and drives bulk transfer with progress
//! reporting. UI concerns stay outside; callers subscribe to
//! [`events::EngineEvent`] and call into [`engine::SyncEngine`].

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;

pub use config::EngineConfig;
pub use engine::{MediaCapture, SpotDraft, SyncEngine};
pub use error::{EngineError, Result};
pub use events::EngineEvent;
