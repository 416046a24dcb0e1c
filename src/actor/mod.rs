//! Actor system for one site
//!
//! ```text
//! FsActor --Changes--> ReconcilerActor --spawn--> BuildRunner
//! (watch)              (model + builds)   <--events--
//!                         ^        |
//!                     RPC requests  +--SiteEvent--> Hub --> clients
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with debouncing
//! - `reconciler` - Serializes edits, external changes and builds
//! - `coordinator` - Wires up and runs actors

pub mod coordinator;
pub mod fs;
pub mod messages;
pub mod reconciler;

pub use coordinator::Coordinator;
