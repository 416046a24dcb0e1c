//! JSON-RPC 2.0 over WebSocket.
//!
//! # Module Structure
//!
//! - `protocol` - envelopes, error codes, notification encoding
//! - `schema` - the published method table and parameter validation
//! - `dispatch` - method handlers
//! - `hub` - subscriptions and per-client notification queues
//! - `server` - listener and acceptor thread
//! - `client` - one connection's read/write loop

mod client;
mod dispatch;
mod hub;
mod protocol;
mod schema;
mod server;


pub use dispatch::{Dispatcher, SiteInfo};
pub use hub::{ClientId, Hub, Mailbox};
pub use server::start_rpc_server;
