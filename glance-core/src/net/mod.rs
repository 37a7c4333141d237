//! Viewer-facing networking: the broadcast endpoint and per-viewer
//! connection lifecycle.

pub mod server;
mod viewer;

pub use server::BroadcastServer;
