//! Gateway: HTTP server whose routes are answered by WebSocket peers.
//!
//! Lifecycle:
//! 1. Load config, build the allow-list
//! 2. Bind address, start HTTP server (bridged routes, health, static page)
//! 3. Attach WebSocket upgrade handler at `/ws`
//! 4. Optionally start the `server-time` ticker
//!
//! An HTTP request on a bridged route becomes an event emitted to the
//! connected peers (`bridge.rs`); the peers' acknowledgment becomes the HTTP
//! response (`routes.rs`).

pub mod auth;
pub mod bridge;
pub mod broadcast;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;
