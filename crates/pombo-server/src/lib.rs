//! Pombo gateway server.
//!
//! Wires the core (connection registry, router, delivery pipeline,
//! heartbeat, cluster membership) to its three surfaces: the WebSocket
//! endpoint clients connect to, the admin HTTP API, and the internal
//! cluster RPC routes peers call.

pub mod api;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod startup;
pub mod ws;
