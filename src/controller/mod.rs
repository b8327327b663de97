//! Distributed controller
//!
//! One process serves the shared state of a distributed deployment over HTTP:
//! - `GET /health` - liveness check
//! - `GET /list-range` - next range from the shared partitioner
//! - `GET /ip-safe/:address` - safety check with the recording side effect
//! - `POST /records`, `GET /commit` - remote record store
//!
//! Workers talk to it through [`ControllerClient`].

mod client;
mod server;

pub use client::ControllerClient;
pub use server::{router, serve, ControllerState, SafetyResponse};
