//! # rook-server
//!
//! HTTP and WebSocket front end for rook.
//!
//! Each upgraded connection becomes a participant with an inbound pump that
//! feeds the [`hub`] and an outbound pump that runs every broadcast payload
//! through its own [`pipeline::MovePipeline`]. The hub is a single task that
//! owns membership and fans payloads out to the participants of a session.
//! Computer play and game creation are plain JSON routes in [`handlers`].

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod computer;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod health;
pub mod hub;
pub mod participant;
pub mod pipeline;
pub mod retention;
pub mod server;

pub use config::{ServerConfig, SessionLimits};
pub use error::ServerError;
pub use hub::{Hub, HubHandle};
pub use server::{build_router, start, AppState, ServerHandle};
