//! Parley API Library Crate
//!
//! This library contains the web service around the dialogue engine: the
//! application state, REST handlers, WebSocket sessions, and routing. The
//! `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
