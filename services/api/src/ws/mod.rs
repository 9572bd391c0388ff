//! WebSocket Session Management
//!
//! Each connection runs one dialogue engine. The browser supplies speech
//! recognition and synthesis; the server owns capture, the conversation, and
//! the model calls. Submodules:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `devices`: Adapts the browser's speech capabilities to the engine traits.
//! - `session`: Manages the WebSocket connection lifecycle and its event loop.

mod devices;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
