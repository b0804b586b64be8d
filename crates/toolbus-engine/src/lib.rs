//! Protocol/connection-lifecycle engine for toolbus.
//!
//! [`ProtocolEngine`] owns one [`Transport`](toolbus_transport::Transport) at a
//! time and runs everything the connection needs:
//!
//! - the connection state machine (connect / health-check / reconnect /
//!   disconnect) with synchronous state-change notification
//! - the inbound message loop (sole consumer of the transport's receive side)
//! - the heartbeat timer, probing only after a window of inbound silence
//! - linear-backoff reconnection bounded by a maximum attempt count
//! - request/response correlation for outbound calls
//!
//! Connection establishment is observed, not synchronously performed:
//! `connect` starts the machinery and then waits (bounded) for the state to
//! reach `Connected`.

mod config;
mod engine;
mod state;

pub use config::EngineConfig;
pub use engine::ProtocolEngine;
pub use state::{ConnectionState, ConnectionStatus};
