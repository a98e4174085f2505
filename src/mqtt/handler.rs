//! Connection event callbacks.
//!
//! A handler is handed to [`Connection::connect`](super::Connection::connect)
//! and invoked from the background event-loop task. The host is passed in by
//! the connection that owns the task, so handlers never reach into client
//! internals.

use super::messages::InboundMessage;
use tracing::{info, warn};

/// Status code reported for a successful connect or a requested disconnect.
pub const SUCCESS: u8 = 0;
/// Disconnect status when the broker or the network dropped the session.
pub const UNEXPECTED_DISCONNECT: u8 = 1;
/// Connect status when no CONNACK was received at all.
pub const UNREACHABLE: u8 = 255;

pub trait EventHandler: Send + Sync + 'static {
    /// `code` is [`SUCCESS`], a CONNACK refusal code, or [`UNREACHABLE`].
    fn on_connect(&self, host: &str, code: u8);

    /// `code` is [`SUCCESS`] for a requested disconnect, otherwise
    /// [`UNEXPECTED_DISCONNECT`].
    fn on_disconnect(&self, host: &str, code: u8);

    fn on_message(&self, message: InboundMessage);
}

/// Prints connection status and received messages for the operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleHandler;

impl ConsoleHandler {
    pub fn connect_line(host: &str, code: u8) -> String {
        if code == SUCCESS {
            format!("Successfully connected to host \"{}\"!", host)
        } else {
            format!("Could not connect to host \"{}\"!", host)
        }
    }

    pub fn disconnect_line(host: &str, code: u8) -> String {
        if code == SUCCESS {
            format!("Successful disconnection from host \"{}\"!", host)
        } else {
            format!("Unexpected disconnection from host \"{}\"!", host)
        }
    }

    pub fn message_line(message: &InboundMessage) -> String {
        format!(
            "Received message \"{}\" from topic \"{}\"!",
            message.payload, message.topic
        )
    }
}

impl EventHandler for ConsoleHandler {
    fn on_connect(&self, host: &str, code: u8) {
        if code == SUCCESS {
            info!("Connected to MQTT broker {}", host);
        } else {
            warn!("Connection to {} failed with code {}", host, code);
        }
        println!("{}\n", Self::connect_line(host, code));
    }

    fn on_disconnect(&self, host: &str, code: u8) {
        if code == SUCCESS {
            info!("Disconnected from MQTT broker {}", host);
        } else {
            warn!("Lost connection to MQTT broker {}", host);
        }
        println!("{}", Self::disconnect_line(host, code));
    }

    fn on_message(&self, message: InboundMessage) {
        println!("{}\n", Self::message_line(&message));
    }
}
