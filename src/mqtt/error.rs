use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not connected to an MQTT broker")]
    NotConnected,

    #[error("could not connect to host \"{host}\" (code {code})")]
    ConnectFailed { host: String, code: u8 },

    #[error("timed out after {timeout:?} waiting for host \"{host}\" to accept the connection")]
    ConnectTimeout { host: String, timeout: Duration },

    #[error("publish to '{topic}' was not acknowledged within {timeout:?}")]
    PublishTimeout { topic: String, timeout: Duration },

    #[error("connection lost before the broker acknowledged the request")]
    ConnectionLost,

    #[error("invalid QoS level: {0}. Must be 0, 1, or 2")]
    InvalidQos(u8),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}
