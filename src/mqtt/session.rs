use super::connection::Connection;
use super::error::SessionError;
use async_trait::async_trait;
use rumqttc::QoS;

/// The operations the terminal driver needs from a broker session.
#[async_trait]
pub trait Session: Send + Sync {
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), SessionError>;

    async fn publish(&self, topic: &str, message: &str, qos: QoS) -> Result<(), SessionError>;

    async fn disconnect(&self) -> Result<(), SessionError>;
}

#[async_trait]
impl Session for Connection {
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), SessionError> {
        Connection::subscribe(self, topic, qos).await
    }

    async fn publish(&self, topic: &str, message: &str, qos: QoS) -> Result<(), SessionError> {
        Connection::publish(self, topic, message, qos).await
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        Connection::disconnect(self).await
    }
}
