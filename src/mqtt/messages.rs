use super::error::SessionError;
use rumqttc::QoS;
use tracing::warn;

/// QoS used when the caller does not pick one.
pub const DEFAULT_QOS: QoS = QoS::AtLeastOnce;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
        }
    }
}

/// A message delivered on a subscribed topic, payload decoded as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

impl InboundMessage {
    pub fn from_publish(publish: &rumqttc::Publish) -> Self {
        let payload = match std::str::from_utf8(&publish.payload) {
            Ok(text) => text.to_string(),
            Err(e) => {
                warn!(
                    "Payload on topic '{}' is not valid UTF-8 ({}), replacing invalid bytes",
                    publish.topic, e
                );
                String::from_utf8_lossy(&publish.payload).into_owned()
            }
        };

        Self {
            topic: publish.topic.clone(),
            payload,
        }
    }
}

pub fn parse_qos(qos: u8) -> Result<QoS, SessionError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        _ => Err(SessionError::InvalidQos(qos)),
    }
}
