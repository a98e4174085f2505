pub mod connection;
pub mod error;
pub mod handler;
pub mod messages;
pub mod session;

pub use connection::{Connection, ConnectionState};
pub use error::SessionError;
pub use handler::{ConsoleHandler, EventHandler};
pub use messages::{parse_qos, InboundMessage, OutboundMessage, DEFAULT_QOS};
pub use session::Session;
