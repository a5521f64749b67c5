//! # mqttconn
//!
//! `mqttconn` exposes an MQTT publish/subscribe session as a packet-oriented
//! connection: topics are addresses, reads return the next message from any
//! subscribed topic, writes publish, and both directions honour deadlines.
//!
//! ## Core Modules
//!
//! - `addr`: topic addresses (`TopicAddr`) and the `NetAddr` contract.
//! - `client`: the messaging-client capability the connection drives, plus
//!   the rumqttc-backed `MqttSession`.
//! - `conn`: the `PacketConn` contract and the `MqttConn` adapter, including
//!   `dial` for `mqtt://` / `mqtts://` URIs.
//! - `config`: layered settings loaded from file and environment.
//! - `utils`: the crate error type and logging setup.
//!
//! ```no_run
//! use mqttconn::{MqttConn, PacketConn};
//!
//! # async fn run() -> mqttconn::Result<()> {
//! let conn = MqttConn::dial("mqtt://broker.example.com/sensors/temp").await?;
//! conn.write(b"21.5").await?;
//!
//! let mut buf = [0u8; 64];
//! let (n, from) = conn.read_from(&mut buf).await?;
//! println!("{from}: {:?}", &buf[..n]);
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod addr;
pub mod client;
pub mod config;
pub mod conn;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use addr::{NetAddr, TOPIC_NETWORK, TopicAddr};
pub use client::{InboundMessage, MessageHandler, MessagingClient, MqttSession, PublishToken, QoS};
pub use conn::{BrokerUri, MqttConn, PacketConn};
pub use utils::{Error, Result};
