//! The `conn` module puts a messaging client behind an addressed-datagram
//! connection.
//!
//! `PacketConn` is the contract generic transport code programs against:
//! addressed reads and writes, read/write deadlines and close. `MqttConn`
//! implements it on top of any `MessagingClient`, with topics as addresses.

mod adapter;
mod dial;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::addr::NetAddr;
use crate::utils::Result;

pub use adapter::{DEFAULT_DISCONNECT_GRACE, INBOUND_QUEUE_CAPACITY, MqttConn};
pub use dial::BrokerUri;

/// A packet-oriented connection with per-direction deadlines.
///
/// A deadline is an absolute instant; `None` means operations wait as long
/// as they need to. Deadline misses return a timeout error
/// (`Error::is_timeout`) and leave the connection usable.
#[async_trait]
pub trait PacketConn: Send + Sync {
    type Addr: NetAddr;

    /// Reads one datagram into `buf`, returning the byte count.
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let (n, _) = self.read_from(buf).await?;
        Ok(n)
    }

    /// Writes one datagram to the connection's default peer.
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Reads one datagram into `buf`, returning the byte count and the
    /// sender's address. Datagrams longer than `buf` are truncated.
    async fn read_from(&self, buf: &mut [u8]) -> Result<(usize, Self::Addr)>;

    /// Writes one datagram to `addr`.
    async fn write_to(&self, buf: &[u8], addr: &dyn NetAddr) -> Result<usize>;

    fn set_deadline(&self, deadline: Option<Instant>) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }

    fn set_read_deadline(&self, deadline: Option<Instant>);

    fn set_write_deadline(&self, deadline: Option<Instant>);

    fn local_addr(&self) -> Self::Addr;

    fn remote_addr(&self) -> Self::Addr;

    /// Closes the connection. Closing an already closed connection is a no-op.
    async fn close(&self) -> Result<()>;
}
