//! The uplink seam between delivery logic and the network.

use async_trait::async_trait;
use tokio::sync::watch;

use farmlink_core::ConnectionState;

use crate::error::SyncResult;
use crate::protocol::UplinkEvent;

/// A connection to the service that events can be emitted on.
#[async_trait]
pub trait Uplink: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Sends one event.
    ///
    /// Returns once the frame has been written to the socket. Fails with
    /// `Disconnected` if the link is down or drops before the write.
    async fn emit(&self, event: UplinkEvent) -> SyncResult<()>;

    /// Observes connection-state transitions.
    fn subscribe(&self) -> watch::Receiver<ConnectionState>;
}
