//! Outbound seam towards the remote data source.

use folio_core::ClientMessage;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Where the connector sends its requests.
///
/// Sending cannot fail at this layer; transports that can lose messages
/// log and drop.
pub trait RemoteDataSource {
    fn send(&mut self, message: ClientMessage);
}

/// Collects messages in order. Used by tests and hosts that poll.
impl RemoteDataSource for Vec<ClientMessage> {
    fn send(&mut self, message: ClientMessage) {
        self.push(message);
    }
}

impl RemoteDataSource for UnboundedSender<ClientMessage> {
    fn send(&mut self, message: ClientMessage) {
        if let Err(err) = UnboundedSender::send(self, message) {
            warn!(msg = ?err.0, "remote channel closed, message dropped");
        }
    }
}

impl<R: RemoteDataSource + ?Sized> RemoteDataSource for Box<R> {
    fn send(&mut self, message: ClientMessage) {
        (**self).send(message);
    }
}
