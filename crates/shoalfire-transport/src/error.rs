/// Errors that can occur while accepting or using a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listener or accepting a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Sending a frame failed; the peer is effectively gone.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a frame failed mid-stream.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}
