//! The seam between the dispatcher and a live outbound channel.

/// Outcome of handing one serialized snapshot to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Enqueued for the peer.
    Sent,
    /// A newer snapshot was already enqueued; this one was skipped.
    Stale,
    /// The outbound queue is full; this snapshot was dropped.
    Dropped,
    /// The peer is gone.
    Closed,
}

/// An outbound delivery channel registered under a participant identity.
///
/// Implementations must not block: `deliver` either enqueues or reports why
/// it could not.
pub trait ConnectionHandle: Send + Sync {
    /// Server-assigned id, unique per connection.
    fn connection_id(&self) -> &str;

    /// Enqueue a serialized snapshot captured at registry `version`.
    ///
    /// Snapshots older than the last one enqueued are refused with
    /// [`Delivery::Stale`].
    fn deliver(&self, version: u64, payload: String) -> Delivery;

    /// Snapshots dropped so far because the queue was full.
    fn drop_count(&self) -> u64;

    /// Ask the transport to shut the connection down.
    fn close(&self);
}
