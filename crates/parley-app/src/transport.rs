//! Broker transport abstraction.

use std::future::Future;

use parley_core::SubscriptionId;

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established or re-established.
    Connected,
    /// Connection lost. All subscriptions are gone.
    Disconnected,
    /// Frame delivered on a subscription.
    Frame {
        /// Subscription the frame arrived on.
        subscription: SubscriptionId,
        /// Raw payload.
        payload: Vec<u8>,
    },
}

/// Publish/subscribe connection to the message broker.
///
/// Subscription handles are assigned by the engine; the transport tags every
/// inbound frame with the handle it was subscribed under.
///
/// # Implementations
///
/// - **Production**: a STOMP-over-WebSocket client
/// - **Simulation**: an in-memory broker
pub trait Transport: Send {
    /// Transport-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Publish `payload` to `destination`.
    fn publish(
        &mut self,
        destination: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Subscribe to `topic` under `subscription`.
    ///
    /// Resolves once the broker acknowledged the subscription.
    fn subscribe(
        &mut self,
        subscription: SubscriptionId,
        topic: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Release `subscription`. Releasing an unknown handle must succeed.
    fn unsubscribe(
        &mut self,
        subscription: SubscriptionId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Wait for the next transport event.
    ///
    /// Returns `None` once the transport is shut down for good. Must be
    /// cancel safe: the runtime races it against ticks and user intents.
    fn next_event(&mut self) -> impl Future<Output = Option<TransportEvent>> + Send;
}
