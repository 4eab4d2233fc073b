//! Generic runtime for engine orchestration.
//!
//! The Runtime drives the session event loop, coordinating between:
//! - [`SyncEngine`]: sans-IO synchronization state machine
//! - [`Transport`]: broker connection
//! - [`ConversationSource`]: conversation history lookup
//!
//! Every action the engine returns is executed here, and its outcome
//! (acknowledged, failed, loaded) goes back into the engine as an event until
//! the engine has nothing left to do.

use std::collections::VecDeque;

use parley_core::{Environment, Notification, SyncAction, SyncConfig, SyncEngine, SyncError, SyncEvent};
use tokio::sync::mpsc;

use crate::{ConversationSource, RuntimeConfig, RuntimeError, Transport, TransportEvent};

/// Generic runtime that orchestrates engine, transport and source.
///
/// # Type Parameters
///
/// - `T`: broker transport
/// - `S`: conversation source
/// - `E`: environment for time and randomness
pub struct Runtime<T, S, E>
where
    T: Transport,
    S: ConversationSource,
    E: Environment,
{
    engine: SyncEngine<E>,
    transport: T,
    source: S,
    config: RuntimeConfig,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl<T, S, E> Runtime<T, S, E>
where
    T: Transport,
    S: ConversationSource,
    E: Environment,
{
    /// Create a runtime and the receiver its notifications are delivered to.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::InvalidConfig` if `runtime_config` is unusable
    /// - `RuntimeError::Sync` if the engine rejects `sync_config`
    pub fn new(
        transport: T,
        source: S,
        env: E,
        sync_config: SyncConfig,
        runtime_config: RuntimeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>), RuntimeError> {
        runtime_config.validate()?;
        let engine = SyncEngine::new(env, sync_config)?;
        let (notifications, receiver) = mpsc::unbounded_channel();

        Ok((Self { engine, transport, source, config: runtime_config, notifications }, receiver))
    }

    /// Run the main event loop.
    ///
    /// Races three sources until either the intent channel closes or the
    /// transport shuts down:
    /// 1. Transport events (frames, connect, disconnect)
    /// 2. User intents from `intents`
    /// 3. Ticks every `tick_interval`, however busy the other two are
    ///
    /// Rejected intents are reported as [`Notification::Error`]. On exit the
    /// session is torn down, releasing every subscription.
    pub async fn run(mut self, mut intents: mpsc::Receiver<SyncEvent<E::Instant>>) {
        let env = self.engine.env().clone();
        let tick_interval = self.config.tick_interval;
        // Lives across iterations so busy transport or intent traffic cannot
        // keep restarting it.
        let tick = env.sleep(tick_interval);
        tokio::pin!(tick);

        loop {
            tokio::select! {
                event = self.transport.next_event() => {
                    let Some(event) = event else {
                        tracing::info!("transport closed");
                        break;
                    };
                    self.dispatch_reported(transport_event(event)).await;
                },
                intent = intents.recv() => {
                    let Some(intent) = intent else {
                        tracing::info!("intent channel closed");
                        break;
                    };
                    self.dispatch_reported(intent).await;
                },
                () = &mut tick => {
                    let now = env.now();
                    self.dispatch_reported(SyncEvent::Tick { now }).await;
                    tick.set(env.sleep(tick_interval));
                },
            }
        }

        self.dispatch_reported(SyncEvent::Teardown).await;
    }

    /// Feed `event` to the engine and execute the resulting actions, along
    /// with every follow-up event they produce.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if `event` itself is rejected (a
    /// precondition failure). Follow-up events never fail.
    pub async fn dispatch(&mut self, event: SyncEvent<E::Instant>) -> Result<(), SyncError> {
        let actions = self.engine.handle(event)?;
        let mut pending: VecDeque<SyncEvent<E::Instant>> = VecDeque::new();
        self.execute(actions, &mut pending).await;

        while let Some(event) = pending.pop_front() {
            match self.engine.handle(event) {
                Ok(actions) => self.execute(actions, &mut pending).await,
                Err(error) => {
                    tracing::warn!(%error, "engine rejected follow-up event");
                    self.notify(Notification::Error(error));
                },
            }
        }

        Ok(())
    }

    /// Engine, for inspection.
    pub fn engine(&self) -> &SyncEngine<E> {
        &self.engine
    }

    /// Transport, for inspection.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn dispatch_reported(&mut self, event: SyncEvent<E::Instant>) {
        if let Err(error) = self.dispatch(event).await {
            tracing::debug!(%error, "intent rejected");
            self.notify(Notification::Error(error));
        }
    }

    async fn execute(
        &mut self,
        actions: Vec<SyncAction>,
        pending: &mut VecDeque<SyncEvent<E::Instant>>,
    ) {
        for action in actions {
            match action {
                SyncAction::Publish(frame) => {
                    let purpose = frame.purpose.clone();
                    if let Err(error) = self.transport.publish(&frame.destination, frame.payload).await
                    {
                        pending.push_back(SyncEvent::PublishFailed {
                            purpose,
                            reason: error.to_string(),
                        });
                    }
                },
                SyncAction::Subscribe { subscription, topic } => {
                    match self.transport.subscribe(subscription, &topic).await {
                        Ok(()) => pending.push_back(SyncEvent::Subscribed { subscription }),
                        Err(error) => pending.push_back(SyncEvent::SubscribeFailed {
                            subscription,
                            reason: error.to_string(),
                        }),
                    }
                },
                SyncAction::Unsubscribe { subscription } => {
                    if let Err(error) = self.transport.unsubscribe(subscription).await {
                        pending.push_back(SyncEvent::UnsubscribeFailed {
                            subscription,
                            reason: error.to_string(),
                        });
                    }
                },
                SyncAction::LoadConversation { conversation_id, generation } => {
                    let event = match self.source.load(&conversation_id).await {
                        Ok(loaded) => SyncEvent::ConversationLoaded {
                            conversation_id,
                            generation,
                            room: loaded.room,
                            messages: loaded.messages,
                        },
                        Err(error) => SyncEvent::ConversationLoadFailed {
                            conversation_id,
                            generation,
                            reason: error.to_string(),
                        },
                    };
                    pending.push_back(event);
                },
                SyncAction::Notify(notification) => self.notify(notification),
            }
        }
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

fn transport_event<I>(event: TransportEvent) -> SyncEvent<I> {
    match event {
        TransportEvent::Connected => SyncEvent::Connected,
        TransportEvent::Disconnected => SyncEvent::Disconnected,
        TransportEvent::Frame { subscription, payload } => {
            SyncEvent::FrameReceived { subscription, payload }
        },
    }
}
