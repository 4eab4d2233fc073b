//! Runtime integration tests against the in-memory broker.

use parley_app::{Runtime, RuntimeConfig, TransportEvent};
use parley_core::{
    BindingState, ChatRoom, ChatRoomType, DeliveryStatus, Notification, ServerId, SyncConfig,
    SyncError, SyncEvent,
};
use parley_harness::{SimBroker, SimEnv, SimInstant};
use parley_proto::{MessagePayload, Outbound, ReadReceiptPayload};
use serde_json::json;
use tokio::sync::mpsc;

type SimRuntime = Runtime<SimBroker, SimBroker, SimEnv>;

fn room() -> ChatRoom {
    ChatRoom {
        id: "c1".into(),
        chat_room_type: ChatRoomType::Private,
        users_in_chat: vec!["ana".into(), "bia".into()],
        name: None,
    }
}

fn runtime(broker: &SimBroker) -> (SimRuntime, mpsc::UnboundedReceiver<Notification>) {
    broker.add_conversation(room(), Vec::new());
    Runtime::new(
        broker.clone(),
        broker.clone(),
        SimEnv::with_seed(3),
        SyncConfig::default(),
        RuntimeConfig::default(),
    )
    .unwrap()
}

async fn open(runtime: &mut SimRuntime) {
    runtime.dispatch(SyncEvent::ProfileLoaded { username: "ana".into() }).await.unwrap();
    runtime.dispatch(SyncEvent::Connected).await.unwrap();
    runtime.dispatch(SyncEvent::SelectConversation { conversation_id: "c1".into() }).await.unwrap();
}

/// Forward every event queued on the broker to the runtime.
async fn pump(broker: &SimBroker, runtime: &mut SimRuntime) {
    while let Some(event) = broker.pop_event() {
        let event: SyncEvent<SimInstant> = match event {
            TransportEvent::Connected => SyncEvent::Connected,
            TransportEvent::Disconnected => SyncEvent::Disconnected,
            TransportEvent::Frame { subscription, payload } => {
                SyncEvent::FrameReceived { subscription, payload }
            },
        };
        runtime.dispatch(event).await.unwrap();
    }
}

fn drain(receiver: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut notifications = Vec::new();
    while let Ok(notification) = receiver.try_recv() {
        notifications.push(notification);
    }
    notifications
}

#[tokio::test]
async fn select_subscribes_loads_and_binds() {
    let broker = SimBroker::new();
    let (mut runtime, mut notifications) = runtime(&broker);

    open(&mut runtime).await;

    assert_eq!(runtime.engine().binding_state(), BindingState::Bound);
    let mut topics = broker.subscribed_topics();
    topics.sort();
    assert_eq!(
        topics,
        vec!["/topic/chat.c1.typing", "/user/queue/message-status", "/user/queue/messages"]
    );
    assert!(drain(&mut notifications).contains(&Notification::BindingChanged {
        conversation_id: Some("c1".into()),
        state: BindingState::Bound,
    }));
}

#[tokio::test]
async fn inbound_message_is_receipted_once() {
    let broker = SimBroker::new();
    let (mut runtime, _notifications) = runtime(&broker);
    open(&mut runtime).await;
    broker.take_published();

    let inbound = MessagePayload {
        server_id: Some(ServerId::new("42")),
        correlation_token: None,
        conversation_id: "c1".into(),
        sender_id: "bia".into(),
        receiver_id: "ana".into(),
        content: "oi".into(),
        sent_at: None,
        status: None,
    };
    let bytes = Outbound::Message(inbound).encode().unwrap();
    assert_eq!(broker.deliver("/user/queue/messages", bytes.clone()), 1);
    assert_eq!(broker.deliver("/user/queue/messages", bytes), 1);
    pump(&broker, &mut runtime).await;

    let published = broker.take_published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].destination, "/app/read.receipt");
    let receipt: ReadReceiptPayload = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(receipt.message_server_id, ServerId::new("42"));

    let ledger = runtime.engine().ledger().unwrap().snapshot();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].delivery_status, DeliveryStatus::Read);
}

#[tokio::test]
async fn failed_publish_reports_send_failed_and_retry_recovers() {
    let broker = SimBroker::new();
    let (mut runtime, mut notifications) = runtime(&broker);
    open(&mut runtime).await;
    drain(&mut notifications);

    broker.fail_publishes(true);
    runtime.dispatch(SyncEvent::SendMessage { text: "oi".into() }).await.unwrap();

    let token = drain(&mut notifications)
        .into_iter()
        .find_map(|notification| match notification {
            Notification::SendFailed { token, .. } => Some(token),
            _ => None,
        })
        .unwrap();
    assert_eq!(runtime.engine().failed_sends().count(), 1);

    broker.fail_publishes(false);
    runtime.dispatch(SyncEvent::RetrySend { token }).await.unwrap();

    assert_eq!(runtime.engine().failed_sends().count(), 0);
    let published = broker.take_published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].destination, "/app/send.message");
}

#[tokio::test]
async fn refused_subscription_is_reported() {
    let broker = SimBroker::new();
    broker.refuse_topic("/user/queue/message-status");
    let (mut runtime, mut notifications) = runtime(&broker);

    open(&mut runtime).await;

    assert_eq!(runtime.engine().binding_state(), BindingState::Binding);
    assert!(drain(&mut notifications).iter().any(|notification| matches!(
        notification,
        Notification::Error(SyncError::SubscribeFailed { topic, .. })
            if topic == "/user/queue/message-status"
    )));
}

#[tokio::test]
async fn unknown_conversation_reports_load_failure() {
    let broker = SimBroker::new();
    let (mut runtime, mut notifications) = runtime(&broker);
    runtime.dispatch(SyncEvent::ProfileLoaded { username: "ana".into() }).await.unwrap();
    runtime.dispatch(SyncEvent::Connected).await.unwrap();

    runtime.dispatch(SyncEvent::SelectConversation { conversation_id: "nope".into() }).await.unwrap();

    assert!(runtime.engine().room().is_none());
    assert!(drain(&mut notifications).iter().any(|notification| matches!(
        notification,
        Notification::Error(SyncError::LoadFailed { conversation_id, .. }) if conversation_id == "nope"
    )));
}

#[tokio::test]
async fn send_before_selecting_is_rejected() {
    let broker = SimBroker::new();
    let (mut runtime, _notifications) = runtime(&broker);
    runtime.dispatch(SyncEvent::ProfileLoaded { username: "ana".into() }).await.unwrap();

    let result = runtime.dispatch(SyncEvent::SendMessage { text: "oi".into() }).await;
    assert_eq!(result, Err(SyncError::NoActiveConversation));
}

#[tokio::test]
async fn run_loop_tears_down_when_transport_closes() {
    let broker = SimBroker::new();
    let (runtime, _notifications) = runtime(&broker);
    let (intents, receiver) = mpsc::channel(8);

    broker.connect();
    let handle = tokio::spawn(runtime.run(receiver));
    intents.send(SyncEvent::ProfileLoaded { username: "ana".into() }).await.unwrap();
    intents.send(SyncEvent::SelectConversation { conversation_id: "c1".into() }).await.unwrap();

    for _ in 0..1_000 {
        if broker.subscribed_topics().len() == 3 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(broker.subscribed_topics().len(), 3);

    broker.close();
    handle.await.unwrap();

    assert!(broker.subscribed_topics().is_empty());
    assert_eq!(broker.unsubscribed().len(), 3);
}

#[tokio::test]
async fn ticks_keep_firing_under_continuous_frames() {
    let broker = SimBroker::new();
    let (runtime, mut notifications) = runtime(&broker);
    let (intents, receiver) = mpsc::channel(8);

    broker.connect();
    let handle = tokio::spawn(runtime.run(receiver));
    intents.send(SyncEvent::ProfileLoaded { username: "ana".into() }).await.unwrap();
    intents.send(SyncEvent::SelectConversation { conversation_id: "c1".into() }).await.unwrap();

    let bound = Notification::BindingChanged {
        conversation_id: Some("c1".into()),
        state: BindingState::Bound,
    };
    let mut seen = Vec::new();
    for _ in 0..1_000 {
        seen.extend(drain(&mut notifications));
        if seen.contains(&bound) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(seen.contains(&bound));

    // A typing lease followed by a flood of frames with no gap between them
    let typing = json!({ "chatRoomId": "c1", "username": "bia", "typing": true });
    broker.deliver("/topic/chat.c1.typing", serde_json::to_vec(&typing).unwrap());
    for _ in 0..2_000 {
        broker.deliver("/user/queue/messages", b"not json".to_vec());
    }
    for _ in 0..10_000 {
        if !broker.has_pending() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(!broker.has_pending());

    let typing_changes: Vec<_> = drain(&mut notifications)
        .into_iter()
        .filter(|notification| matches!(notification, Notification::TypingChanged { .. }))
        .collect();
    assert_eq!(typing_changes, vec![
        Notification::TypingChanged { username: "bia".into(), is_typing: true },
        Notification::TypingChanged { username: "bia".into(), is_typing: false },
    ]);

    broker.close();
    handle.await.unwrap();
}
