//! Property-based tests for the sync engine.
//!
//! Arbitrary interleavings of user intents, inbound frames, reconnects, and
//! time are driven through a `SimSession`, with the standard invariants
//! checked after every engine step.

use parley_core::{BindingState, ChatRoom, ChatRoomType, DeliveryStatus, ServerId};
use parley_harness::{EchoMode, InvariantRegistry, SimSession};
use parley_proto::{MessagePayload, TypingPayload};
use proptest::prelude::*;

const CONVERSATIONS: [&str; 2] = ["c1", "c2"];

#[derive(Debug, Clone)]
enum Op {
    Send(String),
    Compose(String),
    Advance(u64),
    FlushEchoes,
    RemoteMessage { conversation: usize, id: u8 },
    RemoteRead { id: u8 },
    RemoteTyping { conversation: usize, is_typing: bool },
    Disconnect,
    Reconnect,
    Select(usize),
}

fn room(id: &str) -> ChatRoom {
    ChatRoom {
        id: id.into(),
        chat_room_type: ChatRoomType::Private,
        users_in_chat: vec!["ana".into(), "bia".into()],
        name: None,
    }
}

/// Remote message `id` always has the same content, so repeated deliveries
/// are consistent copies.
fn remote(conversation: &str, id: u8, status: Option<DeliveryStatus>) -> MessagePayload {
    MessagePayload {
        server_id: Some(ServerId::new(format!("r{id}"))),
        correlation_token: None,
        conversation_id: conversation.into(),
        sender_id: "bia".into(),
        receiver_id: "ana".into(),
        content: format!("remote {id}"),
        sent_at: None,
        status,
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => "[a-c ]{0,4}".prop_map(Op::Send),
        2 => "[a-c]{0,3}".prop_map(Op::Compose),
        2 => (0u64..3000).prop_map(Op::Advance),
        2 => Just(Op::FlushEchoes),
        3 => (0usize..2, 0u8..6).prop_map(|(conversation, id)| Op::RemoteMessage { conversation, id }),
        1 => (0u8..6).prop_map(|id| Op::RemoteRead { id }),
        1 => (0usize..2, any::<bool>())
            .prop_map(|(conversation, is_typing)| Op::RemoteTyping { conversation, is_typing }),
        1 => Just(Op::Disconnect),
        1 => Just(Op::Reconnect),
        1 => (0usize..2).prop_map(Op::Select),
    ]
}

fn echo_strategy() -> impl Strategy<Value = EchoMode> {
    prop_oneof![Just(EchoMode::WithToken), Just(EchoMode::WithoutToken), Just(EchoMode::Silent)]
}

fn session(seed: u64, echo: EchoMode) -> SimSession {
    let mut session = SimSession::new(seed).unwrap().with_invariants(InvariantRegistry::standard());
    for id in CONVERSATIONS {
        session.add_conversation(room(id), Vec::new());
    }
    session.set_echo(echo);
    session.open("ana", "c1").unwrap();
    session
}

fn run(session: &mut SimSession, op: &Op) {
    // Preconditions (empty text, offline) are legitimate rejections.
    let _ = match op {
        Op::Send(text) => session.send(text),
        Op::Compose(text) => session.compose(text),
        Op::Advance(millis) => session.advance(*millis),
        Op::FlushEchoes => session.flush_echoes(),
        Op::RemoteMessage { conversation, id } => {
            session.deliver_message(&remote(CONVERSATIONS[*conversation], *id, None))
        },
        Op::RemoteRead { id } => {
            let conversation = session.engine().active_conversation().unwrap_or("c1").to_owned();
            session.deliver_status(&remote(&conversation, *id, Some(DeliveryStatus::Read)))
        },
        Op::RemoteTyping { conversation, is_typing } => session.deliver_typing(&TypingPayload {
            conversation_id: CONVERSATIONS[*conversation].into(),
            username: "bia".into(),
            is_typing: *is_typing,
        }),
        Op::Disconnect => session.disconnect(),
        Op::Reconnect => session.reconnect(),
        Op::Select(index) => session.apply(parley_core::SyncEvent::SelectConversation {
            conversation_id: CONVERSATIONS[*index].into(),
        }),
    };
}

proptest! {
    /// Ledger and typing invariants hold under arbitrary event sequences.
    #[test]
    fn prop_invariants_hold(
        seed in any::<u64>(),
        echo in echo_strategy(),
        ops in prop::collection::vec(op_strategy(), 0..60),
    ) {
        let mut session = session(seed, echo);
        for op in &ops {
            run(&mut session, op);
        }
    }

    /// Every sent message ends up exactly once in the ledger once its echo
    /// arrives, whether or not the server keeps the correlation token.
    #[test]
    fn prop_echoes_never_duplicate(
        seed in any::<u64>(),
        keep_token in any::<bool>(),
        texts in prop::collection::vec("[a-z]{1,6}", 1..10),
    ) {
        let echo = if keep_token { EchoMode::WithToken } else { EchoMode::WithoutToken };
        let mut session = session(seed, echo);

        for text in &texts {
            session.send(text).unwrap();
        }
        session.flush_echoes().unwrap();

        let ledger = session.engine().ledger().unwrap().snapshot();
        prop_assert_eq!(ledger.len(), texts.len());
        for message in ledger {
            prop_assert!(message.server_id.is_some());
            prop_assert!(message.correlation_token.is_some());
            prop_assert_eq!(message.delivery_status, DeliveryStatus::Sent);
        }
    }

    /// Bodiless status frames that overtake their echoes never show up as
    /// entries of their own and never trigger receipts.
    #[test]
    fn prop_status_before_echo_never_duplicates(
        seed in any::<u64>(),
        keep_token in any::<bool>(),
        texts in prop::collection::vec("[a-z]{1,6}", 1..6),
        read in prop::collection::vec(any::<bool>(), 6),
    ) {
        let echo = if keep_token { EchoMode::WithToken } else { EchoMode::WithoutToken };
        let mut session = session(seed, echo);
        for text in &texts {
            session.send(text).unwrap();
        }
        session.take_published();

        for (offset, read) in read.iter().enumerate().take(texts.len()) {
            session
                .deliver_status(&MessagePayload {
                    server_id: Some(ServerId::new((1_001 + offset).to_string())),
                    correlation_token: None,
                    conversation_id: "c1".into(),
                    sender_id: String::new(),
                    receiver_id: String::new(),
                    content: String::new(),
                    sent_at: None,
                    status: Some(if *read { DeliveryStatus::Read } else { DeliveryStatus::Sent }),
                })
                .unwrap();
        }
        prop_assert_eq!(session.engine().ledger().unwrap().len(), texts.len());
        session.flush_echoes().unwrap();

        let ledger = session.engine().ledger().unwrap().snapshot();
        prop_assert_eq!(ledger.len(), texts.len());
        for (message, read) in ledger.iter().zip(&read) {
            prop_assert_eq!(message.sender_id.as_str(), "ana");
            let expected = if *read { DeliveryStatus::Read } else { DeliveryStatus::Sent };
            prop_assert_eq!(message.delivery_status, expected);
        }
        let receipts = session
            .take_published()
            .into_iter()
            .filter(|frame| matches!(frame.purpose, parley_core::PublishPurpose::ReadReceipt { .. }))
            .count();
        prop_assert_eq!(receipts, 0);
    }

    /// Each unread inbound message is receipted at most once, no matter how
    /// often it is redelivered.
    #[test]
    fn prop_receipt_sent_once_per_message(
        seed in any::<u64>(),
        deliveries in prop::collection::vec(0u8..4, 1..20),
    ) {
        let mut session = session(seed, EchoMode::WithToken);
        session.take_published();

        for id in &deliveries {
            session.deliver_message(&remote("c1", *id, None)).unwrap();
        }

        let receipts: Vec<_> = session
            .take_published()
            .into_iter()
            .filter(|frame| matches!(frame.purpose, parley_core::PublishPurpose::ReadReceipt { .. }))
            .collect();

        let mut distinct = deliveries.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(receipts.len(), distinct.len());
    }

    /// Reconnecting any number of times keeps unconfirmed messages.
    #[test]
    fn prop_reconnect_preserves_pending(
        seed in any::<u64>(),
        texts in prop::collection::vec("[a-z]{1,6}", 1..5),
        cycles in 1usize..4,
    ) {
        let mut session = session(seed, EchoMode::Silent);
        for text in &texts {
            session.send(text).unwrap();
        }

        for _ in 0..cycles {
            session.disconnect().unwrap();
            session.reconnect().unwrap();
        }

        prop_assert_eq!(session.engine().binding_state(), BindingState::Bound);
        let ledger = session.engine().ledger().unwrap();
        prop_assert_eq!(ledger.len(), texts.len());
        // The reload found the persisted copies and folded the local ones in.
        prop_assert_eq!(ledger.unconfirmed().count(), 0);
    }
}
