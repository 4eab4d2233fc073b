//! Fuzz target for the sync engine
//!
//! Drives a simulated session with arbitrary intents, inbound frames (valid
//! and garbage), reconnects, and time. The standard invariants are checked
//! after every engine step and panic on violation.
//!
//! The engine should NEVER panic, and garbage frames must be dropped.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{ChatRoom, ChatRoomType, ServerId, SyncEvent};
use parley_harness::{EchoMode, InvariantRegistry, SimSession};
use parley_proto::{MessagePayload, TypingPayload};

#[derive(Debug, Clone, Arbitrary)]
enum EngineOp {
    Send(String),
    Compose(String),
    Advance(u16),
    FlushEchoes,
    Remote { id: u8, read: bool },
    Typing { is_typing: bool, other_conversation: bool },
    Garbage(Vec<u8>),
    Disconnect,
    Reconnect,
    Select(bool),
    Close,
}

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u64,
    tokenless_echo: bool,
    ops: Vec<EngineOp>,
}

fn room(id: &str) -> ChatRoom {
    ChatRoom {
        id: id.into(),
        chat_room_type: ChatRoomType::Private,
        users_in_chat: vec!["ana".into(), "bia".into()],
        name: None,
    }
}

fuzz_target!(|input: Input| {
    let Ok(session) = SimSession::new(input.seed) else { return };
    let mut session = session.with_invariants(InvariantRegistry::standard());
    session.add_conversation(room("c1"), Vec::new());
    session.add_conversation(room("c2"), Vec::new());
    session.set_echo(if input.tokenless_echo { EchoMode::WithoutToken } else { EchoMode::WithToken });
    if session.open("ana", "c1").is_err() {
        return;
    }

    for op in input.ops {
        let conversation = session.engine().active_conversation().unwrap_or("c1").to_owned();
        let _ = match op {
            EngineOp::Send(text) => session.send(&text),
            EngineOp::Compose(text) => session.compose(&text),
            EngineOp::Advance(millis) => session.advance(u64::from(millis)),
            EngineOp::FlushEchoes => session.flush_echoes(),
            EngineOp::Remote { id, read } => {
                let message = MessagePayload {
                    server_id: Some(ServerId::new(format!("r{}", id % 8))),
                    correlation_token: None,
                    conversation_id: conversation,
                    sender_id: "bia".into(),
                    receiver_id: "ana".into(),
                    content: format!("remote {}", id % 8),
                    sent_at: None,
                    status: None,
                };
                if read {
                    session.deliver_status(&MessagePayload {
                        status: Some(parley_core::DeliveryStatus::Read),
                        ..message
                    })
                } else {
                    session.deliver_message(&message)
                }
            },
            EngineOp::Typing { is_typing, other_conversation } => {
                let conversation_id = if other_conversation { "elsewhere".into() } else { conversation };
                session.deliver_typing(&TypingPayload {
                    conversation_id,
                    username: "bia".into(),
                    is_typing,
                })
            },
            EngineOp::Garbage(bytes) => session.deliver("/user/queue/messages", bytes),
            EngineOp::Disconnect => session.disconnect(),
            EngineOp::Reconnect => session.reconnect(),
            EngineOp::Select(second) => session.apply(SyncEvent::SelectConversation {
                conversation_id: if second { "c2".into() } else { "c1".into() },
            }),
            EngineOp::Close => session.apply(SyncEvent::CloseConversation),
        };
    }
});
