//! Fuzz target for the message ledger
//!
//! # Strategy
//!
//! - Copies of a small pool of messages with random key shapes
//! - Bodiless status updates, often ahead of their message
//! - Foreign-conversation and keyless copies mixed in
//! - Occasional wholesale reloads
//!
//! # Invariants
//!
//! - No server id or correlation token appears on two entries
//! - Keyless and foreign copies are rejected without touching the ledger
//! - A status update never adds an entry
//! - Status of a server id never moves backwards between reloads

#![no_main]

use std::collections::{HashMap, HashSet};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{CorrelationToken, DeliveryStatus, Ledger, Message, ServerId};

#[derive(Debug, Clone, Arbitrary)]
enum LedgerOp {
    Upsert { message: u8, shape: KeyShape, status: u8, foreign: bool },
    Status { message: u8, status: u8 },
    Reload { count: u8 },
}

#[derive(Debug, Clone, Arbitrary)]
enum KeyShape {
    Server,
    Token,
    Both,
    Neither,
}

fn copy(message: u8, shape: &KeyShape, status: u8, foreign: bool) -> Message {
    let n = message % 8;
    let server_id = Some(ServerId::new(format!("s{n}")));
    let token = Some(CorrelationToken::new(format!("t{n}")));
    let (server_id, correlation_token) = match shape {
        KeyShape::Server => (server_id, None),
        KeyShape::Token => (None, token),
        KeyShape::Both => (server_id, token),
        KeyShape::Neither => (None, None),
    };
    Message {
        server_id,
        correlation_token,
        conversation_id: if foreign { "c2".into() } else { "c1".into() },
        sender_id: "ana".into(),
        receiver_id: "bia".into(),
        content: format!("message {n}"),
        sent_at: None,
        delivery_status: match status % 3 {
            0 => DeliveryStatus::Sending,
            1 => DeliveryStatus::Sent,
            _ => DeliveryStatus::Read,
        },
    }
}

fuzz_target!(|ops: Vec<LedgerOp>| {
    let mut ledger = Ledger::new("c1");
    let mut statuses: HashMap<ServerId, DeliveryStatus> = HashMap::new();

    for op in ops {
        match op {
            LedgerOp::Upsert { message, shape, status, foreign } => {
                let rejected = foreign || matches!(shape, KeyShape::Neither);
                let revision = ledger.revision();
                let result = ledger.upsert(copy(message, &shape, status, foreign));
                if rejected {
                    assert!(result.is_err(), "ledger accepted {shape:?} foreign={foreign}");
                    assert_eq!(ledger.revision(), revision);
                } else {
                    assert!(result.is_ok());
                }
            },
            LedgerOp::Status { message, status } => {
                let update = Message {
                    sender_id: String::new(),
                    receiver_id: String::new(),
                    content: String::new(),
                    ..copy(message, &KeyShape::Server, status, false)
                };
                let len = ledger.len();
                assert!(ledger.apply_status(update).is_ok());
                assert_eq!(ledger.len(), len, "status update added an entry");
            },
            LedgerOp::Reload { count } => {
                let history = (0..count % 8).map(|n| copy(n, &KeyShape::Server, 1, false));
                ledger.replace_all(history);
                statuses.clear();
            },
        }

        let mut server_ids = HashSet::new();
        let mut tokens = HashSet::new();
        for entry in ledger.snapshot() {
            if let Some(id) = &entry.server_id {
                assert!(server_ids.insert(id.clone()), "duplicate server id {id}");
                if let Some(previous) = statuses.insert(id.clone(), entry.delivery_status) {
                    assert!(entry.delivery_status >= previous, "status regressed for {id}");
                }
            }
            if let Some(token) = &entry.correlation_token {
                assert!(tokens.insert(token.clone()), "duplicate token {token}");
            }
        }
    }
});
