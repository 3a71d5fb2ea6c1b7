#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)] // Not every helper is used by every test binary

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use smsgate_session::{ConversationHandler, HandlerError, Inbound, Operation, Reply, SessionId};

/// State a two-level menu keeps between turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuState {
    pub path: Vec<String>,
    pub turns: u32,
}

/// A balance/top-up menu: the first turn shows the menu, the second picks an
/// entry and ends the conversation. Unrecognised choices fail the handler.
#[derive(Debug, Default)]
pub struct MenuHandler {
    pub calls: AtomicUsize,
}

impl MenuHandler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationHandler<MenuState> for MenuHandler {
    async fn handle(
        &self,
        address: &str,
        message: &str,
        operation: Operation,
        data: &mut MenuState,
    ) -> Result<Reply, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        data.turns += 1;

        match operation {
            Operation::Initiate => {
                data.path.push("main".to_string());
                Ok(Reply::prompt(format!("Hello {address}\n1. Balance\n2. Top up")))
            }
            Operation::Continue => match message {
                "1" => {
                    data.path.push("balance".to_string());
                    Ok(Reply::end("Your balance is 42.00"))
                }
                "2" => {
                    data.path.push("top-up".to_string());
                    Ok(Reply::prompt("Enter amount"))
                }
                other => Err(format!("unknown menu choice {other:?}").into()),
            },
        }
    }
}

pub fn initiate(session_id: &str, address: &str) -> Inbound {
    Inbound {
        session_id: SessionId::from(session_id),
        source_address: address.to_string(),
        operation: Operation::Initiate,
        message: "*141#".to_string(),
    }
}

pub fn reply(session_id: &str, address: &str, message: &str) -> Inbound {
    Inbound {
        session_id: SessionId::from(session_id),
        source_address: address.to_string(),
        operation: Operation::Continue,
        message: message.to_string(),
    }
}
