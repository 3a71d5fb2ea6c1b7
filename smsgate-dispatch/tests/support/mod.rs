#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)] // Not every helper is used by every test binary

pub mod mock_transport;

use std::time::Duration;

use smsgate_dispatch::{DispatchEvent, Message};
use tokio::sync::mpsc;

/// `count` numbered recipient addresses, in order.
pub fn recipients(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("tel:9477{i:07}")).collect()
}

pub fn message(id: &str, count: usize) -> Message {
    Message::new(id, "Your OTP is 4411", recipients(count)).unwrap()
}

/// Wait for exactly `count` events, failing the test if they don't arrive.
pub async fn collect(
    events: &mut mpsc::UnboundedReceiver<DispatchEvent>,
    count: usize,
) -> Vec<DispatchEvent> {
    let mut collected = Vec::with_capacity(count);
    while collected.len() < count {
        let event = tokio::time::timeout(Duration::from_secs(600), events.recv())
            .await
            .expect("timed out waiting for dispatch events")
            .expect("event channel closed");
        collected.push(event);
    }
    collected
}
