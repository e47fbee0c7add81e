//! Shared helpers for the hardware integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use vislink_hardware::LinkEvent;
use vislink_hardware::mock::CameraOutput;
use vislink_protocol::{Link, Outcome, Transaction, Transport};

/// Upper bound for waiting on a driver event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Feed everything the camera has produced back into the link until the
/// exchange settles. Returns the number of chunks delivered.
pub fn settle<T: Transport>(link: &mut Link<T>, output: &mut CameraOutput) -> usize {
    let mut chunks = 0;
    while let Ok(chunk) = output.try_recv() {
        let (_, status) = link.bytes_arrived(&chunk);
        status.expect("Test helper: pump after feed failed");
        chunks += 1;
    }
    chunks
}

/// Slot receiving a single transaction outcome.
#[derive(Clone, Default)]
pub struct OutcomeSlot(Arc<Mutex<Option<Outcome>>>);

impl OutcomeSlot {
    pub fn attach(&self, txn: Transaction) -> Transaction {
        let slot = self.0.clone();
        txn.on_complete(move |outcome| {
            *slot.lock().expect("Test helper: slot lock poisoned") = Some(outcome);
        })
    }

    pub fn take(&self) -> Option<Outcome> {
        self.0.lock().expect("Test helper: slot lock poisoned").take()
    }
}

/// Wait for the first event matching `pred`, skipping the others.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<LinkEvent>,
    pred: impl Fn(&LinkEvent) -> bool,
) -> LinkEvent {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("Test helper: event channel closed")
                }
            }
        }
    })
    .await
    .expect("Test helper: timed out waiting for link event")
}
