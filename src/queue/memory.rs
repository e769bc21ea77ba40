//! In-process queue with at-least-once delivery semantics.
//!
//! Received messages stay hidden for the visibility timeout and reappear unless deleted.
//! A message that has been delivered `max_receive_count` times and is still not deleted moves
//! to the dead-letter list instead of being redelivered.

use crate::queue::{QueueError, QueueMessage, QueueReceiver, QueueSender, ReceiveRequest};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Clone)]
struct Entry {
    message_id: String,
    body: String,
    receive_count: u32,
}

#[derive(Default)]
struct State {
    pending: VecDeque<Entry>,
    in_flight: HashMap<String, (Entry, Instant)>,
    dead_letters: Vec<String>,
    sequence: u64,
}

impl State {
    fn reclaim_expired(&mut self, now: Instant, max_receive_count: u32) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, (_, visible_at))| *visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some((entry, _)) = self.in_flight.remove(&receipt) {
                if entry.receive_count >= max_receive_count {
                    tracing::warn!(
                        message_id = %entry.message_id,
                        receive_count = entry.receive_count,
                        "Message moved to dead-letter list"
                    );
                    self.dead_letters.push(entry.body);
                } else {
                    self.pending.push_back(entry);
                }
            }
        }
    }

    fn next_visibility(&self) -> Option<Instant> {
        self.in_flight.values().map(|(_, visible_at)| *visible_at).min()
    }
}

/// Queue held in memory, usable as both sender and receiver.
pub struct MemoryQueue {
    state: Mutex<State>,
    arrivals: Notify,
    max_receive_count: u32,
}

impl MemoryQueue {
    /// Create a queue that dead-letters messages after `max_receive_count` deliveries.
    pub fn new(max_receive_count: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            arrivals: Notify::new(),
            max_receive_count: max_receive_count.max(1),
        }
    }

    /// Number of messages waiting for delivery.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Number of delivered, not yet acknowledged messages.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Bodies of messages that exhausted their deliveries.
    pub async fn dead_letters(&self) -> Vec<String> {
        self.state.lock().await.dead_letters.clone()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl QueueSender for MemoryQueue {
    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let mut state = self.state.lock().await;
        state.sequence += 1;
        let message_id = format!("msg-{}", state.sequence);
        state.pending.push_back(Entry {
            message_id: message_id.clone(),
            body: body.to_string(),
            receive_count: 0,
        });
        drop(state);
        self.arrivals.notify_one();
        Ok(message_id)
    }
}

#[async_trait]
impl QueueReceiver for MemoryQueue {
    async fn receive(&self, request: ReceiveRequest) -> Result<Vec<QueueMessage>, QueueError> {
        let deadline = Instant::now() + request.wait;

        loop {
            let now = Instant::now();
            let wake_at = {
                let mut state = self.state.lock().await;
                state.reclaim_expired(now, self.max_receive_count);

                let mut batch = Vec::new();
                while batch.len() < request.max_messages.max(1) {
                    let Some(mut entry) = state.pending.pop_front() else {
                        break;
                    };
                    entry.receive_count += 1;
                    state.sequence += 1;
                    let receipt_handle = format!("{}#{}", entry.message_id, state.sequence);
                    batch.push(QueueMessage {
                        message_id: entry.message_id.clone(),
                        receipt_handle: receipt_handle.clone(),
                        body: entry.body.clone(),
                        receive_count: entry.receive_count,
                    });
                    state
                        .in_flight
                        .insert(receipt_handle, (entry, now + request.visibility_timeout));
                }

                if !batch.is_empty() {
                    return Ok(batch);
                }
                state
                    .next_visibility()
                    .map_or(deadline, |visible_at| visible_at.min(deadline))
            };

            if now >= deadline {
                return Ok(Vec::new());
            }

            tokio::select! {
                _ = self.arrivals.notified() => {}
                _ = sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        // Stale handles are ignored, matching the hosted queue's behaviour.
        self.state.lock().await.in_flight.remove(receipt_handle);
        Ok(())
    }
}
