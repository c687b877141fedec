use std::collections::VecDeque;

use indexmap::IndexMap;

use super::InboundMessage;

/// Bounded queue per inbound topic. When a queue is full the oldest message is dropped.
#[derive(Debug)]
pub struct Inbox {
    queues: IndexMap<String, VecDeque<String>>,
    capacity: usize,
    dropped: u64,
}

impl Inbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: IndexMap::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Queues a message, returns `false` if an older one had to make room for it.
    pub fn push(&mut self, message: InboundMessage) -> bool {
        let queue = self.queues.entry(message.topic).or_default();
        let mut kept = true;
        while queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped += 1;
            kept = false;
        }
        queue.push_back(message.payload);
        kept
    }

    /// Takes the oldest message of every topic, in the order the topics were first seen.
    pub fn take_round(&mut self) -> Vec<InboundMessage> {
        let round = self
            .queues
            .iter_mut()
            .filter_map(|(topic, queue)| {
                queue.pop_front().map(|payload| InboundMessage {
                    topic: topic.clone(),
                    payload,
                })
            })
            .collect();
        self.queues.retain(|_, queue| !queue.is_empty());
        round
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Messages dropped since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
