//! Steering and follow-up interjection queues polled between turns.
//!
//! Modeled on a "drain-all vs pop-one" dispatch idiom: two plain
//! `VecDeque`s, since nothing beyond "steering before follow-up" priority
//! is needed here.

use std::collections::VecDeque;

use conductor_llm::Message;

/// Whether a queue is drained in full or popped one message at a time when
/// the loop enters `POLLING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    All,
    OneAtATime,
}

/// One of the two interjection queues. Steering is high priority and
/// consulted first; follow-up is only consulted once steering is empty.
#[derive(Default)]
pub struct InterjectionQueue {
    messages: VecDeque<Message>,
}

impl InterjectionQueue {
    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Pop according to `mode`: either every queued message, or just the
    /// head. Returns an empty `Vec` if the queue was already empty.
    pub fn dispatch(&mut self, mode: DispatchMode) -> Vec<Message> {
        match mode {
            DispatchMode::All => self.messages.drain(..).collect(),
            DispatchMode::OneAtATime => self.messages.pop_front().into_iter().collect(),
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
