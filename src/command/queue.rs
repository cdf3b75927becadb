// src/command/queue.rs - Bounded FIFO of raw command lines
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue full ({capacity} commands), discarding command")]
    Full { capacity: usize },
}

/// Fixed-capacity command buffer with a drop-on-full policy.
///
/// Storage is reserved once at construction; pushes never grow it.
#[derive(Debug)]
pub struct CommandQueue {
    entries: VecDeque<String>,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `text` at the tail. Returns `false` and leaves the queue
    /// untouched when it is already full.
    pub fn enqueue(&mut self, text: impl Into<String>) -> bool {
        self.push(text).is_ok()
    }

    pub fn push(&mut self, text: impl Into<String>) -> Result<(), QueueError> {
        if self.entries.len() >= self.capacity {
            return Err(QueueError::Full { capacity: self.capacity });
        }
        self.entries.push_back(text.into());
        Ok(())
    }

    /// Removes and returns the oldest entry.
    pub fn dequeue(&mut self) -> Option<String> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}
