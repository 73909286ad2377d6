//! Per-order message thread records
use crate::types::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub order_id: String,
    #[n(2)]
    pub sender_id: String,
    #[n(3)]
    pub content: String,
    #[n(4)]
    pub read: bool, // false -> true once, never back
    #[n(5)]
    pub created_at: TimeStamp,
}

impl Message {
    pub fn new(id: String, order_id: &str, sender_id: &str, content: &str, now: TimeStamp) -> Self {
        Self {
            id,
            order_id: order_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            read: false,
            created_at: now,
        }
    }

    /// Returns `true` when the flag actually changed.
    pub fn mark_read(&mut self) -> bool {
        let changed = !self.read;
        self.read = true;
        changed
    }
}
