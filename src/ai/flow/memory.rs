//! Bounded per-session collections: the conversation log and the
//! reference-image set. Both are capped; eviction is strictly FIFO by
//! insertion order.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::ai::core::providers::ImageLocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in history. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct ConversationLog {
    turns: VecDeque<ConversationTurn>,
    cap: usize,
}

impl ConversationLog {
    pub fn new(cap: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(cap.min(64)),
            cap,
        }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        if self.cap == 0 {
            return;
        }
        while self.turns.len() >= self.cap {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Insertion-ordered reference images; the most recent entry is the
/// effective generation context unless a call supplies an override.
#[derive(Debug)]
pub struct ReferenceImageSet {
    images: VecDeque<ImageLocator>,
    cap: usize,
}

impl ReferenceImageSet {
    pub fn new(cap: usize) -> Self {
        Self {
            images: VecDeque::with_capacity(cap.min(16)),
            cap,
        }
    }

    pub fn push(&mut self, image: ImageLocator) {
        if self.cap == 0 {
            return;
        }
        while self.images.len() >= self.cap {
            self.images.pop_front();
        }
        self.images.push_back(image);
    }

    pub fn latest(&self) -> Option<&ImageLocator> {
        self.images.back()
    }

    pub fn all(&self) -> Vec<ImageLocator> {
        self.images.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(n: usize) -> ImageLocator {
        ImageLocator::url(format!("https://cdn.example/{}.png", n))
    }

    #[test]
    fn test_log_respects_cap_fifo() {
        let mut log = ConversationLog::new(3);
        for i in 0..5 {
            log.push(ConversationTurn::new(Role::User, format!("m{}", i)));
        }
        assert_eq!(log.len(), 3);
        let turns = log.turns();
        assert_eq!(turns[0].content, "m2");
        assert_eq!(turns[2].content, "m4");
    }

    #[test]
    fn test_log_clear() {
        let mut log = ConversationLog::new(4);
        log.push(ConversationTurn::new(Role::User, "hello"));
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_log_zero_cap_drops_everything() {
        let mut log = ConversationLog::new(0);
        log.push(ConversationTurn::new(Role::User, "hello"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_images_evict_oldest_first() {
        let mut set = ReferenceImageSet::new(3);
        for i in 0..5 {
            set.push(image(i));
        }
        assert_eq!(set.len(), 3);
        let all = set.all();
        assert_eq!(all[0], image(2));
        assert_eq!(all[2], image(4));
        assert_eq!(set.latest(), Some(&image(4)));
    }

    #[test]
    fn test_images_exactly_at_cap() {
        let mut set = ReferenceImageSet::new(2);
        set.push(image(0));
        set.push(image(1));
        assert_eq!(set.len(), 2);
        set.push(image(2));
        assert_eq!(set.len(), 2);
        assert_eq!(set.all(), vec![image(1), image(2)]);
    }

    #[test]
    fn test_images_clear_is_independent_operation() {
        let mut set = ReferenceImageSet::new(4);
        set.push(image(0));
        set.clear();
        assert!(set.is_empty());
        assert!(set.latest().is_none());
    }
}
