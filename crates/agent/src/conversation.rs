use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use regex::Regex;
use tokio::sync::{Mutex, RwLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: TurnRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into() }
    }
}

/// Bounded per-session turn log. Sessions are created lazily on first
/// append and never share state; each one is an ordered window of the most
/// recent `max_turns` turns (FIFO eviction).
///
/// Concurrency discipline: one mutex per session key, so appends within a
/// session serialize (turn order is significant) while sessions stay fully
/// parallel.
pub struct ConversationMemory {
    max_turns: usize,
    sessions: RwLock<HashMap<String, Arc<Mutex<VecDeque<ConversationTurn>>>>>,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns: max_turns.max(1), sessions: RwLock::new(HashMap::new()) }
    }

    async fn session(&self, session_id: &str) -> Arc<Mutex<VecDeque<ConversationTurn>>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(log) = sessions.get(session_id) {
                return log.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_string()).or_default().clone()
    }

    pub async fn append(&self, session_id: &str, turn: ConversationTurn) {
        let log = self.session(session_id).await;
        let mut log = log.lock().await;
        log.push_back(turn);
        while log.len() > self.max_turns {
            log.pop_front();
        }
    }

    pub async fn history(&self, session_id: &str) -> Vec<ConversationTurn> {
        let log = self.session(session_id).await;
        let log = log.lock().await;
        log.iter().cloned().collect()
    }
}

/// Deterministic greeting shortcut: prefix match on the trimmed message,
/// case-insensitive. Blank input never matches.
pub struct GreetingDetector {
    pattern: Regex,
}

impl GreetingDetector {
    pub fn new() -> Self {
        let pattern = Regex::new(r"(?i)^(hi|hello|hey|howdy|yo|good\s*(morning|afternoon|evening))\b.*")
            .expect("greeting pattern is a valid literal");
        Self { pattern }
    }

    pub fn is_greeting(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.pattern.is_match(trimmed)
    }
}

impl Default for GreetingDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationMemory, ConversationTurn, GreetingDetector, TurnRole};

    #[tokio::test]
    async fn memory_keeps_only_the_newest_turns_in_order() {
        let memory = ConversationMemory::new(20);
        for index in 1..=21 {
            memory.append("s1", ConversationTurn::user(format!("message {index}"))).await;
        }

        let history = memory.history("s1").await;
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].content, "message 2");
        assert_eq!(history[19].content, "message 21");
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let memory = ConversationMemory::new(20);
        memory.append("s1", ConversationTurn::user("for s1")).await;
        memory.append("s2", ConversationTurn::assistant("for s2")).await;

        let s1 = memory.history("s1").await;
        let s2 = memory.history("s2").await;
        assert_eq!(s1.len(), 1);
        assert_eq!(s1[0].role, TurnRole::User);
        assert_eq!(s2.len(), 1);
        assert_eq!(s2[0].content, "for s2");
        assert!(memory.history("s3").await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_to_one_session_all_land() {
        let memory = std::sync::Arc::new(ConversationMemory::new(100));
        let mut handles = Vec::new();
        for index in 0..10 {
            let memory = memory.clone();
            handles.push(tokio::spawn(async move {
                memory.append("s1", ConversationTurn::user(format!("m{index}"))).await;
            }));
        }
        for handle in handles {
            handle.await.expect("append task");
        }

        assert_eq!(memory.history("s1").await.len(), 10);
    }

    #[test]
    fn greeting_detection_matches_prefix_greetings_only() {
        let detector = GreetingDetector::new();

        assert!(detector.is_greeting("Hello there"));
        assert!(detector.is_greeting("HI"));
        assert!(detector.is_greeting("good morning team"));
        assert!(detector.is_greeting("  hey, quick question  "));
        assert!(detector.is_greeting("yo"));

        assert!(!detector.is_greeting("hidden fee"));
        assert!(!detector.is_greeting(""));
        assert!(!detector.is_greeting("   "));
        assert!(!detector.is_greeting("delete order A-001"));
    }
}
