use crate::conversation::prompt::format_time;
use crate::defaults;
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Rendered history when nothing has been said yet.
pub const EMPTY_HISTORY: &str = "No recent messages";

/// One remembered chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub username: String,
    pub text: String,
    pub timestamp: DateTime<Local>,
}

/// Ring of the most recent chat lines, oldest first.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl ChatHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a line, evicting the oldest once full.
    pub fn add(&mut self, username: &str, text: &str, timestamp: DateTime<Local>) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            username: username.to_string(),
            text: text.to_string(),
            timestamp,
        });
    }

    /// `HH:MM:SS - user: text` lines, or [`EMPTY_HISTORY`].
    pub fn format(&self) -> String {
        if self.entries.is_empty() {
            return EMPTY_HISTORY.to_string();
        }

        self.entries
            .iter()
            .map(|e| {
                format!(
                    "{} - {}: {}\n",
                    format_time(Some(&e.timestamp)),
                    e.username,
                    e.text
                )
            })
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(defaults::HISTORY_SIZE)
    }
}

/// Copy of the state taken before an LLM call.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub summary: String,
    /// Rendered [`ChatHistory`].
    pub history: String,
    pub last_reply_time: Option<Instant>,
    /// Rendered fact listing.
    pub facts: String,
}

/// Conversation state shared by the orchestrator and its reply tasks.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub summary: String,
    pub history: ChatHistory,
    pub last_reply_time: Option<Instant>,
    /// Set while a reply is in flight so a second one cannot slip past the
    /// cooldown before the first lands.
    reply_pending_since: Option<Instant>,
}

pub type SharedState = Arc<RwLock<ConversationState>>;

impl ConversationState {
    pub fn new(history_size: usize) -> Self {
        Self {
            history: ChatHistory::new(history_size),
            ..Default::default()
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    pub fn snapshot(&self, facts: String) -> StateSnapshot {
        StateSnapshot {
            summary: self.summary.clone(),
            history: self.history.format(),
            last_reply_time: self.last_reply_time,
            facts,
        }
    }

    /// True if a reply was sent, or is being sent, less than `cooldown` ago.
    pub fn in_cooldown(&self, now: Instant, cooldown: Duration) -> bool {
        [self.last_reply_time, self.reply_pending_since]
            .into_iter()
            .flatten()
            .any(|at| now.saturating_duration_since(at) < cooldown)
    }

    /// Claims the right to reply. Returns false while in cooldown.
    pub fn try_begin_reply(&mut self, now: Instant, cooldown: Duration) -> bool {
        if self.in_cooldown(now, cooldown) {
            return false;
        }
        self.reply_pending_since = Some(now);
        true
    }

    /// Records a sent reply.
    pub fn finish_reply(
        &mut self,
        now: Instant,
        wall: DateTime<Local>,
        username: &str,
        text: &str,
    ) {
        self.history.add(username, text, wall);
        self.last_reply_time = Some(now);
        self.reply_pending_since = None;
    }

    /// Gives up a claimed reply that was never sent.
    pub fn abandon_reply(&mut self) {
        self.reply_pending_since = None;
    }

    pub fn reply_pending(&self) -> bool {
        self.reply_pending_since.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn test_empty_history_format() {
        assert_eq!(ChatHistory::default().format(), "No recent messages");
    }

    #[test]
    fn test_history_format() {
        let mut history = ChatHistory::new(20);
        history.add("bot", "привет", at(9, 5, 3));
        history.add("bot", "как дела", at(21, 0, 0));
        assert_eq!(
            history.format(),
            "09:05:03 - bot: привет\n21:00:00 - bot: как дела\n"
        );
    }

    #[test]
    fn test_history_keeps_last_entries_in_order() {
        let mut history = ChatHistory::new(20);
        for i in 0..25 {
            history.add("u", &i.to_string(), at(12, 0, 0));
        }
        assert_eq!(history.len(), 20);
        let texts: Vec<&str> = history.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts.first(), Some(&"5"));
        assert_eq!(texts.last(), Some(&"24"));
    }

    #[test]
    fn test_cooldown_window() {
        let mut state = ConversationState::default();
        let start = Instant::now();
        let cooldown = Duration::from_secs(30);

        assert!(!state.in_cooldown(start, cooldown));
        assert!(state.try_begin_reply(start, cooldown));
        // In flight counts as replied.
        assert!(!state.try_begin_reply(start + Duration::from_secs(1), cooldown));

        state.finish_reply(start + Duration::from_secs(2), at(12, 0, 0), "bot", "hi");
        assert!(!state.reply_pending());
        assert!(state.in_cooldown(start + Duration::from_secs(31), cooldown));
        assert!(!state.in_cooldown(start + Duration::from_secs(32), cooldown));
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn test_snapshot_copies_state() {
        let mut state = ConversationState::new(5);
        state.summary = "обсуждают игру".to_string();
        let snapshot = state.snapshot("No facts".to_string());

        state.summary.clear();
        assert_eq!(snapshot.summary, "обсуждают игру");
        assert_eq!(snapshot.history, EMPTY_HISTORY);
        assert_eq!(snapshot.facts, "No facts");
        assert_eq!(snapshot.last_reply_time, None);
    }

    #[test]
    fn test_abandoned_reply_releases_cooldown() {
        let mut state = ConversationState::default();
        let now = Instant::now();
        let cooldown = Duration::from_secs(30);

        assert!(state.try_begin_reply(now, cooldown));
        state.abandon_reply();
        assert!(state.try_begin_reply(now, cooldown));
        assert_eq!(state.last_reply_time, None);
    }
}
