//! Budgeted conversation window.
//!
//! Keeps a transcript under a token budget by evicting the oldest messages.
//! A system message at index 0 is pinned: it is charged against the budget
//! but never evicted. Eviction is strictly FIFO over everything after it.

use std::fmt;

use crate::budget::counter::SharedTokenCounter;
use crate::budget::types::{BudgetError, WindowUsage};
use crate::message::Message;

pub struct ConversationWindow {
    messages: Vec<Message>,
    token_budget: u32,
    reserve_buffer: u32,
    counter: SharedTokenCounter,
}

impl ConversationWindow {
    pub fn new(token_budget: u32, reserve_buffer: u32, counter: SharedTokenCounter) -> Self {
        Self::with_messages(Vec::new(), token_budget, reserve_buffer, counter)
    }

    /// Wrap an existing transcript (e.g. one reloaded from storage). The
    /// budget is not enforced here; call [`enforce_budget`](Self::enforce_budget).
    pub fn with_messages(
        messages: Vec<Message>,
        token_budget: u32,
        reserve_buffer: u32,
        counter: SharedTokenCounter,
    ) -> Self {
        Self {
            messages,
            token_budget,
            reserve_buffer,
            counter,
        }
    }

    /// Add a message at the end. No budget check.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Evict oldest non-pinned messages until
    /// `total + pending_cost + reserve_buffer <= token_budget`.
    ///
    /// Returns the evicted messages, oldest first. When the budget cannot be
    /// met even with every evictable message gone, nothing is evicted and
    /// [`BudgetError::Unsatisfiable`] is returned.
    pub fn enforce_budget(&mut self, pending_cost: u32) -> Result<Vec<Message>, BudgetError> {
        let budget = u64::from(self.token_budget);
        let overhead = u64::from(pending_cost) + u64::from(self.reserve_buffer);
        let costs: Vec<u64> = self
            .messages
            .iter()
            .map(|m| u64::from(self.counter.count_message(m)))
            .collect();

        let mut total: u64 = costs.iter().sum();
        if total + overhead <= budget {
            return Ok(Vec::new());
        }

        let start = self.first_evictable();
        let mut evict_count = 0;
        for cost in &costs[start..] {
            if total + overhead <= budget {
                break;
            }
            total -= cost;
            evict_count += 1;
        }

        if total + overhead > budget {
            let required = total + overhead;
            log::warn!(
                "Window cannot fit: {} tokens required with only pinned content left, budget {}",
                required,
                budget
            );
            return Err(BudgetError::Unsatisfiable {
                required: u32::try_from(required).unwrap_or(u32::MAX),
                budget: self.token_budget,
            });
        }

        let evicted: Vec<Message> = self.messages.drain(start..start + evict_count).collect();
        log::debug!(
            "Evicted {} message(s) to fit budget ({} + {} pending + {} reserve <= {})",
            evicted.len(),
            total,
            pending_cost,
            self.reserve_buffer,
            self.token_budget
        );
        Ok(evicted)
    }

    /// The last `n` messages, used to cap request size independently of the budget.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Install `content` as the pinned system prompt, replacing any existing one.
    pub fn pin_system(&mut self, content: impl Into<String>) {
        let system = Message::system(content);
        match self.messages.first() {
            Some(first) if first.is_system() => self.messages[0] = system,
            _ => self.messages.insert(0, system),
        }
    }

    pub fn pinned(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.is_system())
    }

    pub fn usage(&self) -> WindowUsage {
        let pinned_tokens = self
            .pinned()
            .map(|m| self.counter.count_message(m))
            .unwrap_or(0);
        let total_tokens = self.counter.count_messages(&self.messages);
        WindowUsage {
            pinned_tokens,
            window_tokens: total_tokens.saturating_sub(pinned_tokens),
            total_tokens,
            budget: self.token_budget,
            reserve: self.reserve_buffer,
        }
    }

    /// Cost of `text` under this window's counter.
    pub fn cost_of(&self, text: &str) -> u32 {
        self.counter.count_text(text)
    }

    /// Replace the whole transcript.
    pub fn reset(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn token_budget(&self) -> u32 {
        self.token_budget
    }

    pub fn reserve_buffer(&self) -> u32 {
        self.reserve_buffer
    }

    fn first_evictable(&self) -> usize {
        usize::from(self.pinned().is_some())
    }
}

impl fmt::Debug for ConversationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationWindow")
            .field("messages", &self.messages)
            .field("token_budget", &self.token_budget)
            .field("reserve_buffer", &self.reserve_buffer)
            .finish_non_exhaustive()
    }
}
