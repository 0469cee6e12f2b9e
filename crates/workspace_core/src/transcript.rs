//! Conversational transcript built from streamed accumulated deltas.
//!
//! Streamed messages are overwritten with each event's accumulated value and
//! never concatenated. While a message streams its content length only
//! grows; once finalized it is frozen. Alternate responses produced by
//! regenerate live in a per-message variant set with a selection pointer.

use std::collections::BTreeMap;

use workspace_logging::{ws_debug, ws_trace};

use crate::{JobId, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    User,
    #[default]
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub is_streaming: bool,
    pub agent: Option<String>,
    pub job_id: Option<JobId>,
    /// Accumulated reasoning text streamed alongside the response.
    pub reasoning: Option<String>,
    pub is_error: bool,
}

/// Alternate complete contents of one message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariantSet {
    pub contents: Vec<String>,
    pub selected: usize,
}

/// A message together with its variants, as stored between sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub message: Message,
    pub variants: VariantSet,
}

/// Role/content pair sent to the backend as conversation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    variants: BTreeMap<MessageId, VariantSet>,
    next_seq: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    fn get_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    pub fn variants(&self, message_id: &str) -> Option<&VariantSet> {
        self.variants.get(message_id)
    }

    /// Content shown for a message: the selected variant once streaming is
    /// over, otherwise the live content.
    pub fn displayed_content<'a>(&'a self, message: &'a Message) -> &'a str {
        if message.is_streaming {
            return &message.content;
        }
        self.variants
            .get(&message.id)
            .and_then(|set| set.contents.get(set.selected))
            .map(String::as_str)
            .unwrap_or(&message.content)
    }

    fn next_id(&mut self, role: Role) -> MessageId {
        self.next_seq += 1;
        format!("{}-{}", role.as_str(), self.next_seq)
    }

    pub fn push_user(&mut self, content: &str) -> MessageId {
        let id = self.next_id(Role::User);
        self.messages.push(Message {
            id: id.clone(),
            role: Role::User,
            content: content.to_string(),
            ..Message::default()
        });
        id
    }

    pub fn push_assistant(&mut self, content: &str) -> MessageId {
        let id = self.next_id(Role::Assistant);
        self.messages.push(Message {
            id: id.clone(),
            role: Role::Assistant,
            content: content.to_string(),
            ..Message::default()
        });
        id
    }

    /// Appends an error-flavoured assistant message.
    pub fn push_error(&mut self, content: &str, job_id: Option<&str>) -> MessageId {
        let id = self.next_id(Role::Assistant);
        self.messages.push(Message {
            id: id.clone(),
            role: Role::Assistant,
            content: content.to_string(),
            job_id: job_id.map(ToOwned::to_owned),
            is_error: true,
            ..Message::default()
        });
        id
    }

    /// Applies an accumulated response value.
    ///
    /// Returns `true` when the displayed content changed.
    pub fn apply_delta(&mut self, message_id: &str, accumulated: &str, job_id: Option<&str>) -> bool {
        if self.get(message_id).is_none() {
            self.messages.push(Message {
                id: message_id.to_string(),
                role: Role::Assistant,
                content: accumulated.to_string(),
                is_streaming: true,
                job_id: job_id.map(ToOwned::to_owned),
                ..Message::default()
            });
            return true;
        }
        match self.get_mut(message_id) {
            None => false,
            Some(message) if !message.is_streaming => {
                ws_debug!("delta ignored for finalized message {}", message_id);
                false
            }
            Some(message) => {
                if accumulated.chars().count() < message.content.chars().count() {
                    ws_trace!(
                        "stale accumulation dropped for {} ({} < {})",
                        message_id,
                        accumulated.len(),
                        message.content.len()
                    );
                    return false;
                }
                if message.content == accumulated {
                    return false;
                }
                message.content = accumulated.to_string();
                true
            }
        }
    }

    /// Same monotonic rule as [`Transcript::apply_delta`], for reasoning text.
    pub fn apply_reasoning(&mut self, message_id: &str, accumulated: &str, job_id: Option<&str>) -> bool {
        if self.get(message_id).is_none() {
            self.apply_delta(message_id, "", job_id);
        }
        let Some(message) = self.get_mut(message_id) else {
            return false;
        };
        if !message.is_streaming {
            return false;
        }
        let current = message.reasoning.as_deref().unwrap_or_default();
        if accumulated.chars().count() < current.chars().count() || current == accumulated {
            return false;
        }
        message.reasoning = Some(accumulated.to_string());
        true
    }

    pub fn set_agent(&mut self, message_id: &str, agent: &str) {
        if let Some(message) = self.get_mut(message_id) {
            if message.is_streaming {
                message.agent = Some(agent.to_string());
            }
        }
    }

    /// Puts a response message back into streaming state after a reload or
    /// reconnect, creating an empty placeholder if it was never stored. The
    /// message is attributed to `job_id` from then on.
    pub fn resume_streaming(&mut self, message_id: &str, job_id: &str) {
        match self.get_mut(message_id) {
            Some(message) => {
                message.is_streaming = true;
                message.job_id = Some(job_id.to_string());
            }
            None => {
                self.apply_delta(message_id, "", Some(job_id));
            }
        }
    }

    /// Drops a finalized placeholder that never received content.
    pub fn remove_if_empty(&mut self, message_id: &str) -> bool {
        let before = self.messages.len();
        self.messages
            .retain(|m| m.id != message_id || m.is_streaming || !m.content.trim().is_empty());
        before != self.messages.len()
    }

    /// Marks the message as no longer streaming. Content is untouched.
    pub fn finalize(&mut self, message_id: &str) -> Option<&Message> {
        let message = self.get_mut(message_id)?;
        message.is_streaming = false;
        Some(message)
    }

    /// Stores the current content as variant 0 the first time a message is
    /// regenerated.
    pub fn capture_variant_base(&mut self, message_id: &str, content: &str) {
        let set = self.variants.entry(message_id.to_string()).or_default();
        if set.contents.is_empty() && !content.trim().is_empty() {
            set.contents.push(content.to_string());
            set.selected = 0;
        }
    }

    /// Adds a completed alternative unless it repeats the latest one.
    pub fn append_variant(&mut self, message_id: &str, content: &str) -> bool {
        let set = self.variants.entry(message_id.to_string()).or_default();
        let duplicate = set
            .contents
            .last()
            .is_some_and(|last| last.trim() == content.trim());
        if duplicate || content.trim().is_empty() {
            return false;
        }
        set.contents.push(content.to_string());
        set.selected = set.contents.len() - 1;
        true
    }

    pub fn select_variant(&mut self, message_id: &str, index: usize) -> bool {
        match self.variants.get_mut(message_id) {
            Some(set) if index < set.contents.len() => {
                set.selected = index;
                true
            }
            _ => false,
        }
    }

    /// Captures the variant base and clears the message so a new stream can
    /// fill it. Returns the previous content.
    pub fn begin_regeneration(&mut self, message_id: &str) -> Option<String> {
        let previous = self.get(message_id)?.content.clone();
        self.capture_variant_base(message_id, &previous);
        let message = self.get_mut(message_id)?;
        message.content.clear();
        message.reasoning = None;
        message.is_streaming = true;
        message.is_error = false;
        Some(previous)
    }

    /// Undoes [`Transcript::begin_regeneration`] when the request failed.
    pub fn cancel_regeneration(&mut self, message_id: &str, previous: &str) {
        if let Some(message) = self.get_mut(message_id) {
            message.content = previous.to_string();
            message.is_streaming = false;
        }
    }

    /// Replaces a user message and drops everything after it.
    ///
    /// Returns the removed messages, or `None` if `message_id` is not a user
    /// message.
    pub fn edit_and_truncate(&mut self, message_id: &str, new_content: &str) -> Option<Vec<Message>> {
        let index = self.position(message_id)?;
        if self.messages[index].role != Role::User {
            return None;
        }
        self.messages[index].content = new_content.to_string();
        let removed = self.truncate_after(index);
        Some(removed)
    }

    /// Drops every message after `index` and prunes variant storage.
    pub fn truncate_after(&mut self, index: usize) -> Vec<Message> {
        let removed: Vec<Message> = self.messages.drain(index + 1..).collect();
        let surviving: Vec<&str> = self.messages.iter().map(|m| m.id.as_str()).collect();
        self.variants
            .retain(|id, _| surviving.contains(&id.as_str()));
        removed
    }

    pub fn truncate_after_id(&mut self, message_id: &str) -> Vec<Message> {
        match self.position(message_id) {
            Some(index) => self.truncate_after(index),
            None => Vec::new(),
        }
    }

    /// Finalized, non-error messages before `message_id` (all messages when
    /// `None`), as request context.
    pub fn history_before(&self, message_id: Option<&str>) -> Vec<HistoryEntry> {
        let end = message_id
            .and_then(|id| self.position(id))
            .unwrap_or(self.messages.len());
        self.messages[..end]
            .iter()
            .filter(|m| !m.is_streaming && !m.is_error && !m.content.trim().is_empty())
            .map(|m| HistoryEntry {
                role: m.role,
                content: self.displayed_content(m).to_string(),
            })
            .collect()
    }

    /// The user message that prompted `message_id`.
    pub fn preceding_user(&self, message_id: &str) -> Option<&Message> {
        let index = self.position(message_id)?;
        self.messages[..index]
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
    }

    pub fn snapshot(&self) -> Vec<MessageSnapshot> {
        self.messages
            .iter()
            .map(|message| MessageSnapshot {
                message: message.clone(),
                variants: self.variants.get(&message.id).cloned().unwrap_or_default(),
            })
            .collect()
    }

    /// Replaces the transcript with persisted messages. Streaming flags are
    /// cleared and the id sequence continues past the restored ids.
    pub fn restore(&mut self, snapshots: Vec<MessageSnapshot>) {
        self.messages.clear();
        self.variants.clear();
        for MessageSnapshot {
            mut message,
            variants,
        } in snapshots
        {
            message.is_streaming = false;
            if !variants.contents.is_empty() {
                let selected = variants.selected.min(variants.contents.len() - 1);
                self.variants.insert(
                    message.id.clone(),
                    VariantSet {
                        contents: variants.contents,
                        selected,
                    },
                );
            }
            self.messages.push(message);
        }
        self.next_seq = self
            .messages
            .iter()
            .filter_map(|m| m.id.rsplit_once('-'))
            .filter_map(|(_, suffix)| suffix.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
    }
}
