use super::payload::LikeUpdate;
use entity::ChatMessage;
use std::collections::HashSet;

/// Ordered chat log with id-based deduplication.
#[derive(Debug, Default, Clone)]
pub struct MessageList {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message unless one with the same id is already present.
    pub fn merge(&mut self, message: ChatMessage) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        self.ids.insert(message.id.clone());
        self.messages.push(message);
        true
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ChatMessage> {
        if !self.ids.remove(id) {
            return None;
        }
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    /// Applies broadcast like counters. `has_liked` only changes when the
    /// update belongs to the current user or carries an explicit flag for
    /// them.
    pub fn apply_like(&mut self, update: &LikeUpdate, current_user_id: Option<&str>) -> bool {
        let Some(message) = self.get_mut(&update.message_id) else {
            return false;
        };

        if let Some(likes) = update.likes {
            message.likes = likes;
        }

        let mine = match (&update.user_id, current_user_id) {
            (Some(liker), Some(me)) => liker == me,
            (None, _) => true,
            (Some(_), None) => false,
        };
        if mine {
            if let Some(has_liked) = update.has_liked {
                message.has_liked = has_liked;
            }
        }
        true
    }

    /// Loads history: history order first, then messages merged earlier that
    /// history did not contain.
    pub fn replace_with_history(&mut self, history: Vec<ChatMessage>) {
        let earlier = std::mem::take(&mut self.messages);
        self.ids.clear();

        for message in history {
            self.merge(message);
        }
        for message in earlier {
            self.merge(message);
        }
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
