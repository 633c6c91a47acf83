use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the visible conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered list of turns.
///
/// Append-only, except that the content of a trailing assistant turn is
/// replaced while a reply is streaming in.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ChatTurn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(ChatTurn::assistant(content));
    }

    /// Publish the full assistant text accumulated so far.
    ///
    /// Replaces the trailing assistant turn in place, or appends one if the
    /// transcript ends in a user turn (or is empty).
    pub fn apply_assistant_update(&mut self, accumulated: &str) {
        match self.turns.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.clear();
                last.content.push_str(accumulated);
            }
            _ => self.push_assistant(accumulated),
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatTurn::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);

        let turn: ChatTurn = serde_json::from_str(r#"{"role":"assistant","content":"ok"}"#).unwrap();
        assert_eq!(turn, ChatTurn::assistant("ok"));
    }

    #[test]
    fn first_update_appends_then_replaces() {
        let mut t = Transcript::new();
        t.push_user("hello");

        t.apply_assistant_update("Hel");
        assert_eq!(t.len(), 2);
        t.apply_assistant_update("Hello");
        assert_eq!(t.len(), 2);

        assert_eq!(t.turns()[0], ChatTurn::user("hello"));
        assert_eq!(t.last(), Some(&ChatTurn::assistant("Hello")));
    }

    #[test]
    fn update_on_empty_transcript_appends() {
        let mut t = Transcript::new();
        t.apply_assistant_update("x");
        assert_eq!(t.turns(), &[ChatTurn::assistant("x")]);
    }

    #[test]
    fn earlier_assistant_turns_are_untouched() {
        let mut t = Transcript::new();
        t.push_user("a");
        t.apply_assistant_update("first");
        t.push_user("b");
        t.apply_assistant_update("second");

        let contents: Vec<_> = t.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, ["a", "first", "b", "second"]);
    }
}
