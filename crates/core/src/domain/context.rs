use crate::domain::message::Message;

/// Append-only history owned by a single agent.
///
/// The only removal is [`Context::rollback`], which takes back the most
/// recently appended entry after a rejected draft.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context {
    history: Vec<Message>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn rollback(&mut self) -> Option<Message> {
        self.history.pop()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn last(&self) -> Option<&Message> {
        self.history.last()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// The newest `window` entries, oldest first.
    pub fn recent(&self, window: usize) -> &[Message] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }

    /// `sender: content` lines for the newest `window` entries.
    pub fn render_recent(&self, window: usize) -> String {
        self.recent(window)
            .iter()
            .map(|message| format!("{}: {}", message.sender, message.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
