//! Terminal presentation of a running conversation.

use std::io::Write;
use std::time::Duration;

use agentmart_agent::orchestrator::ConversationObserver;
use agentmart_core::domain::message::Message;
use async_trait::async_trait;

const SEPARATOR_WIDTH: usize = 100;

/// Splits `text` into alternating runs of non-whitespace and whitespace so
/// that concatenating the chunks gives back `text` exactly.
pub fn word_chunks(text: &str) -> WordChunks<'_> {
    WordChunks { rest: text }
}

pub struct WordChunks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for WordChunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let whitespace = first.is_whitespace();
        let end = self
            .rest
            .char_indices()
            .find(|(_, ch)| ch.is_whitespace() != whitespace)
            .map(|(index, _)| index)
            .unwrap_or(self.rest.len());

        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}

/// Streams each message word by word to `out` as the agents produce them.
pub struct TranscriptPrinter<W> {
    out: W,
    chunk_delay: Duration,
}

impl<W: Write + Send> TranscriptPrinter<W> {
    pub fn new(out: W, chunk_delay: Duration) -> Self {
        Self { out, chunk_delay }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub async fn print_line(&mut self, sender: &str, content: &str) {
        if let Err(error) = self.write_message(sender, content).await {
            tracing::debug!(
                event_name = "cli.transcript.write_failed",
                sender,
                error = %error,
                "failed to write transcript line"
            );
        }
    }

    async fn write_message(&mut self, sender: &str, content: &str) -> std::io::Result<()> {
        write!(self.out, "{sender}:\n\n")?;
        for chunk in word_chunks(content) {
            self.out.write_all(chunk.as_bytes())?;
            self.out.flush()?;
            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }
        writeln!(self.out, "\n\n{}\n", "-".repeat(SEPARATOR_WIDTH))?;
        self.out.flush()
    }
}

#[async_trait]
impl<W: Write + Send> ConversationObserver for TranscriptPrinter<W> {
    async fn on_message(&mut self, message: &Message) {
        self.print_line(&message.sender, &message.content).await;
    }
}
