use std::io::{self, BufRead, Write};

use agentmart_agent::payment::{PaymentConfirmer, PaymentSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// Asks the person at the terminal to approve a payment with YES or NO.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalConfirmer;

#[async_trait]
impl PaymentConfirmer for TerminalConfirmer {
    async fn confirm(&self, summary: &PaymentSummary) -> Result<bool> {
        let prompt = format!("{summary}\nPlease confirm the payment (YES/NO): ");
        let answer = tokio::task::spawn_blocking(move || read_answer(&prompt))
            .await
            .context("payment confirmation prompt was interrupted")??;
        Ok(is_approval(&answer))
    }
}

fn read_answer(prompt: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer).context("failed to read confirmation")?;
    Ok(answer)
}

pub fn is_approval(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_uppercase().as_str(), "YES" | "Y")
}

#[cfg(test)]
mod tests {
    use super::is_approval;

    #[test]
    fn accepts_yes_in_any_case() {
        assert!(is_approval("YES\n"));
        assert!(is_approval(" yes "));
        assert!(is_approval("y"));
    }

    #[test]
    fn anything_else_declines() {
        assert!(!is_approval("NO"));
        assert!(!is_approval(""));
        assert!(!is_approval("yes please"));
    }
}
