use std::fmt;
use std::sync::Arc;

use agentmart_core::domain::message::Message;
use agentmart_core::domain::sentinel::{PAYMENT_FAILED, PAYMENT_SUCCEEDED};
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::llm::ToolDeclaration;
use crate::tools::Tool;

pub const PAYMENT_TOOL_NAME: &str = "process_coinbase_payment";

/// What the payer is asked to confirm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentSummary {
    pub amount: String,
    pub currency: String,
    pub description: String,
    pub client_name: String,
    pub merchant: String,
}

impl PaymentSummary {
    /// Reads `paymentDetails` from a service reply's metadata.
    pub fn from_metadata(metadata: Option<&Value>) -> Result<Self> {
        let details = metadata
            .and_then(|metadata| metadata.get("paymentDetails"))
            .ok_or_else(|| anyhow!("message carries no paymentDetails"))?;

        Ok(Self {
            amount: field(details, &["pricing", "local", "amount"])?,
            currency: field(details, &["pricing", "local", "currency"])?,
            description: field(details, &["metadata", "itemDescription"])?,
            client_name: field(details, &["metadata", "name"])?,
            merchant: field(details, &["organizationName"])?,
        })
    }
}

impl fmt::Display for PaymentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Amount: {} {}", self.amount, self.currency)?;
        writeln!(f, "Description: {}", self.description)?;
        writeln!(f, "Client Name: {}", self.client_name)?;
        write!(f, "Merchant: {}", self.merchant)
    }
}

fn field(details: &Value, path: &[&str]) -> Result<String> {
    let value = path
        .iter()
        .try_fold(details, |value, key| value.get(key))
        .with_context(|| format!("paymentDetails.{} is missing", path.join(".")))?;

    Ok(match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    })
}

/// Side channel that asks the human payer to approve a charge.
#[async_trait]
pub trait PaymentConfirmer: Send + Sync {
    async fn confirm(&self, summary: &PaymentSummary) -> Result<bool>;
}

pub struct PaymentTool {
    confirmer: Arc<dyn PaymentConfirmer>,
}

impl PaymentTool {
    pub fn new(confirmer: Arc<dyn PaymentConfirmer>) -> Self {
        Self { confirmer }
    }

    async fn process(&self, message: &Message) -> Result<bool> {
        let summary = PaymentSummary::from_metadata(message.metadata.as_ref())?;
        self.confirmer.confirm(&summary).await
    }
}

#[async_trait]
impl Tool for PaymentTool {
    fn name(&self) -> &'static str {
        PAYMENT_TOOL_NAME
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: PAYMENT_TOOL_NAME.to_string(),
            description: "Process a Coinbase Commerce payment. Use this tool only if the user \
                          needs to pay for a coinbase commerce payment link."
                .to_string(),
            parameters: None,
        }
    }

    async fn execute(&self, _arguments: &Value, message: &Message) -> String {
        match self.process(message).await {
            Ok(true) => {
                info!(event_name = "payment.confirmed", payee = %message.sender, "payment confirmed");
                format!(
                    "{PAYMENT_SUCCEEDED} The client has confirmed the order and payment is \
                     processed successfully"
                )
            }
            Ok(false) => {
                info!(event_name = "payment.cancelled", payee = %message.sender, "payment cancelled");
                format!(
                    "{PAYMENT_FAILED} The client has cancelled the payment. Please end the \
                     conversation politely."
                )
            }
            Err(error) => {
                info!(event_name = "payment.failed", error = %error, "payment processing failed");
                format!(
                    "{PAYMENT_FAILED} Error processing payment: {error:#}. Please end the \
                     conversation politely."
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentmart_core::domain::message::{Message, Role};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::{PaymentConfirmer, PaymentSummary, PaymentTool};
    use crate::tools::Tool;

    struct RecordingConfirmer {
        answer: Option<bool>,
        seen: Mutex<Vec<PaymentSummary>>,
    }

    #[async_trait]
    impl PaymentConfirmer for RecordingConfirmer {
        async fn confirm(&self, summary: &PaymentSummary) -> Result<bool> {
            self.seen.lock().await.push(summary.clone());
            self.answer.ok_or_else(|| anyhow!("terminal closed"))
        }
    }

    fn confirmer(answer: Option<bool>) -> Arc<RecordingConfirmer> {
        Arc::new(RecordingConfirmer { answer, seen: Mutex::new(Vec::new()) })
    }

    fn invoice_message() -> Message {
        Message::new(Role::Assistant, "Here is your payment link", "byte", "alice-ai")
            .with_metadata(Some(json!({
                "text": "Here is your payment link",
                "paymentDetails": {
                    "pricing": { "local": { "amount": "23.50", "currency": "USD" } },
                    "metadata": { "itemDescription": "2x pad thai", "name": "Nicholas Richmond" },
                    "organizationName": "Byte Eats"
                }
            })))
    }

    #[tokio::test]
    async fn confirmed_payment_reports_success_sentinel() {
        let confirmer = confirmer(Some(true));
        let tool = PaymentTool::new(confirmer.clone());

        let result = tool.execute(&json!({}), &invoice_message()).await;

        assert!(result.starts_with("[PAYMENT_SUCCEEDED]"));
        let seen = confirmer.seen.lock().await;
        assert_eq!(seen[0].amount, "23.50");
        assert_eq!(seen[0].merchant, "Byte Eats");
    }

    #[tokio::test]
    async fn declined_payment_reports_failure_sentinel() {
        let tool = PaymentTool::new(confirmer(Some(false)));
        let result = tool.execute(&json!({}), &invoice_message()).await;
        assert!(result.starts_with("[PAYMENT_FAILED] The client has cancelled"));
    }

    #[tokio::test]
    async fn missing_details_become_tagged_failure_not_error() {
        let confirmer = confirmer(Some(true));
        let tool = PaymentTool::new(confirmer.clone());
        let message = Message::new(Role::Assistant, "no invoice", "byte", "alice-ai");

        let result = tool.execute(&json!({}), &message).await;

        assert!(result.starts_with("[PAYMENT_FAILED] Error processing payment"));
        assert!(confirmer.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn confirmer_failure_becomes_tagged_failure() {
        let tool = PaymentTool::new(confirmer(None));
        let result = tool.execute(&json!({}), &invoice_message()).await;
        assert!(result.contains("terminal closed"));
    }

    #[test]
    fn numeric_amounts_are_rendered_as_text() {
        let metadata = json!({
            "paymentDetails": {
                "pricing": { "local": { "amount": 12, "currency": "USD" } },
                "metadata": { "itemDescription": "salad", "name": "Ana" },
                "organizationName": "Greens"
            }
        });
        let summary = PaymentSummary::from_metadata(Some(&metadata)).expect("summary");
        assert_eq!(summary.amount, "12");
        assert!(summary.to_string().contains("Amount: 12 USD"));
    }
}
