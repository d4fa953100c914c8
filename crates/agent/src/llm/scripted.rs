use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BackendFailure, Completion, CompletionRequest, LlmClient};

/// Deterministic client that replays queued results in order and records
/// every request it receives.
#[derive(Default)]
pub struct ScriptedLlmClient {
    state: Mutex<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    results: VecDeque<Result<Completion, BackendFailure>>,
    fallback: Option<Completion>,
    requests: Vec<CompletionRequest>,
}

impl ScriptedLlmClient {
    pub fn with_script(results: Vec<Result<Completion, BackendFailure>>) -> Self {
        Self {
            state: Mutex::new(ScriptedState {
                results: results.into(),
                fallback: None,
                requests: Vec::new(),
            }),
        }
    }

    /// Script made only of successful text completions.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(texts.into_iter().map(|text| Ok(Completion::text(text))).collect())
    }

    /// Completion returned once the script runs dry.
    pub fn with_fallback(self, fallback: Completion) -> Self {
        let mut state = self.state.into_inner();
        state.fallback = Some(fallback);
        Self { state: Mutex::new(state) }
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.state.lock().await.requests.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }

    pub async fn remaining(&self) -> usize {
        self.state.lock().await.results.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BackendFailure> {
        let mut state = self.state.lock().await;
        state.requests.push(request);

        match state.results.pop_front() {
            Some(result) => result,
            None => state.fallback.clone().ok_or_else(|| {
                BackendFailure::InvalidResponse("scripted client has no response left".to_string())
            }),
        }
    }
}
