//! Testing utilities.
//!
//! `MockAuthor` is a scripted generation collaborator for deterministic
//! tests without API calls; it records every request it receives so
//! tests can assert on prompt assembly. The confirmers stand in for the
//! interactive confirmation gate.

use crate::author::CandidatePatch;
use crate::generate::{GenerateError, GenerationRequest, Generator};
use crate::session::Confirmer;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A scripted reply from the mock collaborator.
#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Transient(String),
    Permanent(String),
}

/// A generation collaborator that replays scripted responses in order.
pub struct MockAuthor {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockAuthor {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful text reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Text(text.into()));
        self
    }

    /// Queue a transient failure.
    pub fn transient(self, message: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Transient(message.into()));
        self
    }

    /// Queue a permanent failure.
    pub fn permanent(self, message: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Permanent(message.into()));
        self
    }

    /// How many generation calls have been made.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The prompt of the nth request received (0-based).
    pub fn prompt(&self, n: usize) -> String {
        self.requests.lock().unwrap()[n].prompt.clone()
    }
}

impl Default for MockAuthor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for MockAuthor {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerateError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Transient(message)) => Err(GenerateError::Transient(message)),
            Some(MockReply::Permanent(message)) => Err(GenerateError::Permanent(message)),
            None => Err(GenerateError::Permanent(
                "mock collaborator has no more scripted replies".to_string(),
            )),
        }
    }
}

/// Confirms every candidate.
pub struct AcceptAll;

impl Confirmer for AcceptAll {
    fn confirm(&mut self, _candidate: &CandidatePatch) -> bool {
        true
    }
}

/// Rejects every candidate.
pub struct RejectAll;

impl Confirmer for RejectAll {
    fn confirm(&mut self, _candidate: &CandidatePatch) -> bool {
        false
    }
}
