//! Recording transport for request builder tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fetchbox::{InvocationConfig, Outcome, Transport};
use serde_json::json;

type Responder = dyn Fn(&InvocationConfig) -> Outcome + Send + Sync;

/// Transport that records every invocation and answers from a closure.
#[derive(Clone)]
pub struct MockTransport {
    calls: Arc<Mutex<Vec<InvocationConfig>>>,
    respond: Arc<Responder>,
}

impl MockTransport {
    /// Answers every call with `{ "ok": true }`.
    pub fn new() -> Self {
        Self::responding(|_| Outcome::Data(json!({ "ok": true })))
    }

    /// Answers every call with `respond(call)`.
    pub fn responding(respond: impl Fn(&InvocationConfig) -> Outcome + Send + Sync + 'static) -> Self {
        Self {
            calls: Arc::default(),
            respond: Arc::new(respond),
        }
    }

    /// Invocations received so far.
    pub fn calls(&self) -> Vec<InvocationConfig> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, request: InvocationConfig) -> Outcome {
        let outcome = (self.respond)(&request);
        self.calls.lock().unwrap().push(request);
        outcome
    }
}
