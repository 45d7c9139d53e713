//! Scripted transport for deterministic pipeline tests

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::time::Instant;

use crate::{
    error::Result,
    request::{ApiResponse, PreparedRequest},
    transport::Transport,
};

/// Replays scripted responses and records every request it receives
///
/// Responses are served in order; the last one repeats once the script is
/// exhausted. An empty script answers `200` with an empty body.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<ApiResponse>>,
    calls: Mutex<Vec<(Instant, PreparedRequest)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script bodiless responses with the given statuses
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = u16>) -> Self {
        let responses = statuses.into_iter().map(|code| {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            ApiResponse::new(status, Vec::new())
        });
        self.with_responses(responses)
    }

    pub fn with_responses(self, responses: impl IntoIterator<Item = ApiResponse>) -> Self {
        self.script.lock().extend(responses);
        self
    }

    /// Requests received so far, in order
    pub fn calls(&self) -> Vec<PreparedRequest> {
        self.calls.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Time elapsed between consecutive requests
    pub fn call_gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock();
        calls
            .windows(2)
            .map(|pair| pair[1].0.duration_since(pair[0].0))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: PreparedRequest) -> Result<ApiResponse> {
        let url = request.url.to_string();
        self.calls.lock().push((Instant::now(), request));

        let mut script = self.script.lock();
        let mut response = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
        .unwrap_or_else(|| ApiResponse::new(StatusCode::OK, Vec::new()));
        response.url = url;
        Ok(response)
    }
}
