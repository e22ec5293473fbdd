#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use dspac_trading_client::datastructures::client::{ApiRequest, ApiResponse, Endpoint, Transport};
use dspac_trading_client::datastructures::config::Config;
use dspac_trading_client::dspac::DspacClient;
use dspac_trading_client::error::ClientResult;
use serde_json::Value;

/// Replays canned responses in order and records every request it is handed.
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<ApiRequest>>,
    responses: Mutex<VecDeque<ApiResponse>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, response: ApiResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn reply_json(self, body: Value) -> Self {
        self.reply(json_response(body, &[]))
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.endpoint == Some(endpoint))
            .count()
    }

    pub fn last_to(&self, endpoint: Endpoint) -> Option<ApiRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.endpoint == Some(endpoint))
            .cloned()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let endpoint = request.endpoint;
        self.requests.lock().unwrap().push(request);
        let response = self.responses.lock().unwrap().pop_front();
        Ok(response.unwrap_or_else(|| panic!("no canned response for {endpoint:?}")))
    }
}

pub fn json_response(body: Value, cookies: &[(&str, &str)]) -> ApiResponse {
    ApiResponse {
        status: 200,
        content_type: Some("application/json; charset=utf-8".to_string()),
        cookies: cookies
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: serde_json::to_vec(&body).unwrap(),
    }
}

pub fn config(cookie_path: &Path) -> Config {
    Config::builder()
        .username("trader@example.com".to_string())
        .password("s3cret".to_string())
        .cookie_path(cookie_path)
        .build()
}

pub fn client(dir: &Path, transport: RecordingTransport) -> DspacClient<RecordingTransport> {
    DspacClient::with_transport(&config(&dir.join("creds").join("session.json")), transport)
}
