//! Scripted generation client
//!
//! Replies are produced by a closure so each test decides how stages and the
//! scoring call answer. Every request is recorded for later assertions.

use mmps_common::config::TomlConfig;
use mmps_engine::generation::{GenerationClient, GenerationError, GenerationRequest};
use mmps_engine::settings::EngineSettings;
use std::sync::{Arc, Mutex};

type Responder = dyn Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync;

pub struct StubClient {
    responder: Box<Responder>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl StubClient {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request seen so far, in arrival order
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn scoring_requests(&self) -> Vec<GenerationRequest> {
        self.requests()
            .into_iter()
            .filter(is_scoring_request)
            .collect()
    }

    pub fn stage_requests(&self) -> Vec<GenerationRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !is_scoring_request(r))
            .collect()
    }
}

#[async_trait::async_trait]
impl GenerationClient for StubClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        // Let siblings interleave
        tokio::task::yield_now().await;
        (self.responder)(request)
    }
}

/// The comparative scoring prompt labels candidates "Response 1:", ...
pub fn is_scoring_request(request: &GenerationRequest) -> bool {
    request
        .conversation()
        .last_user_content()
        .map(|content| content.contains("Response 1:"))
        .unwrap_or(false)
}

/// Invert the default linear temperature schedule (0.3 + 0.2 * i)
pub fn instance_for_temperature(temperature: f32) -> usize {
    ((temperature - 0.3) / 0.2).round().max(0.0) as usize
}

/// Settings from an all-defaults config (3 instances, global summary scope)
pub fn default_settings() -> EngineSettings {
    EngineSettings::from_config(&TomlConfig::default()).unwrap()
}
