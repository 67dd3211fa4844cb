use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// Where a recommendation call gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Non-2xx reply from the model endpoint.
    Http,
    /// 2xx reply without any candidate text.
    EmptyResponse,
    /// Text that still did not decode after the repair round.
    Parse,
    /// Decoded, but out of range (confidence, target price, reasoning).
    Contract,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Http => "http",
            Stage::EmptyResponse => "empty_response",
            Stage::Parse => "parse_after_repair",
            Stage::Contract => "contract",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommendation failure with whatever the model sent back, kept for logs.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: Stage,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    pub fn new(provider: Provider, stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            provider,
            stage,
            detail: detail.into(),
            raw_output: None,
            raw_response_json: None,
        }
    }

    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        self.raw_output = Some(raw.into());
        self
    }

    pub fn with_raw_json(mut self, raw: Option<Value>) -> Self {
        self.raw_response_json = raw;
        self
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} recommendation failed at {}: {}", self.provider, self.stage, self.detail)
    }
}

impl std::error::Error for LlmDiagnosticsError {}
