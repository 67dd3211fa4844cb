use crate::config::Settings;
use crate::domain::contract::LlmRecommendation;
use crate::domain::instrument::Instrument;
use crate::domain::recommendation::{Citation, RecommendationResult};
use crate::llm::error::{LlmDiagnosticsError, Stage};
use crate::llm::json;
use crate::llm::{LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const REPAIR_ATTEMPTS: u32 = 1;

const DEFAULT_SOURCE_TITLE: &str = "Source";
const DEFAULT_SOURCE_URI: &str = "#";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_gemini_api_key()?.to_string();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_output_tokens = std::env::var("GEMINI_MAX_OUTPUT_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);

        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_output_tokens,
        })
    }

    async fn generate_content(
        &self,
        req: &GenerateContentRequest,
    ) -> anyhow::Result<(serde_json::Value, GenerateContentResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(&self.api_key)?);

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(req)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(
                LlmDiagnosticsError::new(Provider::Gemini, Stage::Http, format!("status={status}"))
                    .with_raw_output(text)
                    .with_raw_json(raw_response_json)
                    .into(),
            );
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Gemini response JSON: {text}"))?;
        let parsed = serde_json::from_value::<GenerateContentResponse>(raw_json.clone())
            .context("failed to decode Gemini response into GenerateContentResponse")?;
        Ok((raw_json, parsed))
    }

    fn request(&self, prompt: String, max_output_tokens: u32) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            tools: vec![Tool {
                google_search: serde_json::json!({}),
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: Self::response_schema(),
                max_output_tokens,
            },
        }
    }

    fn response_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "OBJECT",
            "properties": {
                "symbol": {"type": "STRING"},
                "recommendation": {"type": "STRING", "enum": ["BUY", "SELL", "HOLD"]},
                "confidence": {"type": "NUMBER"},
                "targetPrice": {"type": "NUMBER"},
                "reasoning": {"type": "STRING"},
                "sentiment": {"type": "STRING", "enum": ["BULLISH", "BEARISH", "NEUTRAL"]},
                "keyFactors": {"type": "ARRAY", "items": {"type": "STRING"}}
            },
            "required": [
                "symbol", "recommendation", "confidence", "targetPrice",
                "reasoning", "sentiment", "keyFactors"
            ]
        })
    }

    fn user_prompt(instrument: &Instrument) -> String {
        format!(
            "Analyze the current performance and recent news for the NSE stock {} ({}).\n\
Current Price: \u{20b9}{}.\n\
Recent Change: {}%.\n\
Provide a detailed prediction including a recommendation (BUY/SELL/HOLD), confidence level (0-100), \
target price, and technical/fundamental reasoning.\n\
Also, check for recent news using Google Search.",
            instrument.symbol(),
            instrument.company_name,
            instrument.price,
            instrument.change_percent
        )
    }

    fn repair_prompt(previous_output: &str, instrument: &Instrument) -> String {
        format!(
            "Your previous message was NOT valid JSON for the required schema.\n\n\
TASK: Output ONLY a single JSON object for NSE stock {symbol}.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- Keys: symbol, recommendation, confidence, targetPrice, reasoning, sentiment, keyFactors.\n\
- recommendation is one of BUY, SELL, HOLD; sentiment is one of BULLISH, BEARISH, NEUTRAL.\n\
- confidence is a number in [0, 100]; targetPrice is a positive number in INR.\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}",
            symbol = instrument.symbol()
        )
    }

    fn response_text(res: &GenerateContentResponse) -> String {
        let mut out = String::new();
        let Some(candidate) = res.candidates.first() else {
            return out;
        };
        let Some(content) = &candidate.content else {
            return out;
        };
        for part in &content.parts {
            if let Some(text) = &part.text {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_sources(res: &GenerateContentResponse) -> Vec<Citation> {
        res.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|g| {
                g.grounding_chunks
                    .iter()
                    .map(|chunk| {
                        let web = chunk.web.as_ref();
                        Citation {
                            title: web
                                .and_then(|w| w.title.clone())
                                .unwrap_or_else(|| DEFAULT_SOURCE_TITLE.to_string()),
                            uri: web
                                .and_then(|w| w.uri.clone())
                                .unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string()),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn finish_reason(res: &GenerateContentResponse) -> Option<&str> {
        res.candidates.first().and_then(|c| c.finish_reason.as_deref())
    }

    async fn try_parse_with_repairs(
        &self,
        instrument: &Instrument,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> anyhow::Result<LlmRecommendation> {
        let first_err = match json::parse_recommendation(&initial_text) {
            Ok(parsed) => return Ok(parsed),
            Err(err) => err,
        };

        let mut last_err = first_err;
        let mut last_text = initial_text;
        let mut last_raw_json = initial_raw_json;

        for attempt in 1..=REPAIR_ATTEMPTS {
            let req = self.request(
                Self::repair_prompt(&last_text, instrument),
                self.max_output_tokens,
            );
            let (repair_raw_json, repair_res) = self.generate_content(&req).await?;
            let repair_text = Self::response_text(&repair_res);
            match json::parse_recommendation(&repair_text) {
                Ok(parsed) => return Ok(parsed),
                Err(err) => {
                    last_err = err;
                    last_text = repair_text;
                    last_raw_json = repair_raw_json;
                    tracing::warn!(
                        attempt,
                        symbol = instrument.symbol(),
                        error = %last_err,
                        "LLM output still invalid after repair attempt"
                    );
                }
            }
        }

        Err(
            LlmDiagnosticsError::new(Provider::Gemini, Stage::Parse, format!("final_error={last_err}"))
                .with_raw_output(last_text)
                .with_raw_json(Some(last_raw_json))
                .into(),
        )
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn recommend(&self, instrument: &Instrument) -> anyhow::Result<RecommendationResult> {
        let prompt = Self::user_prompt(instrument);
        let (mut raw_json, mut res) = self
            .generate_content(&self.request(prompt.clone(), self.max_output_tokens))
            .await?;

        // If the model ran out of output budget, retry once with a higher ceiling.
        if Self::finish_reason(&res) == Some("MAX_TOKENS") {
            let bumped = self.max_output_tokens.saturating_mul(2).max(4096);
            tracing::warn!(
                symbol = instrument.symbol(),
                from = self.max_output_tokens,
                to = bumped,
                "Gemini finishReason=MAX_TOKENS; retrying once with higher limit"
            );
            let (rj, r) = self.generate_content(&self.request(prompt, bumped)).await?;
            raw_json = rj;
            res = r;
        }

        let sources = Self::response_sources(&res);
        let text = Self::response_text(&res);
        if text.trim().is_empty() {
            return Err(LlmDiagnosticsError::new(
                Provider::Gemini,
                Stage::EmptyResponse,
                format!("finish_reason={:?}", Self::finish_reason(&res)),
            )
            .with_raw_json(Some(raw_json))
            .into());
        }

        let parsed = self.try_parse_with_repairs(instrument, text, raw_json).await?;
        parsed.validate_and_into_result(instrument, sources).map_err(|err| {
            anyhow::Error::from(LlmDiagnosticsError::new(
                Provider::Gemini,
                Stage::Contract,
                format!("{err:#}"),
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct WebChunk {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}
