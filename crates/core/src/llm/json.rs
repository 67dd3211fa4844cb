use crate::domain::contract::LlmRecommendation;
use anyhow::Context;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.split_once('\n').map(|(_, rest)| rest) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_recommendation(text: &str) -> anyhow::Result<LlmRecommendation> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    serde_json::from_str::<LlmRecommendation>(&json_str)
        .with_context(|| format!("LLM output is not valid JSON for recommendation schema: {json_str}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::{Action, Sentiment};
    use serde_json::json;

    fn valid_json() -> String {
        json!({
            "symbol": "TCS",
            "recommendation": "HOLD",
            "confidence": 61.5,
            "targetPrice": 4100.0,
            "reasoning": "Deal wins offset by margin pressure.",
            "sentiment": "NEUTRAL",
            "keyFactors": ["Deal pipeline", "Attrition"]
        })
        .to_string()
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "Here you go: {\"a\":1} hope it helps";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn extract_json_rejects_text_without_object() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn parses_fenced_recommendation() {
        let text = format!("```json\n{}\n```", valid_json());
        let parsed = parse_recommendation(&text).unwrap();
        assert_eq!(parsed.recommendation, Action::Hold);
        assert_eq!(parsed.sentiment, Sentiment::Neutral);
        assert_eq!(parsed.key_factors.len(), 2);
    }

    #[test]
    fn rejects_missing_required_keys() {
        let text = json!({"symbol": "TCS", "recommendation": "BUY"}).to_string();
        assert!(parse_recommendation(&text).is_err());
    }
}
