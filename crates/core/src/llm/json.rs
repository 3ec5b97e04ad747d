use crate::domain::contract::{AngleAnalysis, LlmAngleAnalysis};
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

pub fn parse_analysis(text: &str) -> anyhow::Result<AngleAnalysis> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<LlmAngleAnalysis>(&json_str)
        .with_context(|| format!("LLM output is not valid JSON for the angle schema: {json_str}"))?;
    Ok(parsed.into_analysis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::creative::Angle;

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "Here you go: {\"a\":1} hope that helps";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_json("no json } here {"), None);
    }

    #[test]
    fn parse_analysis_accepts_prose_wrapped_json() {
        let text = r#"Sure! {"angle": "Before/After", "hook_type": "Transformation reveal", "tone": "Aspirational", "key_claim": "Clear skin in 14 days", "confidence": 0.85}"#;
        let a = parse_analysis(text).unwrap();
        assert_eq!(a.angle, Angle::BeforeAfter);
        assert_eq!(a.key_claim.as_deref(), Some("Clear skin in 14 days"));
        assert_eq!(a.confidence, Some(0.85));
    }

    #[test]
    fn parse_analysis_accepts_missing_optional_keys() {
        let a = parse_analysis(r#"{"angle": "UGC Style"}"#).unwrap();
        assert_eq!(a.angle, Angle::UgcStyle);
        assert_eq!(a.hook_type, None);
    }

    #[test]
    fn parse_analysis_rejects_missing_angle() {
        assert!(parse_analysis(r#"{"tone": "Urgent"}"#).is_err());
        assert!(parse_analysis("I cannot classify this.").is_err());
    }
}
