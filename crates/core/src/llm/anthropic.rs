use crate::config::Settings;
use crate::domain::contract::{AngleAnalysis, LlmAngleAnalysis};
use crate::domain::creative::Angle;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json;
use crate::llm::{AngleLabeler, CreativeText, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 500;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const TOOL_NAME_EMIT_ANGLE: &str = "emit_angle";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
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
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: &CreateMessageRequest,
        creative_id: &str,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                creative_id: creative_id.to_string(),
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn tools() -> Vec<Tool> {
        let labels: Vec<&str> = Angle::ALL.iter().map(|a| a.label()).collect();
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["angle", "hook_type", "tone", "key_claim", "confidence"],
            "properties": {
                "angle": {"type": "string", "enum": labels},
                "hook_type": {"type": "string"},
                "tone": {"type": "string"},
                "key_claim": {"type": "string"},
                "confidence": {"type": "number", "minimum": 0, "maximum": 1}
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_ANGLE,
            description: "Emit the marketing angle classification for one ad creative",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_ANGLE,
        }
    }

    fn system_prompt() -> String {
        let labels: Vec<&str> = Angle::ALL.iter().map(|a| a.label()).collect();
        [
            "You classify paid social ad creatives by their marketing angle.".to_string(),
            format!("Pick exactly ONE angle from: {}.", labels.join(", ")),
            "Use Other only when none of the listed angles fits.".to_string(),
            "Also report:".to_string(),
            "- hook_type: the technique used to grab attention in the first line or seconds".to_string(),
            "- tone: one word (e.g. Empathetic, Urgent, Aspirational, Educational, Humorous)".to_string(),
            "- key_claim: the main promise, in one sentence".to_string(),
            "- confidence: a number in [0, 1]".to_string(),
            "Return ONLY valid JSON with keys angle, hook_type, tone, key_claim, confidence.".to_string(),
        ]
        .join("\n")
    }

    fn user_content(creative: &CreativeText) -> Vec<InputBlock> {
        let mut blocks = Vec::with_capacity(2);
        if let Some(url) = &creative.image_url {
            blocks.push(InputBlock::Image {
                source: ImageSource::Url { url: url.clone() },
            });
        }

        let or_missing = |s: &str| {
            let s = s.trim();
            if s.is_empty() {
                "Not provided".to_string()
            } else {
                s.to_string()
            }
        };
        blocks.push(InputBlock::Text {
            text: format!(
                "Analyze this ad creative and categorize its marketing angle.\n\n\
Ad Copy (Primary Text): {}\nHeadline: {}",
                or_missing(&creative.primary_text),
                or_missing(&creative.headline),
            ),
        });
        blocks
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_analysis(
        res: &CreateMessageResponse,
    ) -> anyhow::Result<Option<LlmAngleAnalysis>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_ANGLE {
                    let parsed = serde_json::from_value::<LlmAngleAnalysis>(input.clone())
                        .context("failed to decode tool_use.input into LlmAngleAnalysis")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl AngleLabeler for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn classify(&self, creative: &CreativeText) -> anyhow::Result<AngleAnalysis> {
        let make_req = |max_tokens: u32| CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content: Self::user_content(creative),
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        };

        let (mut raw_json, mut res) = self
            .create_message(&make_req(self.max_tokens), &creative.creative_id)
            .await?;

        // If the model hit max_tokens, retry once with a higher ceiling.
        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2).max(1024);
            tracing::warn!(
                creative_id = %creative.creative_id,
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            let (rj, r) = self
                .create_message(&make_req(bumped), &creative.creative_id)
                .await?;
            raw_json = rj;
            res = r;
        }

        // Tool output path.
        if let Some(tool_analysis) = Self::response_tool_analysis(&res)? {
            return Ok(tool_analysis.into_analysis());
        }

        // Fallback to text (should be rare).
        let text = Self::response_text(&res);
        json::parse_analysis(&text).map_err(|err| {
            LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "parse",
                creative_id: creative.creative_id.clone(),
                detail: format!("{err:#}"),
                raw_output: Some(text),
                raw_response_json: Some(raw_json),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<InputBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum InputBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "image")]
    Image { source: ImageSource },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ImageSource {
    #[serde(rename = "url")]
    Url { url: String },
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn creative(image_url: Option<&str>) -> CreativeText {
        CreativeText {
            creative_id: "cr_1".to_string(),
            primary_text: "Tired of tangled cables?".to_string(),
            headline: String::new(),
            image_url: image_url.map(str::to_string),
        }
    }

    #[test]
    fn parses_tool_use_input() {
        let res: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": TOOL_NAME_EMIT_ANGLE,
                    "input": {
                        "angle": "Problem/Solution",
                        "hook_type": "Pain-point question",
                        "tone": "Empathetic",
                        "key_claim": "Never untangle a cable again",
                        "confidence": 0.92
                    }
                }
            ],
            "stop_reason": "tool_use"
        }))
        .unwrap();

        let parsed = AnthropicClient::response_tool_analysis(&res)
            .unwrap()
            .unwrap()
            .into_analysis();
        assert_eq!(parsed.angle, Angle::ProblemSolution);
        assert_eq!(parsed.tone.as_deref(), Some("Empathetic"));
        assert_eq!(AnthropicClient::response_text(&res), "");
    }

    #[test]
    fn text_blocks_are_joined_for_fallback_parsing() {
        let res: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "```json"},
                {"type": "text", "text": "{\"angle\": \"Social Proof\"}\n```"}
            ]
        }))
        .unwrap();
        assert!(AnthropicClient::response_tool_analysis(&res).unwrap().is_none());
        let text = AnthropicClient::response_text(&res);
        let parsed = json::parse_analysis(&text).unwrap();
        assert_eq!(parsed.angle, Angle::SocialProof);
    }

    #[test]
    fn request_includes_image_block_when_available() {
        let req = CreateMessageRequest {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: None,
            messages: vec![Message {
                role: "user",
                content: AnthropicClient::user_content(&creative(Some("https://cdn.test/a.jpg"))),
            }],
            tools: Some(AnthropicClient::tools()),
            tool_choice: Some(AnthropicClient::tool_choice()),
        };
        let v = serde_json::to_value(&req).unwrap();

        assert_eq!(v["messages"][0]["content"][0]["type"], "image");
        assert_eq!(v["messages"][0]["content"][0]["source"]["type"], "url");
        assert_eq!(v["messages"][0]["content"][1]["type"], "text");
        assert_eq!(v["tool_choice"], json!({"type": "tool", "name": TOOL_NAME_EMIT_ANGLE}));
        assert_eq!(v["tools"][0]["input_schema"]["properties"]["angle"]["enum"][1], "UGC Style");
        assert!(v.get("system").is_none());
    }

    #[test]
    fn text_only_creatives_mark_missing_fields() {
        let blocks = AnthropicClient::user_content(&creative(None));
        assert_eq!(blocks.len(), 1);
        let v = serde_json::to_value(&blocks[0]).unwrap();
        let text = v["text"].as_str().unwrap();
        assert!(text.contains("Tired of tangled cables?"));
        assert!(text.contains("Headline: Not provided"));
    }

    #[test]
    fn system_prompt_lists_every_angle() {
        let prompt = AnthropicClient::system_prompt();
        for angle in Angle::ALL {
            assert!(prompt.contains(angle.label()));
        }
    }
}
