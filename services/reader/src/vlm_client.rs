//! VLM (Vision-Language Model) Client
//!
//! Talks to an OpenAI-compatible chat-completions endpoint for the three
//! model-backed steps of the reader: page-marked OCR, highlight phrase
//! extraction and document chat.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use studylens_models::{ChatMessage, ChatRole, HighlightPhrase};
use studylens_utils::{AiConfig, StudyError, StudyResult};

const SERVICE: &str = "vlm";

/// Turns an uploaded file into one text blob with a marker line per page.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract_text(&self, file_name: &str, content_type: &str, data: &[u8]) -> StudyResult<String>;
}

/// Picks phrases worth highlighting and answers questions about a document.
#[async_trait]
pub trait StudyAssistant: Send + Sync {
    async fn extract_highlights(&self, page_text: &str, instruction: &str) -> StudyResult<Vec<HighlightPhrase>>;

    async fn answer(&self, context: &str, question: &str, history: &[ChatMessage]) -> StudyResult<String>;
}

pub struct VlmClient {
    client: Client,
    config: AiConfig,
    page_label: String,
}

impl VlmClient {
    pub fn new(config: &AiConfig, page_label: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            page_label: page_label.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'))
    }

    async fn complete(&self, model: &str, messages: Vec<VlmMessage>) -> StudyResult<String> {
        let request = VlmRequest {
            model: model.to_string(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StudyError::external_service(SERVICE, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(StudyError::external_service(
                SERVICE,
                format!("API error {}: {}", status, error_text),
            ));
        }

        let result: VlmResponse = response
            .json()
            .await
            .map_err(|e| StudyError::external_service(SERVICE, format!("invalid response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| StudyError::external_service(SERVICE, "No response content"))
    }
}

#[async_trait]
impl OcrEngine for VlmClient {
    async fn extract_text(&self, file_name: &str, content_type: &str, data: &[u8]) -> StudyResult<String> {
        let encoded = BASE64.encode(data);
        let attachment = if content_type == "application/pdf" {
            VlmContent::File {
                file: FileData {
                    filename: file_name.to_string(),
                    file_data: format!("data:application/pdf;base64,{}", encoded),
                },
            }
        } else {
            VlmContent::Image {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", content_type, encoded),
                },
            }
        };

        let messages = vec![
            VlmMessage::text("system", ocr_prompt(&self.page_label)),
            VlmMessage {
                role: "user".to_string(),
                content: vec![
                    attachment,
                    VlmContent::Text {
                        text: format!("Transcribe every page of {}.", file_name),
                    },
                ],
            },
        ];

        tracing::info!(file_name, content_type, bytes = data.len(), "Requesting OCR");
        let text = self.complete(&self.config.ocr_model, messages).await?;
        Ok(strip_code_fence(&text).to_string())
    }
}

#[async_trait]
impl StudyAssistant for VlmClient {
    async fn extract_highlights(&self, page_text: &str, instruction: &str) -> StudyResult<Vec<HighlightPhrase>> {
        let messages = vec![
            VlmMessage::text("system", HIGHLIGHT_PROMPT.to_string()),
            VlmMessage::text(
                "user",
                format!("Instruction: {}\n\nPage text:\n{}", instruction, page_text),
            ),
        ];

        let content = self.complete(&self.config.chat_model, messages).await?;
        parse_highlight_response(&content)
    }

    async fn answer(&self, context: &str, question: &str, history: &[ChatMessage]) -> StudyResult<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(VlmMessage::text(
            "system",
            format!("{}\n\nDocument text:\n{}", CHAT_PROMPT, context),
        ));
        for turn in history {
            let role = match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            messages.push(VlmMessage::text(role, turn.content.clone()));
        }
        messages.push(VlmMessage::text("user", question.to_string()));

        self.complete(&self.config.chat_model, messages).await
    }
}

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n(.*?)\n?\s*```\s*$").expect("static code fence pattern")
});

/// Removes a surrounding Markdown code fence, if any.
fn strip_code_fence(content: &str) -> &str {
    match CODE_FENCE.captures(content).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str(),
        None => content.trim(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HighlightPayload {
    List(Vec<HighlightPhrase>),
    Wrapped { highlights: Vec<HighlightPhrase> },
}

/// Parses the assistant's highlight answer: a JSON array of
/// `{"text", "type"}` objects, optionally fenced or wrapped in
/// `{"highlights": [...]}`. Phrases are sanitized before they are returned.
pub fn parse_highlight_response(content: &str) -> StudyResult<Vec<HighlightPhrase>> {
    let body = strip_code_fence(content);

    let payload = serde_json::from_str::<HighlightPayload>(body).or_else(|first_error| {
        // Fall back to the outermost array when the model added prose around it
        match (body.find('['), body.rfind(']')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str::<HighlightPayload>(&body[start..=end])
            }
            _ => Err(first_error),
        }
    });

    let phrases = match payload {
        Ok(HighlightPayload::List(phrases)) => phrases,
        Ok(HighlightPayload::Wrapped { highlights }) => highlights,
        Err(e) => {
            return Err(StudyError::external_service(
                SERVICE,
                format!("unparseable highlight response: {}", e),
            ))
        }
    };

    Ok(HighlightPhrase::sanitize(phrases))
}

fn ocr_prompt(page_label: &str) -> String {
    format!(
        r#"You are an OCR engine for study material. Transcribe the text of every page exactly as written, in the original language and script. Keep line breaks. Do not summarize, translate or correct anything.

Start each page with a marker line of the form:
===== {label} N =====
where N is the 1-based page number. Emit one marker per page, even when the page is blank. Return only the transcription."#,
        label = page_label
    )
}

const HIGHLIGHT_PROMPT: &str = r#"
You help students study by highlighting a page. Follow the user's instruction and pick phrases from the page text.

Every phrase MUST be copied verbatim from the page text. Use short phrases, not whole paragraphs.

Return a JSON array:
[
  {"text": "exact phrase from the page", "type": "key" | "main" | "detail"}
]

Types:
- key: critical terms, numbers and qualifiers
- main: the central idea of a passage
- detail: supporting details and examples

Return ONLY valid JSON, no additional text.
"#;

const CHAT_PROMPT: &str = "You are a study assistant. Answer questions using the document text below. \
Reply in the language of the question. If the answer is not in the text, say so.";

/// VLM API request
#[derive(Debug, Serialize)]
struct VlmRequest {
    model: String,
    messages: Vec<VlmMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct VlmMessage {
    role: String,
    content: Vec<VlmContent>,
}

impl VlmMessage {
    fn text(role: &str, text: String) -> Self {
        Self {
            role: role.to_string(),
            content: vec![VlmContent::Text { text }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum VlmContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    Image { image_url: ImageUrl },
    #[serde(rename = "file")]
    File { file: FileData },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct FileData {
    filename: String,
    file_data: String,
}

/// VLM API response
#[derive(Debug, Deserialize)]
struct VlmResponse {
    choices: Vec<VlmChoice>,
}

#[derive(Debug, Deserialize)]
struct VlmChoice {
    message: VlmChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct VlmChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use studylens_models::HighlightCategory;

    #[test]
    fn test_parse_plain_array() {
        let phrases = parse_highlight_response(
            r#"[{"text": "osmosis", "type": "key"}, {"text": "water moves", "type": "main"}]"#,
        )
        .unwrap();
        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[1].category, HighlightCategory::Main);
    }

    #[test]
    fn test_parse_fenced_and_wrapped() {
        let content = "```json\n{\"highlights\": [{\"text\": \"B12\", \"type\": \"details\"}]}\n```";
        let phrases = parse_highlight_response(content).unwrap();
        assert_eq!(phrases, vec![HighlightPhrase::new("B12", HighlightCategory::Detail)]);
    }

    #[test]
    fn test_parse_array_inside_prose() {
        let content = "Here you go:\n[{\"text\": \"ATP\"}, {\"text\": \"  \"}, {\"text\": \"ATP\", \"type\": \"main\"}]\nGood luck!";
        let phrases = parse_highlight_response(content).unwrap();
        assert_eq!(phrases, vec![HighlightPhrase::new("ATP", HighlightCategory::Key)]);
    }

    #[test]
    fn test_parse_garbage_is_external_service_error() {
        let error = parse_highlight_response("I cannot help with that.").unwrap_err();
        assert_eq!(error.error_code(), "EXTERNAL_SERVICE_ERROR");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```\n===== Page 1 =====\nhi\n```"), "===== Page 1 =====\nhi");
        assert_eq!(strip_code_fence("  plain text \n"), "plain text");
    }

    #[test]
    fn test_ocr_prompt_uses_label() {
        assert!(ocr_prompt("صفحه").contains("===== صفحه N ====="));
    }

    #[test]
    fn test_content_parts_serialize_with_type_tag() {
        let part = VlmContent::File {
            file: FileData {
                filename: "a.pdf".to_string(),
                file_data: "data:application/pdf;base64,AAAA".to_string(),
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["file"]["filename"], "a.pdf");
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = AiConfig {
            api_url: "http://localhost:9000/v1/".to_string(),
            ..AiConfig::default()
        };
        let client = VlmClient::new(&config, "Page").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/chat/completions");
    }
}
