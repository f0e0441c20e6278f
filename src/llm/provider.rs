use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use crate::config::{JudgeConfig, JudgeProviderType};
use crate::error::Error;

/// A photo ready to inline into a judge request.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Base64 of the JPEG bytes.
    pub data: String,
    pub media_type: &'static str,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// One verification question for the judge.
#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub system_prompt: &'a str,
    pub prompt: &'a str,
    pub image: &'a EncodedImage,
}

/// A multimodal model that answers a text prompt about one image.
pub trait VisionJudge: Send + Sync {
    /// Send the request and return the model's free-text reply.
    fn judge(&self, api_key: &str, request: &JudgeRequest<'_>) -> Result<String>;

    /// Get the provider name for display
    fn provider_name(&self) -> &'static str;
}

fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

fn describe_ureq_error(context: &str, err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            anyhow!("{} returned HTTP {}: {}", context, code, body.trim())
        }
        other => anyhow!("{} request failed: {}", context, other),
    }
}

// ============================================================================
// OpenAI-compatible provider (works with OpenAI and compatible APIs)
// ============================================================================

pub struct OpenAICompatibleProvider {
    endpoint: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: Vec<OpenAIContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum OpenAIContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

impl OpenAICompatibleProvider {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: 120,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl VisionJudge for OpenAICompatibleProvider {
    fn judge(&self, api_key: &str, request: &JudgeRequest<'_>) -> Result<String> {
        let body = OpenAIChatRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: vec![OpenAIContentPart::Text {
                        text: request.system_prompt.to_string(),
                    }],
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: vec![
                        OpenAIContentPart::Text {
                            text: request.prompt.to_string(),
                        },
                        OpenAIContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: request.image.data_url(),
                                detail: "low".to_string(),
                            },
                        },
                    ],
                },
            ],
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.endpoint);

        let response = http_agent(self.timeout)
            .post(&url)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {}", api_key))
            .send_json(&body)
            .map_err(|e| describe_ureq_error("Vision judge", e))?;

        let chat_response: OpenAIChatResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse judge response: {}", e))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| anyhow!("No response from judge"))
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI-compatible"
    }
}

// ============================================================================
// Anthropic Claude provider
// ============================================================================

pub struct AnthropicProvider {
    endpoint: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum AnthropicContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Serialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseContent {
    text: Option<String>,
}

impl AnthropicProvider {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.anthropic.com/v1";

    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: 120,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl VisionJudge for AnthropicProvider {
    fn judge(&self, api_key: &str, request: &JudgeRequest<'_>) -> Result<String> {
        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: request.system_prompt.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: vec![
                    AnthropicContent::Image {
                        source: AnthropicImageSource {
                            source_type: "base64".to_string(),
                            media_type: request.image.media_type.to_string(),
                            data: request.image.data.clone(),
                        },
                    },
                    AnthropicContent::Text {
                        text: request.prompt.to_string(),
                    },
                ],
            }],
        };

        let url = format!("{}/messages", self.endpoint);

        let response = http_agent(self.timeout)
            .post(&url)
            .set("Content-Type", "application/json")
            .set("x-api-key", api_key)
            .set("anthropic-version", "2023-06-01")
            .send_json(&body)
            .map_err(|e| describe_ureq_error("Anthropic", e))?;

        let anthropic_response: AnthropicResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse Anthropic response: {}", e))?;

        anthropic_response
            .content
            .into_iter()
            .find_map(|c| c.text)
            .ok_or_else(|| anyhow!("No response from Anthropic"))
    }

    fn provider_name(&self) -> &'static str {
        "Anthropic Claude"
    }
}

// ============================================================================
// Image encoding
// ============================================================================

/// Load a photo, downscale it so neither side exceeds `max_dimension`,
/// re-encode as JPEG and base64 the result.
pub fn encode_image(image_path: &Path, max_dimension: u32) -> Result<EncodedImage, Error> {
    let img = image::open(image_path).map_err(|e| {
        Error::ImageProcessing(format!("failed to open {}: {}", image_path.display(), e))
    })?;

    let (width, height) = img.dimensions();
    let img = if width > max_dimension || height > max_dimension {
        img.resize(
            max_dimension,
            max_dimension,
            image::imageops::FilterType::Triangle,
        )
    } else {
        img
    };

    // JPEG has no alpha channel.
    let img = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, 85);
    img.write_with_encoder(encoder)
        .map_err(|e| Error::ImageProcessing(format!("failed to encode JPEG: {}", e)))?;

    Ok(EncodedImage {
        data: BASE64.encode(buf.into_inner()),
        media_type: "image/jpeg",
    })
}

// ============================================================================
// Factory function
// ============================================================================

/// Create a vision judge based on configuration
pub fn create_judge(config: &JudgeConfig) -> Box<dyn VisionJudge> {
    let timeout = Duration::from_secs(config.timeout_secs);

    match config.provider {
        JudgeProviderType::OpenAI => Box::new(
            OpenAICompatibleProvider::new(
                config
                    .endpoint
                    .as_deref()
                    .unwrap_or(OpenAICompatibleProvider::DEFAULT_ENDPOINT),
                &config.model,
            )
            .with_max_tokens(config.max_tokens)
            .with_timeout(timeout),
        ),
        JudgeProviderType::Anthropic => Box::new(
            AnthropicProvider::new(
                config
                    .endpoint
                    .as_deref()
                    .unwrap_or(AnthropicProvider::DEFAULT_ENDPOINT),
                &config.model,
            )
            .with_max_tokens(config.max_tokens)
            .with_timeout(timeout),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::{ImageBuffer, Rgba};
    use mockito::Matcher;
    use serde_json::json;
    use tempfile::tempdir;

    const KEY: &str = "sk-test-0123456789abcdef";

    fn sample_image() -> EncodedImage {
        EncodedImage {
            data: "aGVsbG8=".to_string(),
            media_type: "image/jpeg",
        }
    }

    #[test]
    fn test_encode_image_downscales_and_flattens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.png");
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(2000, 1000, Rgba([200, 120, 40, 128]));
        img.save(&path).unwrap();

        let encoded = encode_image(&path, 1024).unwrap();
        assert_eq!(encoded.media_type, "image/jpeg");
        assert!(encoded.data_url().starts_with("data:image/jpeg;base64,"));

        let bytes = BASE64.decode(&encoded.data).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (1024, 512));
    }

    #[test]
    fn test_encode_image_rejects_non_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = encode_image(&path, 1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImageProcessing);

        let err = encode_image(&dir.path().join("missing.jpg"), 1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImageProcessing);
    }

    #[test]
    fn test_openai_provider_request_and_reply() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", format!("Bearer {}", KEY).as_str())
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "max_tokens": 120
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"YES\nConfidence: 88%\nAn open book."}}]}"#)
            .create();

        let provider = OpenAICompatibleProvider::new(&server.url(), "gpt-4o-mini");
        let image = sample_image();
        let reply = provider
            .judge(
                KEY,
                &JudgeRequest {
                    system_prompt: "system",
                    prompt: "Did the user perform this activity: reading?",
                    image: &image,
                },
            )
            .unwrap();

        assert_eq!(reply, "YES\nConfidence: 88%\nAn open book.");
        mock.assert();
    }

    #[test]
    fn test_openai_provider_surfaces_http_errors() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid api key")
            .create();

        let provider = OpenAICompatibleProvider::new(&server.url(), "gpt-4o-mini");
        let image = sample_image();
        let err = provider
            .judge(
                KEY,
                &JudgeRequest {
                    system_prompt: "system",
                    prompt: "prompt",
                    image: &image,
                },
            )
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("401"), "{}", message);
        assert!(message.contains("invalid api key"), "{}", message);
        mock.assert();
    }

    #[test]
    fn test_anthropic_provider_request_and_reply() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", KEY)
            .match_header("anthropic-version", "2023-06-01")
            .match_body(Matcher::PartialJson(json!({
                "system": "system",
                "max_tokens": 50
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":[{"type":"text","text":"NO\nConfidence: 30%\nBlurry."}]}"#)
            .create();

        let provider =
            AnthropicProvider::new(&server.url(), "claude-sonnet-4-20250514").with_max_tokens(50);
        let image = sample_image();
        let reply = provider
            .judge(
                KEY,
                &JudgeRequest {
                    system_prompt: "system",
                    prompt: "prompt",
                    image: &image,
                },
            )
            .unwrap();

        assert_eq!(reply, "NO\nConfidence: 30%\nBlurry.");
        mock.assert();
    }

    #[test]
    fn test_create_judge_picks_provider() {
        let mut config = JudgeConfig::default();
        assert_eq!(create_judge(&config).provider_name(), "OpenAI-compatible");

        config.provider = JudgeProviderType::Anthropic;
        assert_eq!(create_judge(&config).provider_name(), "Anthropic Claude");
    }
}
