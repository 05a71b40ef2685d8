use crate::photo::EncodedImage;
use failure::{Error, ResultExt};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info};
use serde_json::{json, Map, Value};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    pub fields: Vec<SchemaField>,
}

impl OutputSchema {
    /// JSON Schema, as used by OpenAI's strict `json_schema` response format.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let ty = match field.kind {
                FieldKind::String => "string",
                FieldKind::Boolean => "boolean",
            };
            properties.insert(
                field.name.to_string(),
                json!({ "type": ty, "description": field.description }),
            );
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.field_names(),
            "additionalProperties": false,
        })
    }

    pub fn to_gemini_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let ty = match field.kind {
                FieldKind::String => "STRING",
                FieldKind::Boolean => "BOOLEAN",
            };
            properties.insert(
                field.name.to_string(),
                json!({ "type": ty, "description": field.description }),
            );
        }
        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": self.field_names(),
            "propertyOrdering": self.field_names(),
        })
    }

    fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredPrompt {
    pub name: &'static str,
    pub instruction: &'static str,
    pub schema: OutputSchema,
}

/// A remote model that can look at an image and answer with a JSON value
/// shaped like `prompt.schema`.
pub trait VisionModel: Send + Sync {
    fn classify_image<'a>(
        &'a self,
        image: &'a EncodedImage,
        prompt: &'a StructuredPrompt,
    ) -> BoxFuture<'a, Result<Value, Error>>;
}

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/";
pub const GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/";
pub const OPENAI_MODEL: &str = "gpt-4o";

pub struct GeminiModel {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: String,
}

impl GeminiModel {
    pub fn new(client: reqwest::Client, endpoint: Url, model: String, api_key: String) -> Self {
        GeminiModel {
            client,
            endpoint,
            model,
            api_key,
        }
    }

    async fn generate(
        &self,
        image: &EncodedImage,
        prompt: &StructuredPrompt,
    ) -> Result<Value, Error> {
        let url = self
            .endpoint
            .join(&format!("v1beta/models/{}:generateContent", self.model))?;
        info!("Asking {} for {}", self.model, prompt.name);
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt.instruction },
                    { "inlineData": { "mimeType": image.mime_type(), "data": image.to_base64() } }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": prompt.schema.to_gemini_schema(),
            }
        });
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Error sending request to Gemini")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Gemini returned {}: {}", status, text);
        }
        let json: Value = response.json().await.context("Gemini response is not JSON")?;
        debug!("Gemini response: {}", json);
        let text = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| format_err!("Missing text in Gemini response"))?;
        parse_structured_text(text)
    }
}

impl VisionModel for GeminiModel {
    fn classify_image<'a>(
        &'a self,
        image: &'a EncodedImage,
        prompt: &'a StructuredPrompt,
    ) -> BoxFuture<'a, Result<Value, Error>> {
        self.generate(image, prompt).boxed()
    }
}

pub struct OpenAiModel {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: String,
}

impl OpenAiModel {
    pub fn new(client: reqwest::Client, endpoint: Url, model: String, api_key: String) -> Self {
        OpenAiModel {
            client,
            endpoint,
            model,
            api_key,
        }
    }

    async fn complete(
        &self,
        image: &EncodedImage,
        prompt: &StructuredPrompt,
    ) -> Result<Value, Error> {
        let url = self.endpoint.join("v1/chat/completions")?;
        info!("Asking {} for {}", self.model, prompt.name);
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt.instruction },
                    { "type": "image_url", "image_url": { "url": image.to_data_uri() } }
                ]
            }],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": prompt.name,
                    "strict": true,
                    "schema": prompt.schema.to_json_schema(),
                }
            },
            "max_tokens": 256
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Error sending request to OpenAI")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("OpenAI returned {}: {}", status, text);
        }
        let json: Value = response.json().await.context("OpenAI response is not JSON")?;
        debug!("OpenAI response: {}", json);
        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| format_err!("Missing content in OpenAI response"))?;
        parse_structured_text(text)
    }
}

impl VisionModel for OpenAiModel {
    fn classify_image<'a>(
        &'a self,
        image: &'a EncodedImage,
        prompt: &'a StructuredPrompt,
    ) -> BoxFuture<'a, Result<Value, Error>> {
        self.complete(image, prompt).boxed()
    }
}

/// Models sometimes wrap JSON in a markdown fence or add chatter around it;
/// parse the outermost object.
fn parse_structured_text(text: &str) -> Result<Value, Error> {
    let json = extract_json(text);
    let value: Value = serde_json::from_str(json)
        .with_context(|_| format!("Model output is not JSON: {:?}", text))?;
    if !value.is_object() {
        bail!("Model output is not a JSON object: {}", value);
    }
    Ok(value)
}

fn extract_json(text: &str) -> &str {
    let text = text.trim();
    if text.starts_with("```") {
        if let (Some(start), Some(end)) = (text.find('\n'), text.rfind("```")) {
            if start < end {
                return text[start + 1..end].trim();
            }
        }
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}
