//! Generation backend boundary.
//!
//! The engine talks to the text/image capability through the
//! [`StoryGenerator`] trait so tests can substitute a scripted backend.
//! Narrative replies are surfaced as loose JSON on purpose: shape
//! violations must reach the turn engine intact, where the recovery policy
//! lives.

use crate::prompt::NarrativeRequest;
use async_trait::async_trait;
use gemini::{Gemini, Message, Request};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors crossing the generation boundary. The turn engine treats every
/// variant as a transport failure.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generation request failed: {0}")]
    RequestFailed(String),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

impl From<gemini::Error> for GeneratorError {
    fn from(err: gemini::Error) -> Self {
        GeneratorError::RequestFailed(err.to_string())
    }
}

/// Boundary to the external text/image generation capability.
#[async_trait]
pub trait StoryGenerator: Send + Sync {
    /// Produce the model's reply for an assembled narrative request, parsed
    /// as loose JSON. The shape is NOT validated here.
    async fn generate_narrative(
        &self,
        request: &NarrativeRequest,
    ) -> Result<Value, GeneratorError>;

    /// Produce an image reference (data URL) for an illustration prompt.
    async fn generate_illustration(&self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Production generator backed by the Gemini API.
pub struct GeminiGenerator {
    client: Gemini,
    temperature: f32,
    max_output_tokens: usize,
}

impl GeminiGenerator {
    pub fn new(client: Gemini) -> Self {
        Self {
            client,
            temperature: 0.8,
            max_output_tokens: 2048,
        }
    }

    /// Create a generator from the GEMINI_API_KEY environment variable.
    pub fn from_env() -> Result<Self, gemini::Error> {
        Ok(Self::new(Gemini::from_env()?))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

#[async_trait]
impl StoryGenerator for GeminiGenerator {
    async fn generate_narrative(
        &self,
        request: &NarrativeRequest,
    ) -> Result<Value, GeneratorError> {
        let api_request = Request::new(vec![Message::user(&request.prompt)])
            .with_system(&request.system)
            .with_temperature(self.temperature)
            .with_max_output_tokens(self.max_output_tokens)
            .with_json_response(true);

        let response = self.client.generate(api_request).await?;
        debug!(
            response_tokens = response.usage.response_tokens,
            "narrative reply received"
        );
        Ok(parse_loose_json(&response.text))
    }

    async fn generate_illustration(&self, prompt: &str) -> Result<String, GeneratorError> {
        let image = self.client.generate_image(prompt).await?;
        Ok(image.as_data_url())
    }
}

/// Parse model text as JSON, tolerating code fences and prose around the
/// object. Text that holds no JSON object at all comes back as a JSON
/// string, which the engine's shape validation then rejects in its usual
/// self-healing way.
fn parse_loose_json(text: &str) -> Value {
    if let Ok(value) = serde_json::from_str(text) {
        return value;
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                return value;
            }
        }
    }
    Value::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let value = parse_loose_json(r#"{"text": "Bonjour"}"#);
        assert_eq!(value["text"], "Bonjour");
    }

    #[test]
    fn test_parse_fenced_json() {
        let value = parse_loose_json("```json\n{\"text\": \"Bonjour\"}\n```");
        assert_eq!(value["text"], "Bonjour");
    }

    #[test]
    fn test_parse_json_with_prose_around() {
        let value = parse_loose_json("Voici ma réponse : {\"choices\": []} et voilà.");
        assert!(value["choices"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_unparsable_text_becomes_string() {
        let value = parse_loose_json("pas de JSON ici");
        assert_eq!(value, Value::String("pas de JSON ici".to_string()));
    }
}
