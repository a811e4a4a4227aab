use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::SdkError;
use aws_sdk_bedrockruntime::operation::invoke_model::InvokeModelError;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_smithy_types::Blob;
use serde::{Deserialize, Serialize};

use super::{RevisionCallError, RevisionModel};

/// Generative-language client backed by the Bedrock runtime `invoke_model` API
pub struct BedrockModel {
    client: BedrockClient,
    max_tokens: u32,
}

/// Anthropic-messages request body for `invoke_model`
#[derive(Debug, Serialize)]
struct ModelRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<ModelMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ModelMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModelResponse {
    content: Vec<ModelContent>,
}

#[derive(Debug, Deserialize)]
struct ModelContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

impl BedrockModel {
    pub fn new(client: BedrockClient, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    fn request_body(&self, prompt: &str) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&ModelRequest {
            anthropic_version: "bedrock-2023-05-31",
            max_tokens: self.max_tokens,
            temperature: 0.0,
            system: super::prompt::SYSTEM_PROMPT,
            messages: vec![ModelMessage {
                role: "user",
                content: prompt,
            }],
        })
    }
}

#[async_trait]
impl RevisionModel for BedrockModel {
    async fn invoke(&self, model_id: &str, prompt: &str) -> Result<String, RevisionCallError> {
        let body = self
            .request_body(prompt)
            .map_err(|e| RevisionCallError::Permanent(format!("Failed to serialize request: {}", e)))?;

        let output = self
            .client
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let response: ModelResponse = serde_json::from_slice(output.body().as_ref())
            .map_err(|e| RevisionCallError::Permanent(format!("Failed to parse model response: {}", e)))?;

        let text = response
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .collect::<String>();

        Ok(text)
    }
}

/// Split service failures into transient (retryable) and permanent classes.
///
/// Throttling, model timeouts, model warm-up, quota pressure, and transport
/// failures are worth retrying; validation and access errors are not.
fn classify_sdk_error(err: SdkError<InvokeModelError>) -> RevisionCallError {
    let transient = match &err {
        SdkError::ServiceError(ctx) => {
            let service_err = ctx.err();
            service_err.is_throttling_exception()
                || service_err.is_model_timeout_exception()
                || service_err.is_model_not_ready_exception()
                || service_err.is_service_quota_exceeded_exception()
                || service_err.is_internal_server_exception()
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        _ => false,
    };

    let message = match &err {
        SdkError::ServiceError(ctx) => ctx.err().to_string(),
        other => other.to_string(),
    };

    if transient {
        RevisionCallError::Transient(message)
    } else {
        RevisionCallError::Permanent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = ModelRequest {
            anthropic_version: "bedrock-2023-05-31",
            max_tokens: 4000,
            temperature: 0.0,
            system: "system prompt",
            messages: vec![ModelMessage {
                role: "user",
                content: "revise this",
            }],
        };

        let json: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(json["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(json["max_tokens"], 4000);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "revise this");
    }

    #[test]
    fn test_response_text_extraction_skips_non_text_blocks() {
        let payload = r#"{
            "content": [
                {"type": "thinking", "text": ""},
                {"type": "text", "text": "<result>Bonjour</result>"}
            ]
        }"#;

        let response: ModelResponse = serde_json::from_str(payload).unwrap();
        let text = response
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .collect::<String>();
        assert_eq!(text, "<result>Bonjour</result>");
    }
}
