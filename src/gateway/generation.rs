use super::{GenerationConstraints, TextGenerationGateway};
use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
}

/// Response shapes tolerated from generation backends
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum GenerateResponse {
    Text { text: String },
    Completion { completion: String },
    Choices { choices: Vec<GenerateChoice> },
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateChoice {
    text: String,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        match self {
            GenerateResponse::Text { text } => Some(text),
            GenerateResponse::Completion { completion } => Some(completion),
            GenerateResponse::Choices { choices } => choices.into_iter().next().map(|c| c.text),
        }
    }
}

/// HTTP text-generation gateway client
pub struct HttpGenerationGateway {
    client: Client,
    base_url: Url,
    model_id: String,
    retries: usize,
}

impl HttpGenerationGateway {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url,
            model_id: config.model.clone(),
            retries: 1,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid generation gateway URL: {}", e)))
    }

    async fn send_with_retry(&self, request: reqwest::RequestBuilder) -> Result<GenerateResponse> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request.try_clone().ok_or_else(|| {
                Error::GenerationUnavailable("Failed to clone gateway request".to_string())
            })?;
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => {
                        return ok
                            .json::<GenerateResponse>()
                            .await
                            .map_err(|e| Error::GenerationUnavailable(e.to_string()))
                    }
                    Err(e) => last_err = Some(Error::GenerationUnavailable(e.to_string())),
                },
                Err(e) => last_err = Some(Error::GenerationUnavailable(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::GenerationUnavailable("Generation gateway request failed".to_string())
        }))
    }
}

#[async_trait]
impl TextGenerationGateway for HttpGenerationGateway {
    async fn generate(&self, prompt: &str, constraints: &GenerationConstraints) -> Result<String> {
        let url = self.endpoint("/v1/generate")?;
        let request = GenerateRequest {
            model: self.model_id.clone(),
            prompt: prompt.to_string(),
            max_tokens: constraints.max_tokens,
            temperature: constraints.temperature,
        };

        let parsed = self
            .send_with_retry(self.client.post(url).json(&request))
            .await?;

        parsed.into_text().ok_or_else(|| {
            Error::GenerationUnavailable("Generation gateway returned no completion".to_string())
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> GenerationConfig {
        GenerationConfig {
            url: url.to_string(),
            model: "test-gen".to_string(),
            max_tokens: 256,
            temperature: 0.0,
        }
    }

    fn constraints() -> GenerationConstraints {
        GenerationConstraints {
            max_tokens: 256,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_generate_text_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(body_partial_json(json!({"model": "test-gen"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"text": "hello there"})),
            )
            .mount(&server)
            .await;

        let gateway = HttpGenerationGateway::new(&config(&server.uri())).unwrap();
        let text = gateway.generate("hi", &constraints()).await.unwrap();

        assert_eq!(text, "hello there");
    }

    #[tokio::test]
    async fn test_generate_choices_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"text": "first"}, {"text": "second"}]
            })))
            .mount(&server)
            .await;

        let gateway = HttpGenerationGateway::new(&config(&server.uri())).unwrap();
        let text = gateway.generate("hi", &constraints()).await.unwrap();

        assert_eq!(text, "first");
    }

    #[tokio::test]
    async fn test_generate_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let gateway = HttpGenerationGateway::new(&config(&server.uri())).unwrap();
        let err = gateway.generate("hi", &constraints()).await.unwrap_err();

        assert!(matches!(err, Error::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_generate_empty_choices_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let gateway = HttpGenerationGateway::new(&config(&server.uri())).unwrap();
        let err = gateway.generate("hi", &constraints()).await.unwrap_err();

        assert!(matches!(err, Error::GenerationUnavailable(_)));
    }
}
