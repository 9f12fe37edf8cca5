use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::prompts::{character_prompt, panel_prompt, script_prompt};
use super::schema::script_response_schema;
use crate::core::config::Config;
use crate::core::errors::{ApiError, ApiResult, Stage};
use crate::core::types::{CharacterProfile, MangaDocument, MangaStyle};
use crate::middleware::api_key_pool::{ApiKeyPool, KeyStats};
use crate::middleware::circuit_breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::services::backend::MangaBackend;
use crate::utils::{decode_image_payload, image_mime_type, Metrics};

/// Gemini / Imagen REST client with key pool, circuit breaker and metrics
pub struct ApiClient {
    config: Arc<Config>,
    api_key_pool: Arc<ApiKeyPool>,
    http_client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Metrics>,
}

impl ApiClient {
    pub fn new(
        config: Arc<Config>,
        circuit_breaker: Option<CircuitBreaker>,
        metrics: Option<Metrics>,
    ) -> ApiResult<Self> {
        let api_key_pool = Arc::new(ApiKeyPool::new(config.api_keys().to_vec()));

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            config,
            api_key_pool,
            http_client,
            circuit_breaker: circuit_breaker.unwrap_or_default(),
            metrics,
        })
    }

    pub async fn key_stats(&self) -> Vec<KeyStats> {
        self.api_key_pool.stats().await
    }

    /// (healthy, total) key counts
    pub async fn key_counts(&self) -> (usize, usize) {
        (
            self.api_key_pool.healthy_count().await,
            self.api_key_pool.total_keys().await,
        )
    }

    pub fn circuit_stats(&self) -> CircuitBreakerStats {
        self.circuit_breaker.stats()
    }

    /// One remote call: breaker check, key selection, send, bookkeeping.
    async fn call(&self, stage: Stage, model: &str, method: &str, body: &Value) -> ApiResult<Value> {
        if !self.circuit_breaker.allow_request() {
            warn!("Circuit breaker is open, failing fast");
            return Err(ApiError::CircuitOpen);
        }

        let (key_idx, api_key) = self
            .api_key_pool
            .get_healthy_key()
            .await
            .ok_or(ApiError::NoApiKeys)?;

        let url = format!("{}/models/{}:{}", self.config.base_url(), model, method);
        let start = Instant::now();

        let result = self.send_with_retries(&url, &api_key, body).await.and_then(|text| {
            serde_json::from_str::<Value>(&text).map_err(ApiError::from)
        });
        let duration = start.elapsed();

        match result {
            Ok(response) => {
                self.circuit_breaker.record_success();
                self.api_key_pool.record_success(key_idx).await;

                let (input_tokens, output_tokens) = extract_token_usage(&response);
                if let Some(ref m) = self.metrics {
                    m.record_api_call(stage, true, duration, input_tokens, output_tokens);
                }
                debug!(
                    "{} call to {} succeeded in {:.2}s ({} in / {} out tokens)",
                    stage,
                    model,
                    duration.as_secs_f64(),
                    input_tokens,
                    output_tokens
                );
                Ok(response)
            }
            Err(e) => {
                // Only transient failures count against the key and the breaker
                if e.is_transient() {
                    self.circuit_breaker.record_failure();
                    self.api_key_pool.record_failure(key_idx).await;
                }
                if let Some(ref m) = self.metrics {
                    m.record_api_call(stage, false, duration, 0, 0);
                }
                warn!(
                    "{} call to {} failed with key {} (transient={}): {}",
                    stage,
                    model,
                    key_idx,
                    e.is_transient(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Send HTTP request, retrying transient failures up to `max_retries` times
    async fn send_with_retries(&self, url: &str, api_key: &str, body: &Value) -> ApiResult<String> {
        let max_retries = self.config.max_retries();
        let mut attempt = 0;

        loop {
            let outcome = match self
                .http_client
                .post(url)
                .header("x-goog-api-key", api_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.text().await?);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    ApiError::Status { status, body }
                }
                Err(e) => ApiError::Http(e),
            };

            if attempt >= max_retries || !outcome.is_transient() {
                return Err(outcome);
            }

            let delay = retry_delay(attempt, &outcome);
            debug!(
                "Request failed: {}. Retrying in {}ms ({}/{})",
                outcome,
                delay.as_millis(),
                attempt + 1,
                max_retries
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl MangaBackend for ApiClient {
    #[instrument(skip(self, premise), fields(model = self.config.script_model()))]
    async fn generate_script(
        &self,
        premise: &str,
        style: MangaStyle,
        page_count: u32,
    ) -> ApiResult<MangaDocument> {
        let request_body = serde_json::json!({
            "contents": [{
                "parts": [{ "text": script_prompt(premise, style, page_count) }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": script_response_schema()
            }
        });

        let response = self
            .call(Stage::Script, self.config.script_model(), "generateContent", &request_body)
            .await?;
        parse_script_response(&response)
    }

    #[instrument(skip(self, description), fields(model = self.config.character_image_model()))]
    async fn generate_character_image(
        &self,
        description: &str,
        style: MangaStyle,
    ) -> ApiResult<String> {
        let request_body = serde_json::json!({
            "instances": [{ "prompt": character_prompt(description, style) }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": "3:4",
                "outputOptions": { "mimeType": "image/png" }
            }
        });

        let response = self
            .call(
                Stage::CharacterImage,
                self.config.character_image_model(),
                "predict",
                &request_body,
            )
            .await?;
        extract_prediction_image(&response)
    }

    #[instrument(skip(self, description, characters), fields(model = self.config.panel_image_model(), characters = characters.len()))]
    async fn generate_panel_image(
        &self,
        description: &str,
        characters: &[CharacterProfile],
        style: MangaStyle,
    ) -> ApiResult<String> {
        let mut parts = vec![serde_json::json!({ "text": panel_prompt(description, characters, style) })];
        parts.extend(
            characters
                .iter()
                .filter_map(|c| c.reference_image.as_deref())
                .map(reference_image_part),
        );

        let request_body = serde_json::json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"]
            }
        });

        let response = self
            .call(
                Stage::PanelImage,
                self.config.panel_image_model(),
                "generateContent",
                &request_body,
            )
            .await?;
        extract_first_inline_image(&response)
    }
}

/// Parse the JSON script carried in the first text part of a generateContent response.
///
/// Parsing is strict: malformed or schema-violating JSON is an error.
pub fn parse_script_response(response: &Value) -> ApiResult<MangaDocument> {
    let text = response_parts(response)
        .iter()
        .find_map(|part| part["text"].as_str())
        .ok_or_else(|| ApiError::InvalidResponse("script response has no text part".to_string()))?;

    let mut document: MangaDocument = serde_json::from_str(text.trim())?;

    // Images only arrive through the illustration calls
    for character in &mut document.characters {
        character.reference_image = None;
    }
    for panel in document.pages.iter_mut().flat_map(|p| p.panels.iter_mut()) {
        panel.image_url = None;
    }

    Ok(document)
}

/// First image payload among the response parts; text parts are skipped
pub fn extract_first_inline_image(response: &Value) -> ApiResult<String> {
    response_parts(response)
        .iter()
        .filter_map(|part| part.get("inlineData").or_else(|| part.get("inline_data")))
        .filter(|inline| {
            inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .map(|mime| mime.starts_with("image/"))
                .unwrap_or(true)
        })
        .find_map(|inline| inline["data"].as_str())
        .map(str::to_string)
        .ok_or(ApiError::NoImage("panel"))
}

/// Image bytes from an Imagen `predict` response
pub fn extract_prediction_image(response: &Value) -> ApiResult<String> {
    response["predictions"]
        .as_array()
        .and_then(|predictions| {
            predictions
                .iter()
                .find_map(|p| p["bytesBase64Encoded"].as_str())
        })
        .map(str::to_string)
        .ok_or(ApiError::NoImage("character"))
}

/// Inline request part for a character reference sheet
fn reference_image_part(image: &str) -> Value {
    let mime_type = decode_image_payload(image)
        .map(|bytes| image_mime_type(&bytes))
        .unwrap_or("image/png");
    serde_json::json!({
        "inline_data": {
            "mime_type": mime_type,
            "data": image
        }
    })
}

fn response_parts(response: &Value) -> &[Value] {
    response["candidates"][0]["content"]["parts"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Extract (input_tokens, output_tokens) from usageMetadata, (0, 0) if absent
fn extract_token_usage(response: &Value) -> (u64, u64) {
    let usage_metadata = &response["usageMetadata"];
    let input_tokens = usage_metadata["promptTokenCount"].as_u64().unwrap_or(0);
    let output_tokens = usage_metadata["candidatesTokenCount"].as_u64().unwrap_or(0);
    (input_tokens, output_tokens)
}

/// 10s for rate limits and overload, exponential backoff with jitter otherwise
fn retry_delay(attempt: u32, error: &ApiError) -> Duration {
    match error {
        ApiError::Status { status: 429 | 503, .. } => Duration::from_secs(10),
        _ => {
            let base_delay = 2_u64.pow(attempt.min(6));
            let jitter = rand::random::<u64>() % 1000;
            Duration::from_millis(base_delay * 1000 + jitter)
        }
    }
}
