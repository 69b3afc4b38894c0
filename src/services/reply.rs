// Detection Service Client
// Scores rewritten text through an external AI-detection endpoint

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::config_store::HumanizerConfig;
use super::providers::{build_http_client, get_api_key, ProviderError};

/// Reply shapes seen from detection services.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ServiceReply {
    Content { content: Value },
    Result { result: Value },
    Raw(String),
}

impl ServiceReply {
    /// Decode a response body. Bodies that are not one of the JSON shapes
    /// are kept verbatim as `Raw`.
    pub fn decode(body: &str) -> Self {
        match serde_json::from_str::<ServiceReply>(body) {
            Ok(reply) => reply,
            Err(_) => ServiceReply::Raw(body.trim().to_string()),
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            ServiceReply::Content { content } => content.clone(),
            ServiceReply::Result { result } => result.clone(),
            ServiceReply::Raw(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionScore {
    /// 0.0 to 1.0 when the service reported a probability.
    pub ai_probability: Option<f64>,
    pub label: Option<String>,
}

/// Object keys read for the score, first present wins.
const PROBABILITY_KEYS: &[&str] = &["ai_probability", "aiProbability", "probability", "score"];
const LABEL_KEYS: &[&str] = &["label", "verdict", "class"];

/// Percent values are scaled down to 0..=1.
fn normalize_probability(p: f64) -> f64 {
    if p > 1.0 {
        (p / 100.0).clamp(0.0, 1.0)
    } else {
        p.max(0.0)
    }
}

fn parse_probability_str(s: &str) -> Option<f64> {
    let s = s.trim();
    match s.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().ok().map(|p| (p / 100.0).clamp(0.0, 1.0)),
        None => s.parse::<f64>().ok().map(normalize_probability),
    }
}

impl DetectionScore {
    pub fn from_reply(reply: &ServiceReply) -> Self {
        Self::from_value(&reply.payload())
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => DetectionScore {
                ai_probability: n.as_f64().map(normalize_probability),
                label: None,
            },
            Value::String(s) => match parse_probability_str(s) {
                Some(p) => DetectionScore {
                    ai_probability: Some(p),
                    label: None,
                },
                None => DetectionScore {
                    ai_probability: None,
                    label: Some(s.trim().to_string()).filter(|l| !l.is_empty()),
                },
            },
            Value::Object(map) => {
                let ai_probability = PROBABILITY_KEYS
                    .iter()
                    .find_map(|k| map.get(*k))
                    .and_then(|v| match v {
                        Value::Number(n) => n.as_f64().map(normalize_probability),
                        Value::String(s) => parse_probability_str(s),
                        _ => None,
                    });
                let label = LABEL_KEYS
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .map(str::to_string);
                if ai_probability.is_none() && label.is_none() {
                    debug!("[DETECTION] reply object carries no score or label: {}", value);
                }
                DetectionScore {
                    ai_probability,
                    label,
                }
            }
            _ => DetectionScore {
                ai_probability: None,
                label: None,
            },
        }
    }
}

pub struct DetectionClient {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl DetectionClient {
    pub fn new(client: Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key,
        }
    }

    /// `None` while no detection endpoint is configured.
    pub fn from_config(config: &HumanizerConfig) -> Result<Option<Self>, ProviderError> {
        let url = match config.detection.url.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => return Ok(None),
        };
        let key_name = config
            .detection
            .api_key_name
            .clone()
            .unwrap_or_else(|| "detection".to_string());
        let api_key = get_api_key(&key_name).or_else(|| config.api_keys.get(&key_name).cloned());
        let client = build_http_client(config.proxy.as_ref().and_then(|p| p.active_url()))?;
        Ok(Some(Self::new(client, url, api_key)))
    }

    pub async fn score(&self, text: &str) -> Result<DetectionScore, ProviderError> {
        debug!("[DETECTION] scoring {} chars at {}", text.chars().count(), self.url);

        let mut req = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let score = DetectionScore::from_reply(&ServiceReply::decode(&body));
        info!(
            "[DETECTION] ai_probability={:?} label={:?}",
            score.ai_probability, score.label
        );
        Ok(score)
    }
}
