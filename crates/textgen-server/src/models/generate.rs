//! Generate request/response types.

use serde::{Deserialize, Serialize};
use textgen_engine::{SamplingParams, DEFAULT_MAX_TOKENS};

use crate::error::ServerError;

/// Body of `/v1/generate` and `/v1/generate/stream`.
///
/// Numeric fields are signed so that zero and negative values can be
/// resolved to defaults rather than rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub model: String,
    pub prompt: String,
    /// `<= 0` means the default budget.
    #[serde(default)]
    pub max_tokens: i64,
    pub temperature: Option<f32>,
    /// `<= 0` means 1.
    #[serde(default)]
    pub top_k: i64,
    #[serde(default)]
    pub ignore_eos: bool,
    /// Empty selects the shared default session.
    #[serde(default)]
    pub session_id: String,
}

impl GenerateRequest {
    /// Resolve the request's knobs into engine parameters.
    pub fn sampling_params(&self) -> Result<SamplingParams, ServerError> {
        let temperature = self.temperature.unwrap_or(0.0);
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(ServerError::InvalidRequest(format!(
                "temperature must be a non-negative number (got {temperature})"
            )));
        }

        let max_tokens = if self.max_tokens <= 0 {
            DEFAULT_MAX_TOKENS
        } else {
            u32::try_from(self.max_tokens).unwrap_or(u32::MAX)
        };
        let top_k = if self.top_k <= 0 {
            1
        } else {
            u32::try_from(self.top_k).unwrap_or(u32::MAX)
        };

        Ok(SamplingParams::new()
            .with_max_tokens(max_tokens)
            .with_temperature(temperature)
            .with_top_k(top_k)
            .with_ignore_eos(self.ignore_eos))
    }
}

/// Body of a successful `/v1/generate` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub id: String,
    /// Unix seconds.
    pub created: i64,
    pub model: String,
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: serde_json::Value) -> GenerateRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn only_prompt_is_required() {
        let req = request(serde_json::json!({"prompt": "hi"}));
        assert_eq!(req.model, "");
        assert_eq!(req.session_id, "");
        assert_eq!(req.sampling_params().unwrap(), SamplingParams::default());
    }

    #[test]
    fn non_positive_values_resolve_to_defaults() {
        let req = request(serde_json::json!({
            "prompt": "hi",
            "max_tokens": -5,
            "top_k": 0,
        }));
        let params = req.sampling_params().unwrap();
        assert_eq!(params.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(params.top_k, 1);
    }

    #[test]
    fn explicit_values_pass_through() {
        let req = request(serde_json::json!({
            "prompt": "hi",
            "max_tokens": 7,
            "temperature": 0.8,
            "top_k": 40,
            "ignore_eos": true,
        }));
        let params = req.sampling_params().unwrap();
        assert_eq!(params.max_tokens, 7);
        assert_eq!(params.temperature, 0.8);
        assert_eq!(params.top_k, 40);
        assert!(params.ignore_eos);
    }

    #[test]
    fn oversized_budget_saturates() {
        let req = request(serde_json::json!({"prompt": "hi", "max_tokens": i64::MAX}));
        assert_eq!(req.sampling_params().unwrap().max_tokens, u32::MAX);
    }

    #[test]
    fn negative_temperature_is_rejected() {
        let req = request(serde_json::json!({"prompt": "hi", "temperature": -1.0}));
        assert!(matches!(
            req.sampling_params(),
            Err(ServerError::InvalidRequest(_))
        ));
    }
}
