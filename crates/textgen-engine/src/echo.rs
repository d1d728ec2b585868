//! Echo engine: no model, deterministic output.

use crate::{GenerateResult, GenerationEngine, Result, SamplingParams};

/// Echoes the prompt back, tagged with the model and session ids.
///
/// Token counts are byte lengths: `prompt_tokens` of the prompt,
/// `completion_tokens` of the returned text.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoEngine;

impl EchoEngine {
    pub fn new() -> Self {
        Self
    }
}

impl GenerationEngine for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }

    fn generate(
        &self,
        model: &str,
        prompt: &str,
        _params: &SamplingParams,
        session_id: &str,
    ) -> Result<GenerateResult> {
        let text = format!("[echo model={model} session_id={session_id}] {prompt}");
        Ok(GenerateResult {
            prompt_tokens: prompt.len(),
            completion_tokens: text.len(),
            text,
        })
    }
}
