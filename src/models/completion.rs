use serde::{Deserialize, Serialize};

/// One token per whitespace-separated word; prompts are built from
/// single-token filler words so no tokenizer is needed.
pub const WORD_TO_TOKEN_MULTIPLIER: u32 = 1;

// ==================================================================================================
// Body accepted by POST /forward
// ==================================================================================================

/// What the dispatcher reads out of a forwarded completion request.
///
/// Everything else in the body (sampling flags, model, ...) is ignored here and
/// only matters to the backend the client is redirected to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchRequest {
    #[serde(default)]
    pub prompt: String,

    /// Requested output length. Required by weighted routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Explicit prompt length, overrides the word count of `prompt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
}

impl DispatchRequest {
    /// Token-equivalent input length of the request
    pub fn input_len(&self) -> u32 {
        match self.prompt_tokens {
            Some(n) => n,
            None => self.prompt.split_whitespace().count() as u32 * WORD_TO_TOKEN_MULTIPLIER,
        }
    }
}

// ==================================================================================================
// Body sent to the dispatcher and then to the backend (vLLM-style /v1/completions)
// ==================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub n: u32,
    pub best_of: u32,
    pub use_beam_search: bool,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    /// Keep generating past end-of-sequence so exactly `max_tokens` come back
    pub ignore_eos: bool,
    pub stream: bool,
    pub model: String,
}

impl CompletionRequest {
    /// Greedy, streamed, exact-length completion for benchmarking
    pub fn benchmark(prompt: String, max_tokens: u32, model: &str) -> Self {
        Self {
            prompt,
            n: 1,
            best_of: 1,
            use_beam_search: false,
            temperature: 0.0,
            top_p: 1.0,
            max_tokens,
            ignore_eos: true,
            stream: true,
            model: model.to_string(),
        }
    }
}
