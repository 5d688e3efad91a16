//! Configuration for the relay, generation parameters and retry behavior

use serde::{Deserialize, Serialize};

/// Generation configuration for the Gemini endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig
{   /// Model name
    pub model: String
  , /// API base URL (if custom)
    pub api_base: Option<String>
  , /// Per-attempt request timeout in seconds
    pub timeout_secs: Option<u64>
  , /// Attach the Google Search grounding tool
    pub search_grounding: bool
  , /// Sampling temperature
    pub temperature: Option<f32>
  , /// Max tokens the model may generate
    pub max_output_tokens: Option<usize>
}

impl Default for GenerationConfig
{   fn default() -> Self
    {   GenerationConfig
        {   model: "gemini-2.5-flash".to_string()
          , api_base: None
          , timeout_secs: Some(30)
          , search_grounding: true
          , temperature: None
          , max_output_tokens: None
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig
{   /// Max delivery attempts per prompt
    pub max_attempts: usize
  , /// Backoff multiplier between attempts
    pub backoff_multiplier: f32
  , /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64
  , /// Retry 4xx responses like 5xx (legacy behavior)
    pub retry_client_errors: bool
}

impl Default for RetryConfig
{   fn default() -> Self
    {   RetryConfig
        {   max_attempts: 3
          , backoff_multiplier: 2.0
          , initial_backoff_ms: 1000
          , retry_client_errors: false
        }
    }
}

impl RetryConfig
{   /// Build the runtime retry policy from this configuration
    pub fn policy(&self) -> crate::retry::RetryPolicy
    {   let policy = crate::retry::RetryPolicy::new(
          self.max_attempts
        , self.backoff_multiplier
        , self.initial_backoff_ms
        );
        if self.retry_client_errors
        {   policy.retrying_client_errors()
        } else
        {   policy
        }
    }
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig
{   /// Gemini API key, supplied out-of-band
    pub api_key: Option<String>
  , /// Generation parameters
    pub generation: GenerationConfig
  , /// Retry behavior
    pub retry: RetryConfig
}

impl Default for RelayConfig
{   fn default() -> Self
    {   RelayConfig
        {   api_key: None
          , generation: GenerationConfig::default()
          , retry: RetryConfig::default()
        }
    }
}

impl RelayConfig
{   /// Read configuration from the environment. `GEMINI_API_KEY`
    /// carries the key; `GEMINI_API_BASE` and `GEMINI_MODEL`
    /// override the defaults when set.
    pub fn from_env() -> Self
    {   let mut config = RelayConfig::default();
        config.api_key = std::env::var("GEMINI_API_KEY").ok();
        if let Ok(base) = std::env::var("GEMINI_API_BASE")
        {   config.generation.api_base = Some(base);
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL")
        {   config.generation.model = model;
        }
        config
    }
}
