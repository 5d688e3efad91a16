use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use log::{debug, trace, error, info};

const GEMINI_API_BASE: &str
  = "https://generativelanguage.googleapis.com/v1beta";

// ===== Request Wire Types =====

#[derive(Debug, Clone, Serialize)]
pub struct RequestPart
{   pub text: String
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestContent
{   pub parts: Vec<RequestPart>
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleSearch {}

#[derive(Debug, Clone, Serialize)]
pub struct Tool
{   #[serde(rename = "googleSearch")]
    pub google_search: GoogleSearch
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGenerationConfig
{   #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<usize>
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest
{   pub contents: Vec<RequestContent>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<WireGenerationConfig>
}

// ===== Response Wire Types =====

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse
{   #[serde(default)]
    pub candidates: Vec<Candidate>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate
{   #[serde(default)]
    pub content: Option<ResponseContent>
  , #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseContent
{   #[serde(default)]
    pub parts: Vec<ResponsePart>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePart
{   #[serde(default)]
    pub text: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata
{   #[serde(default)]
    pub grounding_attributions: Option<Vec<GroundingAttribution>>
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundingAttribution
{   #[serde(default)]
    pub web: Option<WebSource>
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSource
{   #[serde(default)]
    pub uri: Option<String>
  , #[serde(default)]
    pub title: Option<String>
}

// ===== Response Extraction =====

/// Reduce a response envelope to the reply the UI consumes. Only
/// the first candidate counts; structural gaps (no candidate, no
/// parts, empty text) degrade to the fixed placeholder instead of
/// erroring. Sources are gathered only when text extraction
/// succeeded, and only complete (uri, title) pairs survive.
pub fn extract_reply(
  envelope: GenerateContentResponse
) -> crate::GeneratedReply
{   let placeholder = crate::GeneratedReply
    {   text: crate::NO_REPLY_TEXT.to_string()
      , sources: vec![]
    };

    let candidate
      = match envelope.candidates.into_iter().next()
        {   Some(candidate) => candidate
          , None => {
              debug!("No candidates in response");
              return placeholder;
            }
        };

    let text = candidate.content
      .as_ref()
      .and_then(|content| content.parts.first())
      .and_then(|part| part.text.clone());

    match text
    {   Some(text) if !text.is_empty() => {
          let sources: Vec<crate::Source>
            = candidate.grounding_metadata
            .and_then(|metadata| metadata.grounding_attributions)
            .map(|attributions| {
              attributions
                .into_iter()
                .filter_map(|attribution| attribution.web)
                .filter_map(|web| match (web.uri, web.title)
                  {   (Some(uri), Some(title)) => {
                        Some(crate::Source { uri, title })
                      }
                    , _ => None
                  })
                .collect()
            })
            .unwrap_or_default();
          debug!(
            "Extracted reply with {} sources",
            sources.len()
          );
          crate::GeneratedReply
          {   text
            , sources
          }
        }
      , _ => {
          debug!("Candidate had no usable text");
          placeholder
        }
    }
}

// ===== Status Classification =====

/// Map a non-success HTTP status to its attempt outcome: 5xx is
/// retryable, anything else is terminal unless the policy's legacy
/// mode retries client errors too.
pub fn classify_failure_status(
  policy: &crate::retry::RetryPolicy
, status: u16
, body: String
) -> crate::retry::Attempt<GenerateContentResponse>
{   if status >= 500
    {   error!("Gemini server error: {}", status);
        crate::retry::Attempt::Retryable(
          crate::error::Error::ServerError(status)
        )
    } else
    {   error!("Gemini API error: {} - {}", status, body);
        let err = crate::error::Error::ApiError
        {   status
          , body
        };
        if policy.retry_client_errors
        {   crate::retry::Attempt::Retryable(err)
        } else
        {   crate::retry::Attempt::Terminal(err)
        }
    }
}

// ===== Gemini Client Actor =====

/// Commands for GeminiClient actor
pub enum GeminiCommand
{   Generate
    {   prompt: String
      , reply: mpsc::UnboundedSender<crate::GenerateReply>
    }
  , SetApiKey
    {   key: String
      , reply: mpsc::UnboundedSender
        <Result<(), crate::error::Error>>
    }
  , Shutdown
}

/// Gemini client state
pub struct GeminiClientState
{   api_key: Option<String>
  , config: crate::config::GenerationConfig
  , policy: crate::retry::RetryPolicy
  , http_client: reqwest::Client
}

impl GeminiClientState
{   pub fn new(
      config: crate::config::GenerationConfig
    , policy: crate::retry::RetryPolicy
    , api_key: Option<String>
    ) -> Self
    {   debug!("Creating GeminiClientState");
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs
        {   builder = builder.timeout(
              std::time::Duration::from_secs(secs)
            );
        }
        let http_client = builder.build()
          .unwrap_or_default();
        GeminiClientState
        {   api_key
          , config
          , policy
          , http_client
        }
    }

    fn set_api_key(&mut self, key: String)
    {   debug!("Setting Gemini API key");
        self.api_key = Some(key);
    }

    fn endpoint(&self) -> String
    {   let base = self.config.api_base
          .as_deref()
          .unwrap_or(GEMINI_API_BASE);
        format!(
          "{}/models/{}:generateContent",
          base, self.config.model
        )
    }

    fn build_request(&self, prompt: &str)
      -> GenerateContentRequest
    {   let tools
          = if self.config.search_grounding
            {   Some(vec![
                  Tool
                  {   google_search: GoogleSearch {}
                  }
                ])
            } else
            {   None
            };

        let generation_config
          = if self.config.temperature.is_some()
              || self.config.max_output_tokens.is_some()
            {   Some(WireGenerationConfig
                {   temperature: self.config.temperature
                  , max_output_tokens
                      : self.config.max_output_tokens
                })
            } else
            {   None
            };

        GenerateContentRequest
        {   contents: vec![
              RequestContent
              {   parts: vec![
                    RequestPart
                    {   text: prompt.to_string()
                    }
                  ]
              }
            ]
          , tools
          , generation_config
        }
    }

    /// One delivery: POST the payload and classify what came back.
    /// Transport failures and 5xx are retryable; other non-success
    /// statuses are terminal unless the policy's legacy mode says
    /// otherwise; an undecodable body on a success status is
    /// retryable, matching the reference behavior.
    async fn attempt_delivery(
      &self
    , request: &GenerateContentRequest
    , api_key: &str
    ) -> crate::retry::Attempt<GenerateContentResponse>
    {   let response = match self.http_client
          .post(self.endpoint())
          .query(&[("key", api_key)])
          .header("Content-Type", "application/json")
          .json(request)
          .send()
          .await
        {   Ok(response) => response
          , Err(e) => {
              error!("HTTP error: {}", e);
              if e.is_timeout()
              {   return crate::retry::Attempt::Retryable(
                    crate::error::Error::Timeout
                  );
              }
              return crate::retry::Attempt::Retryable(
                crate::error::Error::HttpError(e.to_string())
              );
            }
        };

        let status = response.status();
        trace!("Gemini response status: {}", status);

        if status.is_success()
        {   match response
              .json::<GenerateContentResponse>()
              .await
            {   Ok(envelope) => {
                  crate::retry::Attempt::Success(envelope)
                }
              , Err(e) => {
                  error!("Parse error: {}", e);
                  crate::retry::Attempt::Retryable(
                    crate::error::Error::ParseError(
                      e.to_string()
                    )
                  )
                }
            }
        } else
        {   let body = response.text().await
              .unwrap_or_else(|_|
                "Unknown error".to_string()
              );
            classify_failure_status(
              &self.policy,
              status.as_u16(),
              body
            )
        }
    }

    async fn handle_generate(
      &self
    , prompt: String
    ) -> Result<crate::GeneratedReply, crate::error::Error>
    {   debug!(
          "Handling generate for model: {}",
          self.config.model
        );

        let api_key = self.api_key
          .clone()
          .ok_or_else(|| {
            error!("No Gemini API key configured");
            crate::error::Error::MissingApiKey
          })?;

        let request = self.build_request(&prompt);
        trace!("Gemini request: {:?}", request);

        let request_ref = &request;
        let key_ref = api_key.as_str();
        let envelope = crate::retry::run_with_backoff(
          &self.policy
        , move |attempt| async move {
            debug!("Delivery attempt {}", attempt + 1);
            self.attempt_delivery(request_ref, key_ref).await
          }
        ).await?;

        Ok(extract_reply(envelope))
    }
}

/// Public Gemini client interface
pub struct GeminiClient
{   tx: mpsc::UnboundedSender<GeminiCommand>
  , _task: tokio::task::JoinHandle<()>
}

impl GeminiClient
{   /// Create and spawn a new Gemini client
    pub fn new(
      config: crate::config::GenerationConfig
    , policy: crate::retry::RetryPolicy
    , api_key: Option<String>
    ) -> Self
    {   debug!("Creating GeminiClient");
        let (cmd_tx, cmd_rx)
          = mpsc::unbounded_channel();

        let _task = tokio::spawn(async move {
          run_gemini_loop(cmd_rx, config, policy, api_key).await;
        });

        GeminiClient
        {   tx: cmd_tx
          , _task
        }
    }

    /// Queue a prompt - returns immediately
    pub async fn generate(
      &self
    , prompt: String
    , reply: mpsc::UnboundedSender<crate::GenerateReply>
    ) -> Result<(), crate::error::Error>
    {   debug!("generate queued");

        self.tx.send(GeminiCommand::Generate {
          prompt,
          reply,
        }).map_err(|_| {
          error!("Gemini client disconnected");
          crate::error::Error::Other(
            "Gemini client disconnected".to_string()
          )
        })
    }

    /// Queue set_api_key request
    pub async fn set_api_key(
      &self
    , key: String
    , reply: mpsc::UnboundedSender<
        Result<(), crate::error::Error>
      >
    ) -> Result<(), crate::error::Error>
    {   debug!("set_api_key queued");

        self.tx.send(GeminiCommand::SetApiKey {
          key,
          reply,
        }).map_err(|_| {
          error!("Gemini client disconnected");
          crate::error::Error::Other(
            "Gemini client disconnected".to_string()
          )
        })
    }

    /// Shutdown the client
    pub async fn shutdown(self)
      -> Result<(), crate::error::Error>
    {   debug!("Shutting down GeminiClient");
        self.tx.send(GeminiCommand::Shutdown)
          .map_err(|_| {
            crate::error::Error::Other(
              "Client already shutdown".to_string()
            )
          })
    }
}

/// Main gemini event loop
///
/// Commands run one at a time: the loop awaits each generation,
/// retries included, before receiving the next. Two prompts queued
/// through the same client can never race on delivery.
async fn run_gemini_loop(
  mut cmd_rx: mpsc::UnboundedReceiver<GeminiCommand>
, config: crate::config::GenerationConfig
, policy: crate::retry::RetryPolicy
, api_key: Option<String>
)
{   debug!("Starting Gemini client loop");
    let mut state
      = GeminiClientState::new(config, policy, api_key);

    loop
    { match cmd_rx.recv().await
      {   Some(GeminiCommand::Generate {
            prompt, reply
          }) => {
            debug!("Processing Generate");
            let result = state
              .handle_generate(prompt)
              .await;
            let _ = reply.send(result);
          }
        , Some(GeminiCommand::SetApiKey {
            key, reply
          }) => {
            debug!("Processing SetApiKey");
            state.set_api_key(key);
            let _ = reply.send(Ok(()));
          }
        , Some(GeminiCommand::Shutdown) => {
            info!("Gemini client shutting down");
            break;
          }
        , None => {
            debug!("Command channel closed");
            break;
          }
      }
    }
}
