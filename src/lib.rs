pub mod error;
pub mod config;
pub mod providers;
pub mod retry;
pub mod identity;
pub mod client;
use serde::{Deserialize, Serialize};

pub use client::RelayBackend;

/*

gemini-relay is an async-only rust library that takes one prompt
string, relays it to the Gemini generateContent endpoint, and hands
back the model text plus whatever Google Search grounding sources
came attached. delivery is wrapped in a bounded retry loop with
exponential backoff so a flaky network or a 5xx burst does not leak
straight into the UI.

gemini-relay/
├── Cargo.toml          # Main manifest
├── src/
│   ├── lib.rs          # Re-exports, API interface, shared types
│   ├── error.rs        # Custom error types and handling
│   ├── config.rs       # Relay, generation and retry configuration
│   ├── client.rs       # Backend actor and precondition checks
│   ├── identity.rs     # Identity bootstrap surface (ready + user id)
│   ├── retry.rs        # Retry policy, tagged attempt outcomes, driver
│   └── providers/
│       ├── mod.rs      # Re-exports all providers
│       └── gemini.rs   # Gemini wire types and HTTP client actor
└── tests/              # Integration and pipeline tests

*/

/// RELAY API INTERFACE:

// ===== Generate =====

pub type GenerateReply
  = Result<GeneratedReply, crate::error::Error>;
pub type GenerateReplySender
  = tokio::sync::mpsc::UnboundedSender<GenerateReply>;

pub struct GenerateArgs
{   pub prompt: String
  , pub reply: GenerateReplySender
}

// ===== SetApiKey =====

pub type SetApiKeyReply = Result<(), crate::error::Error>;
pub type SetApiKeyReplySender
  = tokio::sync::mpsc::UnboundedSender<SetApiKeyReply>;

pub struct SetApiKeyArgs
{   pub key: String
  , pub reply: SetApiKeyReplySender
}

// ===== SetIdentity =====

pub type SetIdentityReply = Result<(), crate::error::Error>;
pub type SetIdentityReplySender
  = tokio::sync::mpsc::UnboundedSender<SetIdentityReply>;

pub struct SetIdentityArgs
{   pub identity: crate::identity::Identity
  , pub reply: SetIdentityReplySender
}

// ===== KillProcess =====

pub type KillProcessReply = Result<(), crate::error::Error>;
pub type KillProcessReplySender
  = tokio::sync::mpsc::UnboundedSender<KillProcessReply>;

pub struct KillProcessArgs
{   pub reply: KillProcessReplySender
}

// ===== RelayHand (sender side) =====

pub struct RelayHand
{   pub generate_tx
      : tokio::sync::mpsc::UnboundedSender<GenerateArgs>
  , pub set_api_key_tx
      : tokio::sync::mpsc::UnboundedSender<SetApiKeyArgs>
  , pub set_identity_tx
      : tokio::sync::mpsc::UnboundedSender<SetIdentityArgs>
  , pub kill_process_tx
      : tokio::sync::mpsc::UnboundedSender<KillProcessArgs>
}

// ===== RelayFoot (receiver side) =====

pub struct RelayFoot
{   pub generate_rx
      : tokio::sync::mpsc::UnboundedReceiver<GenerateArgs>
  , pub set_api_key_rx
      : tokio::sync::mpsc::UnboundedReceiver<SetApiKeyArgs>
  , pub set_identity_rx
      : tokio::sync::mpsc::UnboundedReceiver<SetIdentityArgs>
  , pub kill_process_rx
      : tokio::sync::mpsc::UnboundedReceiver<KillProcessArgs>
}

/// RELAY STRUCTURES:

/// Placeholder shown when the response envelope carries no usable
/// candidate text.
pub const NO_REPLY_TEXT: &str
  = "No se pudo generar una respuesta.";

/// Fixed user-facing message after retry exhaustion. The detailed
/// cause is logged, never surfaced.
pub const CONNECT_ERROR_TEXT: &str
  = "Error: No se pudo conectar con el servicio de IA. Inténtalo de nuevo más tarde.";

/// Header line introducing the numbered source list.
pub const SOURCES_HEADER: &str = "Fuentes de Google Search:";

/// One grounding source cited by the model. Only complete
/// (uri, title) pairs are ever retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source
{   pub uri: String
  , pub title: String
}

/// The parsed outcome of one successful generation: model text plus
/// any retained grounding sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReply
{   /// Generated text, or [`NO_REPLY_TEXT`] when the first candidate
    /// had no `content.parts` text
    pub text: String
  , /// Grounding sources with both uri and title present
    pub sources: Vec<Source>
}

impl GeneratedReply
{   /// Render the display string: the text, then a 1-indexed
    /// `title (uri)` list when any sources exist.
    pub fn to_display_string(&self) -> String
    {   let mut full = self.text.clone();
        if !self.sources.is_empty()
        {   full.push_str("\n\n---\n");
            full.push_str(SOURCES_HEADER);
            full.push('\n');
            for (index, source) in self.sources.iter().enumerate()
            {   full.push_str(&format!(
                  "{}. {} ({})\n",
                  index + 1,
                  source.title,
                  source.uri
                ));
            }
        }
        full
    }
}

/// Collapse a generate reply into the string the UI shows. Failures
/// map to the fixed connect-error message; callers that need the
/// failure class match on the `Result` instead.
pub fn render_outcome(reply: &GenerateReply) -> String
{   match reply
    {   Ok(generated) => generated.to_display_string()
      , Err(_) => CONNECT_ERROR_TEXT.to_string()
    }
}
