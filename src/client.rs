use tokio::sync::mpsc;
use log::{debug, error, info};
use crate::RelayFoot;

/// Backend state for the relay
pub struct RelayBackendState
{   pub identity: Option<crate::identity::Identity>
  , pub gemini_client: crate::providers::gemini::GeminiClient
}

impl RelayBackendState
{   /// Create a new backend state from configuration
    pub fn new(config: crate::config::RelayConfig) -> Self
    {   debug!("Initializing RelayBackendState");
        let policy = config.retry.policy();
        let gemini_client
          = crate::providers::gemini::GeminiClient::new(
              config.generation,
              policy,
              config.api_key
            );
        RelayBackendState
        {   identity: None
          , gemini_client
        }
    }
}

/// Public API for the relay backend - owns the task
pub struct RelayBackend
{   hand: crate::RelayHand
  , _task_handle: tokio::task::JoinHandle<()>
}

impl RelayBackend
{   /// Create and spawn a new relay backend
    /// Returns immediately - spawns background task
    pub fn new(config: crate::config::RelayConfig) -> Self
    {   debug!("Creating RelayBackend with task ownership");

        let (generate_tx, generate_rx)
          = mpsc::unbounded_channel();
        let (set_api_key_tx, set_api_key_rx)
          = mpsc::unbounded_channel();
        let (set_identity_tx, set_identity_rx)
          = mpsc::unbounded_channel();
        let (kill_process_tx, kill_process_rx)
          = mpsc::unbounded_channel();

        let hand = crate::RelayHand
        {   generate_tx: generate_tx.clone()
          , set_api_key_tx: set_api_key_tx.clone()
          , set_identity_tx: set_identity_tx.clone()
          , kill_process_tx: kill_process_tx.clone()
        };

        let foot = crate::RelayFoot
        {   generate_rx
          , set_api_key_rx
          , set_identity_rx
          , kill_process_rx
        };

        let _task_handle = tokio::spawn(async move {
          run_backend_loop(foot, config).await
        });

        RelayBackend
        {   hand
          , _task_handle
        }
    }

    /// Queue a prompt - returns almost immediately. The reply
    /// arrives on the returned receiver once delivery succeeds or
    /// retries are exhausted.
    pub async fn generate(
      &self
    , prompt: String
    ) -> Result<
        mpsc::UnboundedReceiver<crate::GenerateReply>,
        crate::error::Error
      >
    {   debug!("generate queuing command");
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::GenerateArgs
        {   prompt
          , reply: reply_tx
        };

        self.hand.generate_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel closed");
            crate::error::Error::Other(
              "Backend disconnected".to_string()
            )
          })?;

        Ok(reply_rx)
    }

    /// Set the API key - returns almost immediately
    pub async fn set_api_key(
      &self
    , key: String
    ) -> Result<
        mpsc::UnboundedReceiver<crate::SetApiKeyReply>,
        crate::error::Error
      >
    {   debug!("set_api_key queuing command");
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::SetApiKeyArgs
        {   key
          , reply: reply_tx
        };

        self.hand.set_api_key_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel closed");
            crate::error::Error::Other(
              "Backend disconnected".to_string()
            )
          })?;

        Ok(reply_rx)
    }

    /// Install the identity bootstrap result. Generation is
    /// refused until this has completed once.
    pub async fn set_identity(
      &self
    , identity: crate::identity::Identity
    ) -> Result<
        mpsc::UnboundedReceiver<crate::SetIdentityReply>,
        crate::error::Error
      >
    {   debug!("set_identity queuing command");
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::SetIdentityArgs
        {   identity
          , reply: reply_tx
        };

        self.hand.set_identity_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel closed");
            crate::error::Error::Other(
              "Backend disconnected".to_string()
            )
          })?;

        Ok(reply_rx)
    }

    /// Gracefully shutdown the backend
    pub async fn shutdown(self)
      -> Result<(), crate::error::Error>
    {   debug!("Shutting down RelayBackend");
        let (reply_tx, mut reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::KillProcessArgs
        {   reply: reply_tx
        };

        self.hand.kill_process_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel already closed");
            crate::error::Error::Other(
              "Backend already shutdown".to_string()
            )
          })?;

        // Wait for shutdown confirmation
        if let Some(result) = reply_rx.recv().await
        {   debug!("Backend shutdown confirmed");
            result
        } else
        {   error!("Backend shutdown timeout");
            Err(crate::error::Error::Timeout)
        }
    }
}

/// Main backend event loop
///
/// Design: tokio::select! is ONLY for fast queueing. The generate
/// arm checks preconditions (non-empty prompt, identity ready) and
/// hands the work to the provider actor, whose own loop runs one
/// delivery at a time.
async fn run_backend_loop(
  foot: crate::RelayFoot
, config: crate::config::RelayConfig
)
{   debug!("Starting RelayBackend event loop");
    let mut state = RelayBackendState::new(config);
    let RelayFoot
    {   mut generate_rx
      , mut set_api_key_rx
      , mut set_identity_rx
      , mut kill_process_rx
    } = foot;

    loop
    { tokio::select!
      { Some(cmd) = generate_rx.recv() => {
          debug!("Received Generate");

          if cmd.prompt.trim().is_empty()
          {   error!("Rejecting empty prompt");
              let _ = cmd.reply.send(
                Err(crate::error::Error::EmptyPrompt)
              );
              continue;
          }

          if state.identity.is_none()
          {   error!("Rejecting generate before identity bootstrap");
              let _ = cmd.reply.send(
                Err(crate::error::Error::NotReady)
              );
              continue;
          }

          let _ = state.gemini_client
            .generate(
              cmd.prompt,
              cmd.reply
            )
            .await;
        }
      , Some(cmd) = set_api_key_rx.recv() => {
          debug!("Received SetApiKey");
          let _ = state.gemini_client
            .set_api_key(
              cmd.key,
              cmd.reply
            )
            .await;
        }
      , Some(cmd) = set_identity_rx.recv() => {
          debug!(
            "Received SetIdentity (anonymous: {})",
            cmd.identity.is_anonymous()
          );
          state.identity = Some(cmd.identity);
          let _ = cmd.reply.send(Ok(()));
        }
      , Some(cmd) = kill_process_rx.recv() => {
          debug!("Received KillProcess");
          let _ = cmd.reply.send(Ok(()));
          info!("RelayBackend shutting down");
          break;
        }
      , else => {
          // All hands dropped without a KillProcess
          debug!("All backend channels closed");
          break;
        }
      }
    }
}
