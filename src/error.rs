use std::fmt;

/// Custom error type for relay operations
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// API key is missing
    MissingApiKey
  , /// HTTP transport error (connection refused, DNS, timeout)
    HttpError(String)
  , /// Server-side failure, status >= 500
    ServerError(u16)
  , /// Any other non-success status (4xx and friends)
    ApiError
    {   status: u16
      , body: String
    }
  , /// Failed to parse API response
    ParseError(String)
  , /// Prompt was empty or whitespace only
    EmptyPrompt
  , /// Identity bootstrap has not completed
    NotReady
  , /// Timeout error
    Timeout
  , /// Generic error
    Other(String)
}

impl Error
{   /// Whether a failed delivery with this error is worth another
    /// attempt. Client errors are terminal here; the legacy mode
    /// that retries them lives in the retry policy, not in the
    /// error itself.
    pub fn is_retryable(&self) -> bool
    {   matches!(
          self,
          Error::HttpError(_)
            | Error::ServerError(_)
            | Error::ParseError(_)
            | Error::Timeout
        )
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::MissingApiKey => {
              write!(f, "Missing Gemini API key")
            }
          , Error::HttpError(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
          , Error::ServerError(status) => {
              write!(f, "Server error: {}", status)
            }
          , Error::ApiError { status, body } => {
              write!(f, "API error: {} - {}", status, body)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::EmptyPrompt => {
              write!(f, "Prompt is empty")
            }
          , Error::NotReady => {
              write!(f, "Identity bootstrap not complete")
            }
          , Error::Timeout => {
              write!(f, "Request timed out")
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}
