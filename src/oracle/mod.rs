//! Oracle Gateway: the external semantic classifier
//!
//! The engine only ever talks to [`OracleGateway`], which checks the
//! knowledge base first, serialises requests per fingerprint and persists
//! every successful classification. The classifier itself sits behind the
//! [`Oracle`] capability trait so tests and offline runs can swap it out.
//!
//! # Environment Variables
//!
//! - `ANTHROPIC_API_KEY`: Anthropic backend
//! - `OPENAI_API_KEY`: OpenAI backend
//! - `OPENROUTER_API_KEY`: OpenRouter backend
//! - `OLLAMA_MODEL`: model for a local Ollama server (no key needed)

mod client;
mod gateway;
mod request;
mod response;

pub use client::{LlmBackend, LlmClient, LlmConfig, Message, Role};
pub use gateway::OracleGateway;
pub use request::{expr, for_header, param, render_block, render_procedure, render_stmt, OracleRequest, Renderer, RequestKind};
pub use response::{parse_reply, OracleReply, DEFAULT_CONFIDENCE, MIN_CONFIDENCE};

use crate::error::OracleError;
use tracing::debug;

/// Capability contract for anything that can classify a structure.
pub trait Oracle: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    fn classify(&self, request: &OracleRequest) -> Result<OracleReply, OracleError>;
}

/// LLM-backed oracle.
pub struct LlmOracle {
    client: LlmClient,
    name: String,
}

impl LlmOracle {
    pub fn new(client: LlmClient) -> Self {
        let name = format!("{}:{}", client.backend().name(), client.model());
        Self { client, name }
    }

    pub fn from_env(config: LlmConfig) -> Result<Self, OracleError> {
        Ok(Self::new(LlmClient::from_env(config)?))
    }
}

impl Oracle for LlmOracle {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, request: &OracleRequest) -> Result<OracleReply, OracleError> {
        debug!("Asking {} about {} {}", self.name, request.kind.label(), request.fingerprint.short());
        let reply = self.client.generate(
            vec![Message::user(request.prompt())],
            Some(OracleRequest::system_prompt()),
        )?;
        parse_reply(&reply)
    }
}

/// Used when no backend is configured; every request fails as `Unavailable`.
pub struct DisabledOracle {
    reason: String,
}

impl DisabledOracle {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl Oracle for DisabledOracle {
    fn name(&self) -> &str {
        "disabled"
    }

    fn classify(&self, _request: &OracleRequest) -> Result<OracleReply, OracleError> {
        Err(OracleError::Unavailable(self.reason.clone()))
    }
}
