//! Task agents and request routing
//!
//! Each agent advertises how well it can handle a piece of recognized text;
//! the registry routes a turn to the best match. Agents receive the turn's
//! cancellation token and must check it between side-effecting steps.

pub mod filesystem;
pub mod general;
pub mod spreadsheet;
pub mod web_search;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::session::TurnId;
use crate::{Error, Result};

pub use filesystem::FilesystemAgent;
pub use general::GeneralAgent;
pub use spreadsheet::SpreadsheetAgent;
pub use web_search::WebSearchAgent;

/// A task handler for recognized requests
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable name used for routing hints and logging
    fn name(&self) -> &str;

    /// Score in [0.0, 1.0] for how well this agent handles `text`
    ///
    /// Zero means the agent cannot handle the request at all.
    fn can_handle(&self, text: &str) -> f32;

    /// Execute the request and produce a spoken reply
    ///
    /// Implementations check `cancel` between side-effecting steps and
    /// abandon work once it fires.
    ///
    /// # Errors
    ///
    /// Returns error if the task fails
    async fn execute(&self, turn_id: TurnId, text: &str, cancel: &CancellationToken)
        -> Result<String>;
}

/// Routes requests to registered agents
#[derive(Default)]
pub struct AgentRegistry {
    agents: Vec<Box<dyn Agent>>,
}

impl AgentRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self { agents: Vec::new() }
    }

    /// Register an agent
    pub fn register(&mut self, agent: Box<dyn Agent>) {
        tracing::debug!(agent = agent.name(), "agent registered");
        self.agents.push(agent);
    }

    /// Number of registered agents
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agents are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Pick the agent for a request
    ///
    /// An `intent` hint matching an agent name wins outright; otherwise the
    /// highest [`Agent::can_handle`] score decides, with earlier
    /// registration breaking ties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAgentAvailable`] when every registered agent
    /// scores the request at zero, which includes the empty registry. A
    /// registry without a catch-all agent can therefore fail routing even
    /// when it is not empty.
    pub fn route(&self, text: &str, intent: Option<&str>) -> Result<&dyn Agent> {
        if let Some(hint) = intent {
            if let Some(agent) = self.agents.iter().find(|a| a.name() == hint) {
                tracing::debug!(agent = hint, "routed by intent hint");
                return Ok(agent.as_ref());
            }
        }

        let mut best: Option<(&dyn Agent, f32)> = None;
        for agent in &self.agents {
            let score = agent.can_handle(text);
            tracing::trace!(agent = agent.name(), score, "routing score");
            if score > 0.0 && best.is_none_or(|(_, s)| score > s) {
                best = Some((agent.as_ref(), score));
            }
        }

        match best {
            Some((agent, score)) => {
                tracing::debug!(agent = agent.name(), score, "request routed");
                Ok(agent)
            }
            None => Err(Error::NoAgentAvailable(text.to_string())),
        }
    }

    /// Execute a request on the named agent
    ///
    /// # Errors
    ///
    /// Returns error if the agent is unknown or its execution fails
    pub async fn dispatch(
        &self,
        agent: &str,
        turn_id: TurnId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let agent = self
            .agents
            .iter()
            .find(|a| a.name() == agent)
            .ok_or_else(|| Error::Agent(format!("unknown agent: {agent}")))?;
        agent.execute(turn_id, text, cancel).await
    }
}
