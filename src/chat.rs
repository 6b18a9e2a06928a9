//! Chat orchestration: one user message in, one streamed answer out.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::agent::Agent;
use crate::models::ConversationTurn;
use crate::session::SessionStore;

/// Ties the agent to session persistence.
///
/// Each [`ChatService::run_turn`] call appends exactly one user turn and
/// one assistant turn to the session, saved together after the answer is
/// complete. If the client disconnects mid-stream the partial answer is
/// persisted as the assistant turn, so the history never ends on an
/// unanswered user message.
pub struct ChatService {
    agent: Agent,
    sessions: Arc<dyn SessionStore>,
}

impl ChatService {
    pub fn new(agent: Agent, sessions: Arc<dyn SessionStore>) -> Self {
        Self { agent, sessions }
    }

    /// Answer `message` within `session_id`, streaming answer deltas on
    /// `tx`. Returns the complete answer text.
    pub async fn run_turn(
        &self,
        session_id: &str,
        message: &str,
        tx: &mpsc::Sender<String>,
    ) -> String {
        let history = self.sessions.load(session_id).await;
        info!(session_id, prior_turns = history.len(), "running chat turn");

        // The agent sees the prior history; the new message goes in as
        // the query itself, not as a history turn.
        let answer = self.agent.run(message, &history, tx).await;

        let mut turns = history;
        turns.push(ConversationTurn::user(message));
        turns.push(ConversationTurn::assistant(answer.clone()));
        self.sessions.save(session_id, &turns).await;

        answer
    }
}
