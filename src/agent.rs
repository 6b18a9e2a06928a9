//! Bounded ReAct agent loop.
//!
//! One [`Agent::run`] call serves one user query to completion: the
//! model is prompted with the tool catalog, the prior conversation, and
//! the query, then alternates between reasoning (model output) and
//! acting (tool execution) until it produces a final answer or the
//! iteration budget runs out. The loop owns no shared mutable state, so
//! any number of invocations may run concurrently.
//!
//! Final-answer text is forwarded as append-only deltas on the supplied
//! channel the moment the `Final Answer:` marker appears in the model
//! stream; the concatenation of all deltas equals the returned answer
//! exactly. Output that parses as neither a final answer nor a tool call
//! triggers a corrective observation and a retry, which counts against
//! the budget.

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::model::{ChatMessage, ChatModel};
use crate::models::{ConversationTurn, Role};
use crate::tool::ToolRegistry;
use std::sync::Arc;

/// Marks the start of the model's final answer.
const FINAL_MARKER: &str = "Final Answer:";
const ACTION_MARKER: &str = "Action:";
const ACTION_INPUT_MARKER: &str = "Action Input:";
const OBSERVATION_MARKER: &str = "Observation:";

/// Fed back to the model when its output fits neither format.
const FORMAT_CORRECTION: &str = "Invalid format. To call a tool, reply with an 'Action:' line \
naming the tool and an 'Action Input:' line with its input. To answer the user, reply with \
'Final Answer:' followed by your response.";

/// Best-effort terminal answer when the budget is exhausted.
const ITERATION_LIMIT_ANSWER: &str =
    "I could not reach an answer within the reasoning step limit. Please try asking again, \
perhaps with a more specific question.";

/// Terminal answer when the model transport fails mid-query.
const MODEL_ERROR_ANSWER: &str =
    "Sorry, I ran into a problem while generating a response. Please try again.";

/// What one model turn amounted to.
#[derive(Debug, PartialEq, Eq)]
enum Decision {
    FinalAnswer,
    ToolCall { name: String, input: String },
    Unparsable,
}

/// The conversational agent: a model, a closed tool set, and a budget.
pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    max_iterations: usize,
}

impl Agent {
    pub fn new(model: Arc<dyn ChatModel>, tools: ToolRegistry, max_iterations: usize) -> Self {
        Self {
            model,
            tools,
            max_iterations,
        }
    }

    /// Answer `query` given the prior `history`, streaming final-answer
    /// deltas on `tx`.
    ///
    /// Returns the answer text, which always equals the concatenation of
    /// the emitted deltas. If the delta receiver is dropped mid-stream
    /// (client disconnect), generation stops and the partial answer is
    /// returned so the caller can persist it.
    pub async fn run(
        &self,
        query: &str,
        history: &[ConversationTurn],
        tx: &mpsc::Sender<String>,
    ) -> String {
        let base = self.base_messages(query, history);
        // Scratchpad of (model output, observation) pairs within this query.
        let mut scratchpad: Vec<(String, String)> = Vec::new();

        for iteration in 0..self.max_iterations {
            let mut messages = base.clone();
            for (output, observation) in &scratchpad {
                messages.push(ChatMessage::assistant(output.clone()));
                messages.push(ChatMessage::user(format!(
                    "{} {}",
                    OBSERVATION_MARKER, observation
                )));
            }

            let rx = match self.model.stream_chat(messages).await {
                Ok(rx) => rx,
                Err(e) => {
                    error!(error = %e, "chat completion request failed");
                    return emit_whole(tx, MODEL_ERROR_ANSWER).await;
                }
            };

            let turn = consume_model_turn(rx, tx).await;

            if turn.cancelled {
                info!(emitted = turn.answer.len(), "client disconnected mid-stream");
                return turn.answer;
            }
            if turn.failed {
                if turn.answer.is_empty() {
                    return emit_whole(tx, MODEL_ERROR_ANSWER).await;
                }
                // The stream died while the answer was already going out;
                // keep what reached the client.
                return turn.answer;
            }

            match parse_decision(&turn.output) {
                Decision::FinalAnswer => return turn.answer,
                Decision::ToolCall { name, input } => {
                    let observation = match self.tools.find(&name) {
                        Some(tool) => {
                            info!(tool = %name, input = %input, "agent invoking tool");
                            tool.call(&input).await
                        }
                        None => {
                            warn!(tool = %name, "agent requested unknown tool");
                            format!(
                                "{} is not a valid tool. Available tools: [{}].",
                                name,
                                self.tools.names()
                            )
                        }
                    };
                    scratchpad.push((turn.output, observation));
                }
                Decision::Unparsable => {
                    warn!(iteration, "unparsable model output, sending format correction");
                    scratchpad.push((turn.output, FORMAT_CORRECTION.to_string()));
                }
            }
        }

        warn!(max_iterations = self.max_iterations, "iteration budget exhausted");
        emit_whole(tx, ITERATION_LIMIT_ANSWER).await
    }

    /// System prompt + prior turns + the current query.
    fn base_messages(&self, query: &str, history: &[ConversationTurn]) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.system_prompt())];
        for turn in history {
            messages.push(match turn.role {
                Role::User => ChatMessage::user(turn.text.clone()),
                Role::Assistant => ChatMessage::assistant(turn.text.clone()),
            });
        }
        messages.push(ChatMessage::user(query.to_string()));
        messages
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a helpful assistant that answers questions using the user's uploaded \
documents.\n\nTOOLS:\n------\nYou have access to the following tools:\n\n{catalog}\n\n\
To use a tool, reply in this exact format:\n\nThought: Do I need to use a tool? Yes\n\
Action: the tool to use, one of [{names}]\nAction Input: the input to the tool\n\n\
You will then receive an Observation with the tool's result.\n\n\
When you have the answer for the user, or no tool is needed, you MUST reply in this format:\n\n\
Thought: Do I need to use a tool? No\nFinal Answer: your response to the user",
            catalog = self.tools.catalog(),
            names = self.tools.names(),
        )
    }
}

/// Result of draining one model turn's delta stream.
struct ModelTurn {
    /// Full raw model output.
    output: String,
    /// Final-answer text emitted so far (empty if no marker was seen).
    answer: String,
    /// The delta receiver was dropped mid-stream.
    cancelled: bool,
    /// The model stream reported an error.
    failed: bool,
}

/// Drain the model's delta stream, forwarding the strictly-new suffix of
/// the final answer after each fragment. Emission starts as soon as the
/// marker is seen, even when it arrives split across fragments.
async fn consume_model_turn(mut rx: crate::model::TokenRx, tx: &mpsc::Sender<String>) -> ModelTurn {
    let mut output = String::new();
    let mut answer_start: Option<usize> = None;
    let mut emitted = 0usize; // bytes of answer already sent
    let mut cancelled = false;
    let mut failed = false;

    while let Some(item) = rx.recv().await {
        match item {
            Ok(delta) => output.push_str(&delta),
            Err(e) => {
                error!(error = %e, "model stream failed mid-turn");
                failed = true;
                break;
            }
        }

        if answer_start.is_none() {
            answer_start = output.find(FINAL_MARKER).map(|pos| pos + FINAL_MARKER.len());
        }
        if let Some(start) = answer_start.as_mut() {
            // Swallow whitespace between the marker and the answer, but
            // only before the first emission.
            if emitted == 0 {
                while let Some(c) = output[*start..].chars().next().filter(|c| c.is_whitespace()) {
                    *start += c.len_utf8();
                }
            }
            let available = &output[*start..];
            if available.len() > emitted {
                let delta = available[emitted..].to_string();
                if tx.send(delta).await.is_err() {
                    cancelled = true;
                    break;
                }
                emitted = available.len();
            }
        }
    }

    let answer = match answer_start {
        Some(start) => output[start..start + emitted].to_string(),
        None => String::new(),
    };

    ModelTurn {
        output,
        answer,
        cancelled,
        failed,
    }
}

/// Send a fixed answer as a single delta. A closed channel is fine: the
/// text still becomes the persisted answer.
async fn emit_whole(tx: &mpsc::Sender<String>, text: &str) -> String {
    let _ = tx.send(text.to_string()).await;
    text.to_string()
}

/// Classify one complete model output.
fn parse_decision(output: &str) -> Decision {
    if output.contains(FINAL_MARKER) {
        return Decision::FinalAnswer;
    }

    let action = find_after(output, ACTION_MARKER);
    let input = find_after(output, ACTION_INPUT_MARKER);
    if let (Some(action), Some(input)) = (action, input) {
        // The tool name is the rest of the Action line, minus anything
        // the model bled in from the Action Input line.
        let name = action.lines().next().unwrap_or("").trim().to_string();
        // The input runs until a hallucinated Observation, if any.
        let input = input
            .split(OBSERVATION_MARKER)
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        if !name.is_empty() {
            return Decision::ToolCall { name, input };
        }
    }

    Decision::Unparsable
}

fn find_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    text.find(marker).map(|pos| &text[pos + marker.len()..])
}
