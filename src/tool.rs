//! Agent tool catalog.
//!
//! Tools form a closed set registered at startup; the agent selects one
//! by name at runtime and dispatch is a registry lookup, never
//! reflection. A tool's contract is text in, text out: implementations
//! must not return errors. Failures become sentinel strings the model
//! can read as an observation.

use async_trait::async_trait;
use std::sync::Arc;

/// A capability the agent can invoke during its reasoning loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to select this tool (e.g. `document_retriever`).
    fn name(&self) -> &str;

    /// Natural-language guidance telling the model when to invoke it.
    fn description(&self) -> &str;

    /// Run the tool. Always returns text; never fails.
    async fn call(&self, input: &str) -> String;
}

/// The closed tool set available to one agent.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Look a tool up by name.
    pub fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Render the catalog for the agent prompt: one `name: description`
    /// line per tool.
    pub fn catalog(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Comma-separated tool names, for format instructions and error
    /// observations.
    pub fn names(&self) -> String {
        self.tools
            .iter()
            .map(|t| t.name().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
