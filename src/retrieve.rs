//! Retriever: embed a query and fetch the nearest chunks.
//!
//! The retriever is the agent's only configured tool. Its tool contract
//! is strict: it always returns text and never raises, because the agent
//! loop feeds tool output straight back to the model as an observation.
//! Failures and empty results map to distinct sentinel strings so the
//! model can react to each.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::embedding::Embedder;
use crate::tool::Tool;
use crate::vector_store::VectorStore;

/// Returned when the search succeeds but matches nothing.
pub const NO_MATCH_SENTINEL: &str =
    "No relevant information was found in the documents for this query.";

/// Returned when embedding or the vector store fails.
pub const ERROR_SENTINEL: &str =
    "Sorry, I encountered an error while searching the documents.";

const TOOL_DESCRIPTION: &str = "Use this tool to answer any questions about topics the user has \
provided in documents. This is the primary source of information. Use it for any query that asks \
for information or details.";

/// Fetches the top-K chunks most similar to a query.
///
/// Shares the indexer's [`Embedder`]; querying with a different
/// embedding model than indexing would make distances meaningless.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k,
        }
    }

    /// Retrieve context for a query: the top-K chunk texts joined with a
    /// blank line, in descending similarity order, or a sentinel.
    pub async fn retrieve(&self, query: &str) -> String {
        info!(query, k = self.top_k, "retrieving document context");

        let vector = match self.embedder.embed_query(query).await {
            Ok(vector) => vector,
            Err(e) => {
                error!(error = %e, "query embedding failed");
                return ERROR_SENTINEL.to_string();
            }
        };

        let hits = match self.store.search(&vector, self.top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                error!(error = %e, "vector store search failed");
                return ERROR_SENTINEL.to_string();
            }
        };

        if hits.is_empty() {
            return NO_MATCH_SENTINEL.to_string();
        }

        hits.iter()
            .map(|hit| hit.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl Tool for Retriever {
    fn name(&self) -> &str {
        "document_retriever"
    }

    fn description(&self) -> &str {
        TOOL_DESCRIPTION
    }

    async fn call(&self, input: &str) -> String {
        self.retrieve(input).await
    }
}
