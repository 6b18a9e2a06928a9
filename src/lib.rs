//! # docchat
//!
//! A retrieval-augmented chat service over user-uploaded documents.
//!
//! docchat ingests PDF, DOCX, and plain-text files into an external
//! vector store (extract, chunk, embed, index), then answers questions
//! about them through a tool-using agent that retrieves relevant chunks
//! on demand and streams its answer token by token. Conversations are
//! persisted per session in SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │ Uploads  │──▶│   Pipeline    │──▶│  Qdrant   │
//! │ pdf/docx │   │ Chunk+Embed  │   │ (vectors) │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │ retrieve
//!                ┌──────────┐       ┌────┴─────┐   ┌──────────┐
//!                │   HTTP   │──────▶│  Agent    │──▶│  SQLite   │
//!                │  (SSE)   │◀──────│ (ReAct)  │   │ sessions  │
//!                └──────────┘ tokens└──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docchat init                          # create session db + collection
//! docchat ingest report.pdf notes.docx  # index documents
//! docchat ask "what does the report conclude?"
//! docchat serve                         # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF/DOCX/text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider client |
//! | [`vector_store`] | Vector store abstraction (Qdrant, in-memory) |
//! | [`index`] | Embed-and-upsert indexer |
//! | [`retrieve`] | Top-K retrieval tool |
//! | [`tool`] | Agent tool trait and registry |
//! | [`model`] | Streaming chat-completion client |
//! | [`agent`] | Bounded ReAct agent loop |
//! | [`session`] | Session persistence |
//! | [`chat`] | Chat turn orchestration |
//! | [`ingest`] | File ingestion pipeline |
//! | [`server`] | HTTP server (upload + SSE chat) |
//! | [`db`] | Database connection |

pub mod agent;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod model;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod session;
pub mod tool;
pub mod vector_store;
