//! # Maritime Agent
//!
//! Explains anomaly events raised by vessel telemetry. For each event the
//! agent retrieves relevant documentation, then runs a bounded tool-calling
//! conversation with a language model that can query live vessel data, and
//! stores the model's structured answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ docs/*.md  │──▶│ Chunk+Embed  │──▶│ knowledge_docs│
//! └────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │ retrieve
//!   event ──▶ Analyzer ──▶ Orchestrator ◀────┘
//!                            │    ▲
//!                      chat  ▼    │ tool results
//!                       ┌──────┐ ┌──────────────┐
//!                       │ LLM  │ │ Tool gateway │
//!                       └──────┘ └──────────────┘
//!                            │
//!                            ▼ parse + persist
//!                        ai_analyses
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`models`] | Core data types |
//! | [`chunk`] | Word-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store trait and backends |
//! | [`ingest`] | Knowledge ingestion |
//! | [`retrieve`] | Context retrieval for prompts |
//! | [`llm`] | Chat model abstraction |
//! | [`tools`] | Tool gateway client and argument validation |
//! | [`agent`] | Tool-calling conversation loop |
//! | [`parse`] | Confidence and action extraction |
//! | [`events`] | Events and analyses in the relational store |
//! | [`analyze`] | Per-event analysis pipeline |
//! | [`server`] | HTTP API |

pub mod agent;
pub mod analyze;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod events;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod parse;
pub mod retrieve;
pub mod server;
pub mod store;
pub mod tools;
