//! # Habit Context
//!
//! Two kinds of retrieval context for a chat model: an ephemeral store
//! built from files uploaded in the current session, and a persistent
//! store backed by a vector database that survives restarts. At prompt
//! time both are queried and the top chunks are placed above the user's
//! input.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────────┐
//! │ Staging  │──▶│ Load + Split │──▶│ Ephemeral index │──┐
//! │ (copies) │   │   + Embed    │   └─────────────────┘  │   ┌──────────┐
//! └──────────┘   └──────────────┘   ┌─────────────────┐  ├──▶│ Retrieve │
//!                       └──────────▶│ Vector database │──┘   │ + Prompt │
//!                                   └─────────────────┘      └────┬─────┘
//!                                                       ┌─────────┴──┐
//!                                                       ▼            ▼
//!                                                  ┌────────┐  ┌──────────┐
//!                                                  │  CLI   │  │   HTTP   │
//!                                                  │(habit) │  │   API    │
//!                                                  └────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`settings`] | Runtime-adjustable settings |
//! | [`staging`] | Managed-directory file staging |
//! | [`ingest`] | Document loading and splitting |
//! | [`embedding`] | Embedding providers |
//! | [`vector_db`] | Vector-database backends |
//! | [`db`] | SQLite connection and schema |
//! | [`stores`] | Ephemeral and persistent context stores |
//! | [`manager`] | The context manager tying it together |
//! | [`server`] | HTTP API |

pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod manager;
pub mod server;
pub mod settings;
pub mod staging;
pub mod stores;
pub mod vector_db;
