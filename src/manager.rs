//! The context manager: staging, ingestion, and retrieval across both stores.
//!
//! [`ContextManager`] is the single handle the collaborator surfaces (the
//! HTTP API and the CLI) work through. It owns the runtime [`Settings`],
//! one [`FileStager`] per store, the ephemeral store, and, when a vector
//! database is configured, the persistent store.
//!
//! # Flows
//!
//! - **Upload** ([`feed_files`](ContextManager::feed_files)): stage into the
//!   ephemeral directory → load → split → ingest into the ephemeral store.
//! - **Memorize** ([`memorize`](ContextManager::memorize)): everything
//!   currently staged for the session is staged again into the persistent
//!   directory and ingested into the persistent store.
//! - **Prompt** ([`build_prompt`](ContextManager::build_prompt)): query each
//!   enabled store with its configured `k`, concatenate the results
//!   (ephemeral first), and render them above the user input.

use anyhow::Result;
use globset::GlobSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use habit_context_core::embedding::Embedder;
use habit_context_core::search::{self, merge_results};
use habit_context_core::store::ContextStore;
use habit_context_core::{ContextError, RetrievalResult};

use crate::config::{Config, VectorDbConfig};
use crate::embedding::create_embedder;
use crate::ingest::{load_chunks, IngestReport};
use crate::settings::{RoutineChange, Settings};
use crate::staging::{build_globset, FileStager};
use crate::stores::{EphemeralContextStore, PersistentContextStore};
use crate::vector_db::{self, VectorDatabase};

/// Which of the two context stores an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Ephemeral,
    Persistent,
}

/// Snapshot of both stores, for `habit status` and `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct ContextStatus {
    pub ephemeral: EphemeralStatus,
    pub persistent: Option<PersistentStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EphemeralStatus {
    pub active: bool,
    pub chunks: usize,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistentStatus {
    pub collection: String,
    pub active: bool,
    pub vectors: u64,
    pub dir: PathBuf,
}

pub struct ContextManager {
    config: Config,
    settings: RwLock<Settings>,
    include: GlobSet,
    ephemeral_files: FileStager,
    persistent_files: FileStager,
    ephemeral: EphemeralContextStore,
    persistent: Option<PersistentContextStore>,
}

impl ContextManager {
    /// Build the embedder and, if `[vector_db]` is present, connect the
    /// persistent store. Connection failures propagate.
    pub async fn from_config(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let db = match &config.vector_db {
            Some(db_config) => Some(vector_db::connect(db_config).await?),
            None => None,
        };
        Self::new(config, embedder, db).await
    }

    /// Assemble a manager from explicit parts.
    ///
    /// Without `db` there is no persistent store and persistent operations
    /// fail with [`ContextError::NotInitialized`].
    pub async fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        db: Option<Arc<dyn VectorDatabase>>,
    ) -> Result<Self> {
        let persistent = match db {
            Some(db) => {
                let collection = config
                    .vector_db
                    .as_ref()
                    .map(|c| c.collection.clone())
                    .unwrap_or_else(|| VectorDbConfig::default().collection);
                Some(PersistentContextStore::connect(db, embedder.clone(), collection).await?)
            }
            None => None,
        };

        Ok(Self {
            settings: RwLock::new(Settings::from_config(&config)),
            include: build_globset(&config.staging.include_globs)?,
            ephemeral_files: FileStager::new(&config.staging.ephemeral_dir),
            persistent_files: FileStager::new(&config.staging.persistent_dir),
            ephemeral: EphemeralContextStore::new(embedder),
            persistent,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ephemeral(&self) -> &EphemeralContextStore {
        &self.ephemeral
    }

    pub fn persistent(&self) -> Option<&PersistentContextStore> {
        self.persistent.as_ref()
    }

    fn persistent_store(&self) -> Result<&PersistentContextStore> {
        self.persistent.as_ref().ok_or_else(|| {
            ContextError::NotInitialized("no persistent context store is configured".to_string())
                .into()
        })
    }

    fn stager(&self, kind: StoreKind) -> &FileStager {
        match kind {
            StoreKind::Ephemeral => &self.ephemeral_files,
            StoreKind::Persistent => &self.persistent_files,
        }
    }

    fn store(&self, kind: StoreKind) -> Result<&dyn ContextStore> {
        let store: &dyn ContextStore = match kind {
            StoreKind::Ephemeral => &self.ephemeral,
            StoreKind::Persistent => self.persistent_store()?,
        };
        Ok(store)
    }

    async fn stage_and_ingest<P: AsRef<Path>>(
        &self,
        kind: StoreKind,
        files: &[P],
    ) -> Result<IngestReport> {
        let store = self.store(kind)?;
        let staged = self.stager(kind).stage(files)?;
        let (loaded, chunks) = load_chunks(&staged, &self.config.chunking.split_params());
        let written = store.ingest(chunks).await?;
        info!(store = store.name(), files = loaded.len(), chunks = written, "ingested files");
        Ok(IngestReport {
            files: loaded,
            chunks: written,
        })
    }

    /// Stage `files` for this session and add them to the ephemeral store.
    pub async fn feed_files<P: AsRef<Path>>(&self, files: &[P]) -> Result<IngestReport> {
        self.stage_and_ingest(StoreKind::Ephemeral, files).await
    }

    /// Copy every session file matching `include_globs` into persistent context.
    pub async fn memorize(&self) -> Result<IngestReport> {
        self.persistent_store()?;
        let files = self.ephemeral_files.staged_files(&self.include)?;
        if files.is_empty() {
            info!(dir = %self.ephemeral_files.dir().display(), "no session files to memorize");
        }
        self.memorize_files(&files).await
    }

    /// Stage `files` into persistent context and ingest them.
    pub async fn memorize_files<P: AsRef<Path>>(&self, files: &[P]) -> Result<IngestReport> {
        self.stage_and_ingest(StoreKind::Persistent, files).await
    }

    /// Copy `files` into one store's managed directory without ingesting them.
    pub fn stage<P: AsRef<Path>>(&self, kind: StoreKind, files: &[P]) -> Result<Vec<PathBuf>> {
        self.stager(kind).stage(files)
    }

    /// Delete staged copies from one store's managed directory.
    ///
    /// Embeddings already ingested from those files stay in the store.
    pub fn unstage<P: AsRef<Path>>(&self, kind: StoreKind, files: &[P]) -> Result<Vec<PathBuf>> {
        self.stager(kind).unstage(files)
    }

    /// Query one store, using the configured `k` when none is given.
    pub async fn search(
        &self,
        kind: StoreKind,
        query: &str,
        k: Option<usize>,
    ) -> Result<RetrievalResult> {
        let k = match k {
            Some(k) => k,
            None => {
                let settings = self.settings.read().await;
                match kind {
                    StoreKind::Ephemeral => settings.ephemeral_chunks(),
                    StoreKind::Persistent => settings.persistent_chunks(),
                }
            }
        };
        search::search(self.store(kind)?, query, k).await
    }

    /// Query every enabled store and concatenate the results, ephemeral first.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        let settings = self.settings.read().await.clone();
        let mut results = Vec::new();

        if settings.is_ephemeral_enabled() {
            results.push(search::search(&self.ephemeral, query, settings.ephemeral_chunks()).await?);
        }
        if settings.is_persistent_enabled() {
            if let Some(persistent) = &self.persistent {
                results
                    .push(search::search(persistent, query, settings.persistent_chunks()).await?);
            }
        }

        let merged = merge_results(results);
        info!(results = merged.len(), "retrieved context");
        Ok(merged)
    }

    /// Render retrieved context above `user_input`.
    pub async fn build_prompt(&self, user_input: &str) -> Result<String> {
        let results = self.retrieve(user_input).await?;
        Ok(search::build_prompt(user_input, &results))
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn apply_context_chunks(&self, ephemeral: usize, persistent: usize) -> Result<Settings> {
        let mut settings = self.settings.write().await;
        settings.apply_context_chunks(ephemeral, persistent)?;
        info!(ephemeral, persistent, "updated context chunk counts");
        Ok(settings.clone())
    }

    pub async fn set_active_routine(&self, routine: &str) -> Result<RoutineChange> {
        let change = self.settings.write().await.set_active_routine(routine)?;
        match &change {
            RoutineChange::Switched { previous } => {
                info!(from = %previous, to = routine, "switched routine")
            }
            RoutineChange::AlreadyActive => info!(routine, "routine is already active"),
        }
        Ok(change)
    }

    /// Apply a partial settings change as one unit.
    ///
    /// Fields left as `None` keep their current value. Everything is
    /// validated on a copy under a single write lock, so a rejected change
    /// leaves the settings untouched.
    pub async fn update_settings(
        &self,
        ephemeral: Option<usize>,
        persistent: Option<usize>,
        routine: Option<&str>,
    ) -> Result<(Settings, Option<RoutineChange>)> {
        let mut settings = self.settings.write().await;
        let mut next = settings.clone();
        next.apply_context_chunks(
            ephemeral.unwrap_or(next.ephemeral_chunks()),
            persistent.unwrap_or(next.persistent_chunks()),
        )?;
        let change = routine
            .map(|name| next.set_active_routine(name))
            .transpose()?;
        *settings = next.clone();
        info!(
            ephemeral = next.ephemeral_chunks(),
            persistent = next.persistent_chunks(),
            routine = next.active_routine(),
            "updated settings"
        );
        Ok((next, change))
    }

    pub async fn status(&self) -> Result<ContextStatus> {
        let persistent = match &self.persistent {
            Some(store) => Some(PersistentStatus {
                collection: store.collection().to_string(),
                active: store.is_active().await,
                vectors: store.vector_count().await?,
                dir: self.persistent_files.dir().to_path_buf(),
            }),
            None => None,
        };
        Ok(ContextStatus {
            ephemeral: EphemeralStatus {
                active: self.ephemeral.is_active().await,
                chunks: self.ephemeral.chunk_count().await,
                dir: self.ephemeral_files.dir().to_path_buf(),
            },
            persistent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::embedding::HashEmbedder;
    use crate::vector_db::InMemoryVectorDatabase;
    use habit_context_core::error::classify;
    use std::fs;
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> Config {
        let mut config = parse_config("[embedding]\nprovider = \"hash\"\n").unwrap();
        config.staging.ephemeral_dir = tmp.path().join("session");
        config.staging.persistent_dir = tmp.path().join("memory");
        config
    }

    async fn manager(tmp: &TempDir, with_db: bool) -> ContextManager {
        let db: Option<Arc<dyn VectorDatabase>> = if with_db {
            Some(Arc::new(InMemoryVectorDatabase::new()))
        } else {
            None
        };
        ContextManager::new(config(tmp), Arc::new(HashEmbedder::new(128)), db)
            .await
            .unwrap()
    }

    fn write(tmp: &TempDir, name: &str, text: &str) -> PathBuf {
        let path = tmp.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[tokio::test]
    async fn test_feed_files_skips_missing() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp, false).await;
        let good = write(&tmp, "plan.txt", "walk after lunch");

        let report = m
            .feed_files(&[good, tmp.path().join("missing.txt")])
            .await
            .unwrap();
        assert_eq!(report.files, vec![tmp.path().join("session").join("plan.txt")]);
        assert_eq!(report.chunks, 1);
        assert!(m.ephemeral().is_active().await);
    }

    #[tokio::test]
    async fn test_memorize_without_db_is_not_initialized() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp, false).await;
        let err = m.memorize().await.unwrap_err();
        assert!(matches!(classify(&err), Some(ContextError::NotInitialized(_))));
    }

    #[tokio::test]
    async fn test_memorize_moves_session_files_to_persistent() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp, true).await;
        let file = write(&tmp, "habits.md", "floss nightly");
        m.feed_files(&[file]).await.unwrap();

        let report = m.memorize().await.unwrap();
        assert_eq!(report.files, vec![tmp.path().join("memory").join("habits.md")]);
        let status = m.status().await.unwrap();
        let persistent = status.persistent.unwrap();
        assert!(persistent.active);
        assert_eq!(persistent.vectors, 1);
    }

    #[tokio::test]
    async fn test_retrieve_concatenates_ephemeral_first() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp, true).await;
        let session = write(&tmp, "today.txt", "stretch before running");
        let durable = write(&tmp, "always.txt", "stretch every day");
        m.feed_files(&[session]).await.unwrap();
        m.memorize_files(&[durable]).await.unwrap();

        let results = m.retrieve("stretch").await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.source.ends_with("today.txt"));
        assert!(results[1].chunk.source.ends_with("always.txt"));
    }

    #[tokio::test]
    async fn test_disabled_store_is_not_queried() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp, false).await;
        let file = write(&tmp, "today.txt", "meditate ten minutes");
        m.feed_files(&[file]).await.unwrap();

        m.apply_context_chunks(0, 4).await.unwrap();
        assert!(m.retrieve("meditate").await.unwrap().is_empty());
        assert_eq!(m.build_prompt("hello").await.unwrap(), "hello");

        m.apply_context_chunks(2, 4).await.unwrap();
        let prompt = m.build_prompt("meditate").await.unwrap();
        assert!(prompt.contains("meditate ten minutes"));
        assert!(prompt.ends_with("meditate"));
    }

    #[tokio::test]
    async fn test_update_settings_rejects_without_partial_apply() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp, false).await;
        let before = m.settings().await;

        assert!(m.update_settings(Some(0), None, Some("nope")).await.is_err());
        assert_eq!(m.settings().await, before);

        let (after, change) = m.update_settings(None, Some(7), None).await.unwrap();
        assert!(change.is_none());
        assert_eq!(after.ephemeral_chunks(), before.ephemeral_chunks());
        assert_eq!(after.persistent_chunks(), 7);
        assert_eq!(m.settings().await, after);
    }

    #[tokio::test]
    async fn test_unstage_per_store() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp, false).await;
        let file = write(&tmp, "a.txt", "alpha");
        let report = m.feed_files(&[file]).await.unwrap();

        let err = m.unstage(StoreKind::Persistent, &report.files).unwrap_err();
        assert!(matches!(classify(&err), Some(ContextError::NotInitialized(_))));

        let deleted = m.unstage(StoreKind::Ephemeral, &report.files).unwrap();
        assert_eq!(deleted, report.files);
    }
}
