//! Runtime-adjustable settings.
//!
//! [`Settings`] is seeded from [`Config`] once at startup and owned by the
//! [`ContextManager`](crate::manager::ContextManager); the host's
//! settings-apply callback changes it through the manager. Only the chunk
//! counts feed the core, as the `k` of each store's retrieval.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::{Config, MAX_CONTEXT_CHUNKS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    active_routine: String,
    routine_choices: Vec<String>,
    ephemeral_enabled: bool,
    ephemeral_chunks: usize,
    persistent_enabled: bool,
    persistent_chunks: usize,
}

/// Outcome of [`Settings::set_active_routine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoutineChange {
    Switched { previous: String },
    AlreadyActive,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            active_routine: config.routines.active.clone(),
            routine_choices: config.routines.choices.clone(),
            ephemeral_enabled: config.retrieval.ephemeral_chunks != 0,
            ephemeral_chunks: config.retrieval.ephemeral_chunks,
            persistent_enabled: config.retrieval.persistent_chunks != 0,
            persistent_chunks: config.retrieval.persistent_chunks,
        }
    }

    pub fn active_routine(&self) -> &str {
        &self.active_routine
    }

    pub fn routine_choices(&self) -> &[String] {
        &self.routine_choices
    }

    pub fn is_ephemeral_enabled(&self) -> bool {
        self.ephemeral_enabled
    }

    pub fn ephemeral_chunks(&self) -> usize {
        self.ephemeral_chunks
    }

    pub fn is_persistent_enabled(&self) -> bool {
        self.persistent_enabled
    }

    pub fn persistent_chunks(&self) -> usize {
        self.persistent_chunks
    }

    /// Set both retrieval counts; a store is enabled iff its count is non-zero.
    ///
    /// Validates both values before changing anything.
    pub fn apply_context_chunks(&mut self, ephemeral: usize, persistent: usize) -> Result<()> {
        check_chunks("ephemeral", ephemeral)?;
        check_chunks("persistent", persistent)?;
        self.ephemeral_chunks = ephemeral;
        self.persistent_chunks = persistent;
        self.ephemeral_enabled = ephemeral != 0;
        self.persistent_enabled = persistent != 0;
        Ok(())
    }

    pub fn set_active_routine(&mut self, routine: &str) -> Result<RoutineChange> {
        if !self.routine_choices.iter().any(|c| c == routine) {
            bail!(
                "unknown routine '{}'; choices are: {}",
                routine,
                self.routine_choices.join(", ")
            );
        }
        if self.active_routine == routine {
            return Ok(RoutineChange::AlreadyActive);
        }
        let previous = std::mem::replace(&mut self.active_routine, routine.to_string());
        Ok(RoutineChange::Switched { previous })
    }
}

fn check_chunks(store: &str, chunks: usize) -> Result<()> {
    if chunks > MAX_CONTEXT_CHUNKS {
        bail!(
            "{} context chunks must be between 0 and {}, got {}",
            store,
            MAX_CONTEXT_CHUNKS,
            chunks
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn settings() -> Settings {
        let config = parse_config(
            "[retrieval]\nephemeral_chunks = 3\npersistent_chunks = 0\n\n[routines]\nactive = \"default\"\nchoices = [\"default\", \"study\"]\n",
        )
        .unwrap();
        Settings::from_config(&config)
    }

    #[test]
    fn test_seeded_from_config() {
        let s = settings();
        assert_eq!(s.ephemeral_chunks(), 3);
        assert!(s.is_ephemeral_enabled());
        assert_eq!(s.persistent_chunks(), 0);
        assert!(!s.is_persistent_enabled());
        assert_eq!(s.routine_choices(), &["default".to_string(), "study".to_string()]);
    }

    #[test]
    fn test_apply_context_chunks_derives_enabled() {
        let mut s = settings();
        s.apply_context_chunks(0, 5).unwrap();
        assert_eq!(s.ephemeral_chunks(), 0);
        assert!(!s.is_ephemeral_enabled());
        assert_eq!(s.persistent_chunks(), 5);
        assert!(s.is_persistent_enabled());
    }

    #[test]
    fn test_apply_context_chunks_is_all_or_nothing() {
        let mut s = settings();
        assert!(s.apply_context_chunks(2, 11).is_err());
        assert_eq!(s.ephemeral_chunks(), 3);
        assert!(s.apply_context_chunks(0, MAX_CONTEXT_CHUNKS + 1).is_err());
        assert!(s.is_ephemeral_enabled());
    }

    #[test]
    fn test_routine_switching() {
        let mut s = settings();
        assert_eq!(s.set_active_routine("default").unwrap(), RoutineChange::AlreadyActive);
        assert_eq!(
            s.set_active_routine("study").unwrap(),
            RoutineChange::Switched {
                previous: "default".to_string()
            }
        );
        assert_eq!(s.active_routine(), "study");
        assert!(s.set_active_routine("nap").is_err());
    }
}
