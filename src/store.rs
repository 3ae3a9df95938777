//! Load/save collaborators.
//!
//! The engine only awaits these; retries, timeouts and transport belong to
//! the implementation.

use crate::config::CompanyContext;
use crate::error::{FinancialPlanError, Result};
use crate::schema::{AuditEntry, PlanStatePayload, SavePayload};
use futures::future::{BoxFuture, FutureExt};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

pub trait PlanStore: Send + Sync {
    /// `Ok(None)` means nothing has been stored yet and built-in defaults apply.
    fn fetch_state<'a>(
        &'a self,
        ctx: &'a CompanyContext,
    ) -> BoxFuture<'a, Result<Option<PlanStatePayload>>>;

    fn persist_state<'a>(
        &'a self,
        ctx: &'a CompanyContext,
        payload: SavePayload,
    ) -> BoxFuture<'a, Result<()>>;
}

/// In-process store keyed by [`CompanyContext::storage_key`]. Every saved
/// manual log is appended to a per-company history.
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<String, SavePayload>>,
    history: Mutex<HashMap<String, Vec<AuditEntry>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| FinancialPlanError::PersistenceError("store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `state` for `ctx`.
    pub fn with_state(ctx: &CompanyContext, state: PlanStatePayload) -> Self {
        let mut states = HashMap::new();
        states.insert(
            ctx.storage_key(),
            SavePayload {
                preventivo_overrides: state.preventivo_overrides,
                consuntivo_overrides: state.consuntivo_overrides,
                stats_overrides: state.stats_overrides,
                causali_catalog: state.causali_catalog,
                causali_version: state.causali_version,
                ..Default::default()
            },
        );
        Self {
            states: Mutex::new(states),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// The last payload saved for `ctx`.
    pub fn saved(&self, ctx: &CompanyContext) -> Result<Option<SavePayload>> {
        Ok(lock(&self.states)?.get(&ctx.storage_key()).cloned())
    }

    pub fn manual_log_history(&self, ctx: &CompanyContext) -> Result<Vec<AuditEntry>> {
        Ok(lock(&self.history)?
            .get(&ctx.storage_key())
            .cloned()
            .unwrap_or_default())
    }
}

impl PlanStore for MemoryStore {
    fn fetch_state<'a>(
        &'a self,
        ctx: &'a CompanyContext,
    ) -> BoxFuture<'a, Result<Option<PlanStatePayload>>> {
        async move {
            let states = lock(&self.states)?;
            Ok(states.get(&ctx.storage_key()).cloned().map(PlanStatePayload::from))
        }
        .boxed()
    }

    fn persist_state<'a>(
        &'a self,
        ctx: &'a CompanyContext,
        payload: SavePayload,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let key = ctx.storage_key();
            debug!(
                "Storing plan state for '{}' with {} manual log entr(ies)",
                key,
                payload.manual_log.len()
            );
            lock(&self.history)?
                .entry(key.clone())
                .or_default()
                .extend(payload.manual_log.iter().cloned());
            lock(&self.states)?.insert(key, payload);
            Ok(())
        }
        .boxed()
    }
}

#[cfg(feature = "file-store")]
pub use file_store::JsonFileStore;

#[cfg(feature = "file-store")]
mod file_store {
    use super::*;
    use std::path::{Path, PathBuf};
    use tokio::fs;

    /// One JSON document per company under `root`. Saved manual logs are
    /// appended to the log already on disk.
    #[derive(Debug, Clone)]
    pub struct JsonFileStore {
        root: PathBuf,
    }

    impl JsonFileStore {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        pub fn root(&self) -> &Path {
            &self.root
        }

        fn path_for(&self, ctx: &CompanyContext) -> PathBuf {
            let file_name: String = ctx
                .storage_key()
                .chars()
                .map(|c| if c == '/' || c == '\\' { '_' } else { c })
                .collect();
            self.root.join(format!("{}.json", file_name))
        }

        async fn read(&self, ctx: &CompanyContext) -> Result<Option<SavePayload>> {
            match fs::read_to_string(self.path_for(ctx)).await {
                Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }
    }

    impl PlanStore for JsonFileStore {
        fn fetch_state<'a>(
            &'a self,
            ctx: &'a CompanyContext,
        ) -> BoxFuture<'a, Result<Option<PlanStatePayload>>> {
            async move { Ok(self.read(ctx).await?.map(PlanStatePayload::from)) }.boxed()
        }

        fn persist_state<'a>(
            &'a self,
            ctx: &'a CompanyContext,
            mut payload: SavePayload,
        ) -> BoxFuture<'a, Result<()>> {
            async move {
                if let Some(existing) = self.read(ctx).await? {
                    let mut log = existing.manual_log;
                    log.append(&mut payload.manual_log);
                    payload.manual_log = log;
                }

                fs::create_dir_all(&self.root).await?;
                let path = self.path_for(ctx);
                let tmp = path.with_extension("json.tmp");
                fs::write(&tmp, serde_json::to_vec_pretty(&payload)?).await?;
                fs::rename(&tmp, &path).await?;
                debug!("Wrote plan state to {}", path.display());
                Ok(())
            }
            .boxed()
        }
    }
}
