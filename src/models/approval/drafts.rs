use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::editor::PipelineEditor;
use super::queries;
use crate::auth::session::SessionContext;
use crate::errors::AppError;
use crate::store::{DocumentStore, StoreError};

/// (user id, project id): each user edits their own draft of each project.
type DraftKey = (String, String);

#[derive(Debug)]
struct DraftSlot {
    editor: Mutex<PipelineEditor>,
    saving: AtomicBool,
}

/// Live drafts of the approval editor, one per user and project. Drafts are
/// never shared between users; the last one saved overwrites the others.
#[derive(Debug, Default)]
pub struct DraftRegistry {
    drafts: Mutex<HashMap<DraftKey, Arc<DraftSlot>>>,
}

fn key(ctx: &SessionContext) -> DraftKey {
    (ctx.user_id.clone(), ctx.project_id.clone())
}

impl DraftRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the caller's draft, seeding it from the stored configuration on
    /// first use. The map lock is not held while the store is read.
    async fn slot(&self, store: &dyn DocumentStore, ctx: &SessionContext) -> Result<Arc<DraftSlot>, StoreError> {
        if let Some(slot) = self.drafts.lock().await.get(&key(ctx)) {
            return Ok(Arc::clone(slot));
        }

        let pipelines = queries::load(store, &ctx.project_id).await?;
        log::debug!("Opened approval draft for {} in project {}", ctx.user_id, ctx.project_id);

        let mut drafts = self.drafts.lock().await;
        let slot = drafts.entry(key(ctx)).or_insert_with(|| {
            Arc::new(DraftSlot {
                editor: Mutex::new(PipelineEditor::new(pipelines)),
                saving: AtomicBool::new(false),
            })
        });
        Ok(Arc::clone(slot))
    }

    /// Run `f` against the caller's draft.
    pub async fn with_draft<T>(
        &self,
        store: &dyn DocumentStore,
        ctx: &SessionContext,
        f: impl FnOnce(&mut PipelineEditor) -> T,
    ) -> Result<T, StoreError> {
        let slot = self.slot(store, ctx).await?;
        let mut editor = slot.editor.lock().await;
        Ok(f(&mut editor))
    }

    /// Drop the caller's draft without saving. Returns whether one existed.
    pub async fn discard(&self, ctx: &SessionContext) -> bool {
        self.drafts.lock().await.remove(&key(ctx)).is_some()
    }

    /// Persist the caller's draft. A second save from the same user while the
    /// first is still in flight is refused rather than queued. Edits issued
    /// during a save wait for it to finish. Once saved, an idle draft is
    /// dropped; the next access reseeds it from the stored record.
    pub async fn save(&self, store: &dyn DocumentStore, ctx: &SessionContext) -> Result<PipelineEditor, AppError> {
        let slot = self.slot(store, ctx).await?;
        let saved = {
            let Some(_saving) = SavingGuard::acquire(&slot.saving) else {
                return Err(AppError::SaveInProgress);
            };
            let mut editor = slot.editor.lock().await;
            editor
                .save(store, &ctx.project_id, &ctx.user_id)
                .await
                .map(|()| editor.clone())
        };

        match saved {
            Ok(editor) => {
                self.evict_if_idle(ctx, &slot).await;
                Ok(editor)
            }
            Err(e) => {
                log::warn!("Saving approval draft for project {} failed: {}", ctx.project_id, e);
                Err(AppError::from(e))
            }
        }
    }

    /// Drop a clean draft nobody else holds. Slots are only handed out under
    /// the map lock, so the reference count cannot grow while it is held.
    async fn evict_if_idle(&self, ctx: &SessionContext, slot: &Arc<DraftSlot>) {
        let mut drafts = self.drafts.lock().await;
        let Some(current) = drafts.get(&key(ctx)) else {
            return;
        };
        // One reference in the map, one held by the caller.
        if !Arc::ptr_eq(current, slot) || Arc::strong_count(slot) != 2 {
            return;
        }
        let clean = slot.editor.try_lock().is_ok_and(|editor| !editor.is_dirty());
        if clean {
            drafts.remove(&key(ctx));
            log::debug!("Closed approval draft for {} in project {}", ctx.user_id, ctx.project_id);
        }
    }

    /// Number of drafts currently held in memory.
    pub async fn open_drafts(&self) -> usize {
        self.drafts.lock().await.len()
    }
}

/// Marks a draft as saving for as long as it lives. Dropping it, including
/// when the save future is cancelled, clears the mark.
struct SavingGuard<'a>(&'a AtomicBool);

impl<'a> SavingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(SavingGuard(flag))
        }
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
