//! Shared test infrastructure.
//!
//! - `seeded_store()` - in-memory store holding project `p1` with a small crew
//! - `FailingStore` - store wrapper whose reads, lists or writes can be
//!   switched to fail, or whose writes can be made to hang
//! - `session_middleware()` / `test_login` - cookie sessions for HTTP tests
#![allow(dead_code)]

use actix_session::{Session, SessionMiddleware, storage::CookieSessionStore};
use actix_web::{HttpResponse, cookie::Key, web};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicBool, Ordering};

use crewdesk::auth::session::USER_ID_KEY;
use crewdesk::store::{Document, DocumentStore, Filter, MemoryStore, StoreError};

// ============================================================================
// TEST CONSTANTS
// ============================================================================

pub const PROJECT: &str = "p1";
pub const OWNER: &str = "olivia";
pub const ACCOUNTANT: &str = "arun";
pub const CREW: &str = "carl";
pub const CAMERA_HOD: &str = "ana";
pub const CAMERA_AC: &str = "ben";
pub const CAMERA_COORD: &str = "cy";
pub const SOUND_HOD: &str = "dee";

// ============================================================================
// STORE SETUP
// ============================================================================

async fn add_member(store: &MemoryStore, id: &str, data: Value) {
    store
        .set(&format!("projects/{PROJECT}/members/{id}"), data)
        .await
        .expect("Failed to seed member");
}

/// In-memory store with project `p1`: departments Camera, Sound and Art, an
/// owner, an accountant, plain crew and department leaders.
pub async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .set(
            &format!("projects/{PROJECT}"),
            json!({ "name": "Night Shoot", "departments": ["Camera", "Sound", "Art"] }),
        )
        .await
        .expect("Failed to seed project");

    add_member(&store, OWNER, json!({ "displayName": "Olivia", "email": "olivia@example.com", "role": "owner" })).await;
    add_member(
        &store,
        ACCOUNTANT,
        json!({ "displayName": "Arun", "email": "arun@example.com", "role": "crew", "permissions": { "accounting": true } }),
    )
    .await;
    add_member(&store, CREW, json!({ "displayName": "Carl", "email": "carl@example.com", "role": "crew" })).await;
    add_member(
        &store,
        CAMERA_HOD,
        json!({ "displayName": "Ana", "email": "ana@example.com", "department": "Camera", "position": "HOD" }),
    )
    .await;
    add_member(
        &store,
        CAMERA_AC,
        json!({ "displayName": "Ben", "email": "ben@example.com", "department": "Camera", "position": "1st AC" }),
    )
    .await;
    add_member(
        &store,
        CAMERA_COORD,
        json!({ "displayName": "Cy", "email": "cy@example.com", "department": "Camera", "position": "Coordinator" }),
    )
    .await;
    add_member(
        &store,
        SOUND_HOD,
        json!({ "displayName": "Dee", "email": "dee@example.com", "department": "Sound", "position": "Head of Department" }),
    )
    .await;
    store
}

// ============================================================================
// FAILURE INJECTION
// ============================================================================

/// Wraps a `MemoryStore`; while a flag is set the matching calls fail with
/// `StoreError::Unavailable`. `stall_writes` makes writes hang instead, and
/// `fail_reads_after_write` turns on `fail_reads` once the next write lands.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_reads: AtomicBool,
    pub fail_lists: AtomicBool,
    pub fail_writes: AtomicBool,
    pub stall_writes: AtomicBool,
    pub fail_reads_after_write: AtomicBool,
}

impl FailingStore {
    pub fn wrap(inner: MemoryStore) -> Self {
        FailingStore { inner, ..Default::default() }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn set_stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }

    pub fn fail_reads_after_next_write(&self) {
        self.fail_reads_after_write.store(true, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read refused".into()));
        }
        Ok(())
    }

    fn check_list(&self) -> Result<(), StoreError> {
        self.check_read()?;
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("list refused".into()));
        }
        Ok(())
    }

    async fn check_write(&self) -> Result<(), StoreError> {
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write refused".into()));
        }
        Ok(())
    }

    fn after_write<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if result.is_ok() && self.fail_reads_after_write.swap(false, Ordering::SeqCst) {
            self.set_fail_reads(true);
        }
        result
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        self.check_read()?;
        self.inner.get(path).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.check_list()?;
        self.inner.list(collection).await
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.check_read()?;
        self.inner.query(collection, filter).await
    }

    async fn insert(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        self.check_write().await?;
        self.after_write(self.inner.insert(collection, data).await)
    }

    async fn set(&self, path: &str, data: Value) -> Result<(), StoreError> {
        self.check_write().await?;
        self.after_write(self.inner.set(path, data).await)
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.check_write().await?;
        self.after_write(self.inner.update(path, fields).await)
    }

    async fn array_union(&self, path: &str, field: &str, values: Vec<Value>) -> Result<(), StoreError> {
        self.check_write().await?;
        self.after_write(self.inner.array_union(path, field, values).await)
    }

    async fn array_remove(&self, path: &str, field: &str, values: Vec<Value>) -> Result<(), StoreError> {
        self.check_write().await?;
        self.after_write(self.inner.array_remove(path, field, values).await)
    }
}

// ============================================================================
// HTTP SESSIONS
// ============================================================================

pub fn session_middleware(key: &Key) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
        .cookie_secure(false)
        .build()
}

/// Stand-in for the external auth gateway: GET /test/login/{user_id}.
pub async fn test_login(session: Session, path: web::Path<String>) -> HttpResponse {
    session
        .insert(USER_ID_KEY, path.into_inner())
        .expect("Failed to write session");
    HttpResponse::Ok().finish()
}
