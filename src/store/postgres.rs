use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;

use super::{
    apply_array_remove, apply_array_union, generate_document_id, merge_fields,
    resolve_server_timestamps, split_path, validate_collection, Document, DocumentStore, Filter,
    StoreError,
};

/// Document store backed by the `documents` table (one JSONB row per document).
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    doc_id: String,
    path: String,
    data: Json<Value>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.doc_id,
            path: row.path,
            data: row.data.0,
        }
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Read-modify-write of one document under a row lock.
    async fn modify<F>(&self, path: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Value) + Send,
    {
        split_path(path)?;
        let mut tx = self.pool.begin().await?;
        let row: Option<(Json<Value>,)> =
            sqlx::query_as("SELECT data FROM documents WHERE path = $1 FOR UPDATE")
                .bind(path)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((Json(mut data),)) = row else {
            return Err(StoreError::NotFound(path.to_string()));
        };
        f(&mut data);
        sqlx::query("UPDATE documents SET data = $2, updated_at = NOW() WHERE path = $1")
            .bind(path)
            .bind(Json(&data))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        split_path(path)?;
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT doc_id, path, data FROM documents WHERE path = $1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Document::from))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        validate_collection(collection)?;
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT doc_id, path, data FROM documents WHERE collection = $1 ORDER BY doc_id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        validate_collection(collection)?;
        let rows = match filter {
            Filter::Eq(field, value) => {
                sqlx::query_as::<_, DocumentRow>(
                    "SELECT doc_id, path, data FROM documents
                     WHERE collection = $1 AND data -> $2::text = $3
                     ORDER BY doc_id",
                )
                .bind(collection)
                .bind(field)
                .bind(Json(value))
                .fetch_all(&self.pool)
                .await?
            }
            Filter::ArrayContains(field, value) => {
                sqlx::query_as::<_, DocumentRow>(
                    "SELECT doc_id, path, data FROM documents
                     WHERE collection = $1
                       AND jsonb_typeof(data -> $2::text) = 'array'
                       AND data -> $2::text @> $3
                     ORDER BY doc_id",
                )
                .bind(collection)
                .bind(field)
                .bind(Json(Value::Array(vec![value.clone()])))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn insert(&self, collection: &str, mut data: Value) -> Result<String, StoreError> {
        validate_collection(collection)?;
        resolve_server_timestamps(&mut data);
        let id = generate_document_id();
        let path = format!("{collection}/{id}");
        sqlx::query(
            "INSERT INTO documents (path, collection, doc_id, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(&path)
        .bind(collection)
        .bind(&id)
        .bind(Json(&data))
        .execute(&self.pool)
        .await?;
        log::debug!("Inserted document {path}");
        Ok(id)
    }

    async fn set(&self, path: &str, mut data: Value) -> Result<(), StoreError> {
        let (collection, id) = split_path(path)?;
        resolve_server_timestamps(&mut data);
        sqlx::query(
            "INSERT INTO documents (path, collection, doc_id, data) VALUES ($1, $2, $3, $4)
             ON CONFLICT (path) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
        )
        .bind(path)
        .bind(&collection)
        .bind(&id)
        .bind(Json(&data))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let mut fields = Value::Object(fields);
        resolve_server_timestamps(&mut fields);
        let Value::Object(fields) = fields else {
            return Ok(());
        };
        self.modify(path, move |data| merge_fields(data, fields)).await
    }

    async fn array_union(&self, path: &str, field: &str, values: Vec<Value>) -> Result<(), StoreError> {
        self.modify(path, move |data| apply_array_union(data, field, values)).await
    }

    async fn array_remove(&self, path: &str, field: &str, values: Vec<Value>) -> Result<(), StoreError> {
        self.modify(path, move |data| apply_array_remove(data, field, &values)).await
    }
}
