use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{
    apply_array_remove, apply_array_union, generate_document_id, merge_fields,
    resolve_server_timestamps, split_path, validate_collection, Document, DocumentStore, Filter,
    StoreError,
};

/// In-process document store. Paths sort lexicographically, so the direct
/// children of a collection come back ordered by id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents, across all collections.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    async fn children(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        validate_collection(collection)?;
        let documents = self.documents.read().await;
        let prefix = format!("{collection}/");
        let children = documents
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, data)| {
                let id = &path[prefix.len()..];
                (!id.contains('/')).then(|| Document {
                    id: id.to_string(),
                    path: path.clone(),
                    data: data.clone(),
                })
            })
            .collect();
        Ok(children)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let (_, id) = split_path(path)?;
        let documents = self.documents.read().await;
        Ok(documents.get(path).map(|data| Document {
            id,
            path: path.to_string(),
            data: data.clone(),
        }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.children(collection).await
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let mut docs = self.children(collection).await?;
        docs.retain(|doc| filter.matches(&doc.data));
        Ok(docs)
    }

    async fn insert(&self, collection: &str, mut data: Value) -> Result<String, StoreError> {
        validate_collection(collection)?;
        resolve_server_timestamps(&mut data);
        let mut documents = self.documents.write().await;
        let id = loop {
            let candidate = generate_document_id();
            if !documents.contains_key(&format!("{collection}/{candidate}")) {
                break candidate;
            }
        };
        documents.insert(format!("{collection}/{id}"), data);
        Ok(id)
    }

    async fn set(&self, path: &str, mut data: Value) -> Result<(), StoreError> {
        split_path(path)?;
        resolve_server_timestamps(&mut data);
        self.documents.write().await.insert(path.to_string(), data);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        split_path(path)?;
        let mut fields = Value::Object(fields);
        resolve_server_timestamps(&mut fields);
        let Value::Object(fields) = fields else {
            return Ok(());
        };
        let mut documents = self.documents.write().await;
        let data = documents
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        merge_fields(data, fields);
        Ok(())
    }

    async fn array_union(&self, path: &str, field: &str, values: Vec<Value>) -> Result<(), StoreError> {
        split_path(path)?;
        let mut documents = self.documents.write().await;
        let data = documents
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        apply_array_union(data, field, values);
        Ok(())
    }

    async fn array_remove(&self, path: &str, field: &str, values: Vec<Value>) -> Result<(), StoreError> {
        split_path(path)?;
        let mut documents = self.documents.write().await;
        let data = documents
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        apply_array_remove(data, field, &values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::server_timestamp;
    use serde_json::json;

    #[tokio::test]
    async fn get_missing_document_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("projects/p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_replaces_whole_document() {
        let store = MemoryStore::new();
        store.set("projects/p1", json!({ "name": "Pilot", "departments": ["Camera"] })).await.unwrap();
        store.set("projects/p1", json!({ "name": "Pilot II" })).await.unwrap();

        let doc = store.get("projects/p1").await.unwrap().unwrap();
        assert_eq!(doc.id, "p1");
        assert_eq!(doc.data, json!({ "name": "Pilot II" }));
    }

    #[tokio::test]
    async fn list_returns_direct_children_only() {
        let store = MemoryStore::new();
        store.set("projects/p1/members/b", json!({ "displayName": "B" })).await.unwrap();
        store.set("projects/p1/members/a", json!({ "displayName": "A" })).await.unwrap();
        store.set("projects/p1/members/a/notes/n1", json!({})).await.unwrap();
        store.set("projects/p10/members/c", json!({})).await.unwrap();

        let ids: Vec<String> = store
            .list("projects/p1/members")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn query_filters_by_field() {
        let store = MemoryStore::new();
        store.set("projects/p1/members/a", json!({ "department": "Camera" })).await.unwrap();
        store.set("projects/p1/members/b", json!({ "department": "Sound" })).await.unwrap();

        let docs = store
            .query("projects/p1/members", &Filter::eq("department", "Sound"))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "b");
    }

    #[tokio::test]
    async fn insert_assigns_id_and_stamps_time() {
        let store = MemoryStore::new();
        let id = store
            .insert("projects", json!({ "name": "Short", "createdAt": server_timestamp() }))
            .await
            .unwrap();
        let doc = store.get(&format!("projects/{id}")).await.unwrap().unwrap();
        assert_eq!(id.len(), 20);
        assert!(doc.data["createdAt"].is_string());
    }

    #[tokio::test]
    async fn update_missing_document_fails() {
        let store = MemoryStore::new();
        let mut fields = Map::new();
        fields.insert("name".into(), json!("x"));
        let err = store.update("projects/nope", fields).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_merges_top_level_fields() {
        let store = MemoryStore::new();
        store.set("projects/p1", json!({ "name": "Pilot", "departments": ["Camera"] })).await.unwrap();
        let mut fields = Map::new();
        fields.insert("name".into(), json!("Feature"));
        store.update("projects/p1", fields).await.unwrap();

        let doc = store.get("projects/p1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({ "name": "Feature", "departments": ["Camera"] }));
    }

    #[tokio::test]
    async fn array_union_and_remove() {
        let store = MemoryStore::new();
        store.set("projects/p1", json!({ "departments": ["Camera"] })).await.unwrap();
        store
            .array_union("projects/p1", "departments", vec![json!("Sound"), json!("Camera")])
            .await
            .unwrap();
        store.array_remove("projects/p1", "departments", vec![json!("Camera")]).await.unwrap();

        let doc = store.get("projects/p1").await.unwrap().unwrap();
        assert_eq!(doc.data["departments"], json!(["Sound"]));
    }

    #[tokio::test]
    async fn invalid_paths_are_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(store.set("projects", json!({})).await, Err(StoreError::InvalidPath(_))));
        assert!(matches!(store.list("projects/p1").await, Err(StoreError::InvalidPath(_))));
    }
}
