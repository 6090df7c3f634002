// ==========================================
// 农场配额追踪 - 进程内文档存储
// ==========================================
// 用途: 测试、单机嵌入使用
// 服务端序号: 进程内单调递增计数器
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::remote_store::{
    merge_top_level, DocumentSubscription, RemoteDocumentStore, StoredRecord, SubscriberHub,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, JsonValue>,
    collections: HashMap<String, Vec<StoredRecord>>,
}

// ==========================================
// MemoryDocumentStore
// ==========================================
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<MemoryState>,
    hub: SubscriberHub,
    next_seq: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> RepositoryResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 测试辅助: 向订阅者推送一条监听错误
    pub fn inject_listener_error(&self, key: &str, message: &str) {
        self.hub.publish_error(key, message);
    }

    /// 测试辅助: 删除文档并通知
    pub fn remove_document(&self, key: &str) -> RepositoryResult<bool> {
        let mut state = self.state()?;
        let existed = state.documents.remove(key).is_some();
        if existed {
            self.hub.publish(key, None);
        }
        Ok(existed)
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.hub.subscriber_count(key)
    }
}

#[async_trait]
impl RemoteDocumentStore for MemoryDocumentStore {
    async fn get(&self, key: &str) -> RepositoryResult<Option<JsonValue>> {
        Ok(self.state()?.documents.get(key).cloned())
    }

    // 持有状态锁期间推送, 通知顺序与写入顺序一致
    async fn set(&self, key: &str, value: JsonValue) -> RepositoryResult<()> {
        let mut state = self.state()?;
        state.documents.insert(key.to_string(), value.clone());
        self.hub.publish(key, Some(value));
        Ok(())
    }

    async fn update(&self, key: &str, patch: JsonValue) -> RepositoryResult<()> {
        let mut state = self.state()?;
        let current = state
            .documents
            .get_mut(key)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "Document".to_string(),
                id: key.to_string(),
            })?;
        merge_top_level(key, current, patch)?;
        let merged = current.clone();
        self.hub.publish(key, Some(merged));
        Ok(())
    }

    async fn subscribe(&self, key: &str) -> RepositoryResult<DocumentSubscription> {
        self.hub.subscribe(key)
    }

    async fn append_to_collection(
        &self,
        collection: &str,
        id: &str,
        data: JsonValue,
    ) -> RepositoryResult<StoredRecord> {
        let mut state = self.state()?;
        let records = state.collections.entry(collection.to_string()).or_default();
        if records.iter().any(|r| r.id == id) {
            return Err(RepositoryError::Conflict {
                entity: collection.to_string(),
                id: id.to_string(),
            });
        }

        let record = StoredRecord {
            id: id.to_string(),
            server_seq: self.next_seq.fetch_add(1, Ordering::SeqCst) + 1,
            server_ts: Utc::now(),
            data,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn delete_from_collection(&self, collection: &str, id: &str) -> RepositoryResult<bool> {
        let mut state = self.state()?;
        let Some(records) = state.collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }

    async fn query_ordered_by_timestamp_desc(&self, collection: &str) -> RepositoryResult<Vec<StoredRecord>> {
        let state = self.state()?;
        let mut records = state.collections.get(collection).cloned().unwrap_or_default();
        records.sort_by(|a, b| b.server_seq.cmp(&a.server_seq));
        Ok(records)
    }
}
