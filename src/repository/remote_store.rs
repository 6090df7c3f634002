// ==========================================
// 农场配额追踪 - 远端文档存储 Trait
// ==========================================
// 职责: 定义多写者实时文档存储的访问接口
// 红线: 调用方只通过本 trait 访问远端, 不依赖具体实现
// ==========================================
// 语义:
// - set: 整体覆盖 (无字段级合并)
// - update: 顶层字段浅合并, 文档不存在时报错
// - subscribe: 仅推送订阅之后的变化
// - 集合记录由服务端分配单调序号与时间戳
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// 每个文档键的通知缓冲
const CHANNEL_CAPACITY: usize = 64;

// ==========================================
// 集合记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub server_seq: u64,
    pub server_ts: DateTime<Utc>,
    pub data: JsonValue,
}

// ==========================================
// 文档变化通知
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    /// 文档被写入 (None 表示被删除)
    Changed { key: String, value: Option<JsonValue> },
    /// 远端推送的监听错误
    Failed { key: String, message: String },
    /// 订阅落后, 中间的通知已丢失 (需重新读取文档)
    Lagged { key: String, skipped: u64 },
}

// ==========================================
// DocumentSubscription - 单文档订阅
// ==========================================
// 丢弃即退订
pub struct DocumentSubscription {
    key: String,
    rx: broadcast::Receiver<DocumentEvent>,
}

impl DocumentSubscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 等待下一条通知; 通道关闭返回 None
    pub async fn next_event(&mut self) -> Option<DocumentEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("订阅 {} 落后, 丢失 {} 条通知", self.key, skipped);
                Some(DocumentEvent::Lagged {
                    key: self.key.clone(),
                    skipped,
                })
            }
            Err(RecvError::Closed) => None,
        }
    }
}

// ==========================================
// RemoteDocumentStore Trait
// ==========================================
// 实现者: MemoryDocumentStore, SqliteDocumentStore
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    /// 读取文档, 不存在返回 None
    async fn get(&self, key: &str) -> RepositoryResult<Option<JsonValue>>;

    /// 整体覆盖写入
    async fn set(&self, key: &str, value: JsonValue) -> RepositoryResult<()>;

    /// 顶层字段浅合并
    async fn update(&self, key: &str, patch: JsonValue) -> RepositoryResult<()>;

    /// 订阅文档变化
    async fn subscribe(&self, key: &str) -> RepositoryResult<DocumentSubscription>;

    /// 追加集合记录 (id 由调用方给出, 重复 id 返回 Conflict)
    async fn append_to_collection(
        &self,
        collection: &str,
        id: &str,
        data: JsonValue,
    ) -> RepositoryResult<StoredRecord>;

    /// 删除集合记录; 返回是否存在
    async fn delete_from_collection(&self, collection: &str, id: &str) -> RepositoryResult<bool>;

    /// 按服务端时间倒序读取集合
    async fn query_ordered_by_timestamp_desc(&self, collection: &str) -> RepositoryResult<Vec<StoredRecord>>;
}

// ==========================================
// SubscriberHub - 进程内通知分发
// ==========================================
// 每个文档键一个 broadcast 通道, 供各存储实现复用
#[derive(Default)]
pub struct SubscriberHub {
    channels: Mutex<HashMap<String, broadcast::Sender<DocumentEvent>>>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, key: &str) -> RepositoryResult<DocumentSubscription> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let sender = channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(DocumentSubscription {
            key: key.to_string(),
            rx: sender.subscribe(),
        })
    }

    fn send(&self, key: &str, event: DocumentEvent) {
        let Ok(channels) = self.channels.lock() else {
            tracing::error!("通知分发锁已损坏, 丢弃 {} 的通知", key);
            return;
        };
        if let Some(sender) = channels.get(key) {
            // 无订阅者时 send 返回错误, 属正常情况
            let _ = sender.send(event);
        }
    }

    /// 推送文档新值
    pub fn publish(&self, key: &str, value: Option<JsonValue>) {
        self.send(
            key,
            DocumentEvent::Changed {
                key: key.to_string(),
                value,
            },
        );
    }

    /// 推送监听错误
    pub fn publish_error(&self, key: &str, message: impl Into<String>) {
        self.send(
            key,
            DocumentEvent::Failed {
                key: key.to_string(),
                message: message.into(),
            },
        );
    }

    /// 当前活跃订阅数
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.channels
            .lock()
            .ok()
            .and_then(|channels| channels.get(key).map(|s| s.receiver_count()))
            .unwrap_or(0)
    }
}

/// update 的浅合并规则 (供各实现复用)
pub fn merge_top_level(key: &str, current: &mut JsonValue, patch: JsonValue) -> RepositoryResult<()> {
    let (Some(target), JsonValue::Object(fields)) = (current.as_object_mut(), patch) else {
        return Err(RepositoryError::SchemaMismatch {
            key: key.to_string(),
            message: "update 仅支持对象文档与对象补丁".to_string(),
        });
    };
    for (field, value) in fields {
        target.insert(field, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_hub_delivers_to_each_subscriber() {
        let hub = SubscriberHub::new();
        let mut first = hub.subscribe("k").unwrap();
        let mut second = hub.subscribe("k").unwrap();
        assert_eq!(hub.subscriber_count("k"), 2);

        hub.publish("k", Some(json!(1)));
        let expected = DocumentEvent::Changed {
            key: "k".to_string(),
            value: Some(json!(1)),
        };
        assert_eq!(first.next_event().await, Some(expected.clone()));
        assert_eq!(second.next_event().await, Some(expected));

        drop(first);
        assert_eq!(hub.subscriber_count("k"), 1);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_told() {
        let hub = SubscriberHub::new();
        let mut sub = hub.subscribe("k").unwrap();
        for i in 0..(CHANNEL_CAPACITY as u64 + 3) {
            hub.publish("k", Some(json!(i)));
        }

        assert_eq!(
            sub.next_event().await,
            Some(DocumentEvent::Lagged {
                key: "k".to_string(),
                skipped: 3
            })
        );
        assert_eq!(
            sub.next_event().await,
            Some(DocumentEvent::Changed {
                key: "k".to_string(),
                value: Some(json!(3))
            })
        );
    }

    #[test]
    fn test_merge_top_level() {
        let mut doc = json!({"a": 1, "b": {"x": 1}});
        merge_top_level("k", &mut doc, json!({"b": {"y": 2}, "c": 3})).unwrap();
        assert_eq!(doc, json!({"a": 1, "b": {"y": 2}, "c": 3}));

        let mut scalar = json!(5);
        assert!(merge_top_level("k", &mut scalar, json!({"a": 1})).is_err());
    }
}
