// ==========================================
// 农场配额追踪 - 本地回退存储
// ==========================================
// 职责: 设备私有的旧数据来源, 仅在首次加载时迁移到远端
// 约定: 回退键 = "farm_" + 文档名 (如 farm_members)
// ==========================================

use crate::db::{configure_sqlite_connection, init_schema};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// 回退键前缀
pub const FALLBACK_KEY_PREFIX: &str = "farm_";

/// 文档名对应的回退键
pub fn fallback_key(document: &str) -> String {
    format!("{}{}", FALLBACK_KEY_PREFIX, document)
}

// ==========================================
// FallbackStore Trait
// ==========================================
pub trait FallbackStore: Send + Sync {
    /// 读取回退数据; 不存在返回 None
    fn read_fallback(&self, key: &str) -> RepositoryResult<Option<JsonValue>>;

    /// 清除回退数据 (迁移成功后调用)
    fn clear_fallback(&self, key: &str) -> RepositoryResult<()>;
}

// ==========================================
// SqliteFallbackStore - fallback_kv 表
// ==========================================
pub struct SqliteFallbackStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFallbackStore {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = Connection::open(db_path)?;
        configure_sqlite_connection(&conn)?;
        init_schema(&conn)?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入回退数据 (旧版客户端/测试种子)
    pub fn write_fallback(&self, key: &str, value: &JsonValue) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO fallback_kv (fallback_key, body) VALUES (?1, ?2)",
            params![key, serde_json::to_string(value)?],
        )?;
        Ok(())
    }
}

impl FallbackStore for SqliteFallbackStore {
    fn read_fallback(&self, key: &str) -> RepositoryResult<Option<JsonValue>> {
        let conn = self.get_conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM fallback_kv WHERE fallback_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn clear_fallback(&self, key: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM fallback_kv WHERE fallback_key = ?1", params![key])?;
        Ok(())
    }
}

// ==========================================
// MemoryFallbackStore
// ==========================================
#[derive(Default)]
pub struct MemoryFallbackStore {
    entries: Mutex<HashMap<String, JsonValue>>,
}

impl MemoryFallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: JsonValue) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value);
        }
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }
}

impl FallbackStore for MemoryFallbackStore {
    fn read_fallback(&self, key: &str) -> RepositoryResult<Option<JsonValue>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn clear_fallback(&self, key: &str) -> RepositoryResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }
}
