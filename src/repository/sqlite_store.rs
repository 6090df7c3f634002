// ==========================================
// 农场配额追踪 - SQLite 文档存储
// ==========================================
// 职责: 单机持久化的 RemoteDocumentStore 实现
// 表: documents (文档), collection_records (集合, seq 即服务端序号)
// 通知: 仅覆盖同一进程内的订阅者
// ==========================================

use crate::db::{configure_sqlite_connection, init_schema};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::remote_store::{
    merge_top_level, DocumentSubscription, RemoteDocumentStore, StoredRecord, SubscriberHub,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// SqliteDocumentStore
// ==========================================
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    hub: SubscriberHub,
}

impl SqliteDocumentStore {
    /// 打开数据库文件并建表
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = Connection::open(db_path)?;
        configure_sqlite_connection(&conn)?;
        init_schema(&conn)?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建 (调用方负责建表)
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            hub: SubscriberHub::new(),
        }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn read_document(conn: &Connection, key: &str) -> RepositoryResult<Option<JsonValue>> {
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE doc_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn write_document(conn: &Connection, key: &str, value: &JsonValue) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO documents (doc_key, body, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(doc_key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
            params![key, serde_json::to_string(value)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// 测试辅助: 删除文档并通知
    pub fn remove_document(&self, key: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM documents WHERE doc_key = ?1", params![key])?;
        if affected > 0 {
            self.hub.publish(key, None);
        }
        Ok(affected > 0)
    }
}

fn parse_server_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            tracing::warn!("集合记录时间戳无法解析: {} ({})", raw, e);
            DateTime::<Utc>::UNIX_EPOCH
        })
}

#[async_trait]
impl RemoteDocumentStore for SqliteDocumentStore {
    async fn get(&self, key: &str) -> RepositoryResult<Option<JsonValue>> {
        let conn = self.get_conn()?;
        Self::read_document(&conn, key)
    }

    // 持有连接锁期间推送, 通知顺序与写入顺序一致
    async fn set(&self, key: &str, value: JsonValue) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::write_document(&conn, key, &value)?;
        self.hub.publish(key, Some(value));
        Ok(())
    }

    async fn update(&self, key: &str, patch: JsonValue) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut current = Self::read_document(&tx, key)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Document".to_string(),
            id: key.to_string(),
        })?;
        merge_top_level(key, &mut current, patch)?;
        Self::write_document(&tx, key, &current)?;
        tx.commit()?;
        self.hub.publish(key, Some(current));
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
        let conn = self.get_conn()?;
        let server_ts = Utc::now();
        let inserted = conn.execute(
            r#"
            INSERT INTO collection_records (collection, record_id, body, server_ts)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![collection, id, serde_json::to_string(&data)?, server_ts.to_rfc3339()],
        );

        match inserted {
            Ok(_) => Ok(StoredRecord {
                id: id.to_string(),
                server_seq: conn.last_insert_rowid() as u64,
                server_ts,
                data,
            }),
            Err(e) => match RepositoryError::from(e) {
                RepositoryError::Conflict { .. } => Err(RepositoryError::Conflict {
                    entity: collection.to_string(),
                    id: id.to_string(),
                }),
                other => Err(other),
            },
        }
    }

    async fn delete_from_collection(&self, collection: &str, id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM collection_records WHERE collection = ?1 AND record_id = ?2",
            params![collection, id],
        )?;
        Ok(affected > 0)
    }

    async fn query_ordered_by_timestamp_desc(&self, collection: &str) -> RepositoryResult<Vec<StoredRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT record_id, seq, server_ts, body
            FROM collection_records
            WHERE collection = ?1
            ORDER BY seq DESC
            "#,
        )?;

        let rows = stmt.query_map(params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, seq, server_ts, body) = row?;
            records.push(StoredRecord {
                id,
                server_seq: seq as u64,
                server_ts: parse_server_ts(&server_ts),
                data: serde_json::from_str(&body)?,
            });
        }
        Ok(records)
    }
}
