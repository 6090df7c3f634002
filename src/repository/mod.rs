// ==========================================
// 农场配额追踪 - 存储层
// ==========================================
// 职责: 远端文档存储接口与实现, 本地回退存储
// 红线: 存储层不含业务逻辑, 只负责数据访问与变化通知
// ==========================================

pub mod error;
pub mod fallback_store;
pub mod memory_store;
pub mod remote_store;
pub mod sqlite_store;

// 重导出核心类型
pub use error::{RepositoryError, RepositoryResult};
pub use fallback_store::{fallback_key, FallbackStore, MemoryFallbackStore, SqliteFallbackStore};
pub use memory_store::MemoryDocumentStore;
pub use remote_store::{
    DocumentEvent, DocumentSubscription, RemoteDocumentStore, StoredRecord, SubscriberHub,
};
pub use sqlite_store::SqliteDocumentStore;
