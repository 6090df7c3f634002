// ==========================================
// 农场配额追踪 - 共享状态槽位
// ==========================================
// 职责: 将一个本地状态槽绑定到一个远端文档
// 流程: 订阅 → 冷启动 (回退迁移/采用远端/写入默认) → 监听通知
// 写入: 本地立即生效, 经单槽位写入队列按顺序整体覆盖远端
// 冲突: 远端为准, 后写覆盖 (无字段合并)
// 回显: 本地写入未被远端确认前, 其他通知不覆盖本地值
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::fallback_store::{fallback_key, FallbackStore};
use crate::repository::remote_store::{DocumentEvent, DocumentSubscription, RemoteDocumentStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// 可同步的文档类型
pub trait SharedDocument: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> SharedDocument for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

// ==========================================
// SlotKey - 文档名 → 远端键 / 回退键
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    document: String,
    remote_key: String,
    fallback_key: String,
}

impl SlotKey {
    pub fn new(namespace: &str, document: &str) -> Self {
        let remote_key = if namespace.is_empty() {
            document.to_string()
        } else {
            format!("{}/{}", namespace, document)
        };
        Self {
            document: document.to_string(),
            remote_key,
            fallback_key: fallback_key(document),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn remote_key(&self) -> &str {
        &self.remote_key
    }

    pub fn fallback_key(&self) -> &str {
        &self.fallback_key
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.remote_key)
    }
}

// ==========================================
// ColdStartOutcome - 冷启动结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColdStartOutcome {
    /// 远端为空, 采用回退数据 (persisted: 是否已推送远端并清除回退)
    MigratedFromFallback { persisted: bool },
    /// 采用远端数据
    AdoptedRemote,
    /// 远端与回退均为空, 使用默认值 (persisted: 是否已推送远端)
    SeededDefault { persisted: bool },
    /// 远端文档无法解码, 本地使用默认值, 远端保持不动
    RemoteUndecodable,
    /// 远端读取失败, 本地使用默认值
    LoadFailed,
}

impl ColdStartOutcome {
    /// 本地是否与远端一致
    pub fn is_synced(&self) -> bool {
        matches!(
            self,
            ColdStartOutcome::AdoptedRemote
                | ColdStartOutcome::MigratedFromFallback { persisted: true }
                | ColdStartOutcome::SeededDefault { persisted: true }
        )
    }
}

// ==========================================
// PendingWrite - 已排队的远端写入
// ==========================================
// 丢弃不会取消写入
#[must_use = "丢弃即放弃等待写入结果"]
pub struct PendingWrite {
    state: PendingState,
}

enum PendingState {
    Queued(oneshot::Receiver<RepositoryResult<()>>),
    Ready(RepositoryResult<()>),
}

impl PendingWrite {
    fn queued(rx: oneshot::Receiver<RepositoryResult<()>>) -> Self {
        Self {
            state: PendingState::Queued(rx),
        }
    }

    fn ready(result: RepositoryResult<()>) -> Self {
        Self {
            state: PendingState::Ready(result),
        }
    }

    /// 等待写入落定
    pub async fn settle(self) -> RepositoryResult<()> {
        match self.state {
            PendingState::Ready(result) => result,
            PendingState::Queued(rx) => rx
                .await
                .unwrap_or_else(|_| Err(RepositoryError::InternalError("写入队列已关闭".to_string()))),
        }
    }
}

enum WriteJob {
    Put {
        value: JsonValue,
        done: oneshot::Sender<RepositoryResult<()>>,
    },
    /// 屏障: 之前入队的写入全部落定后回应
    Flush(oneshot::Sender<()>),
}

/// 已入队但尚未收到远端回显的写入 (按入队顺序)
type Unacked = Arc<Mutex<VecDeque<JsonValue>>>;

fn lock_unacked(unacked: &Mutex<VecDeque<JsonValue>>) -> std::sync::MutexGuard<'_, VecDeque<JsonValue>> {
    unacked.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ==========================================
// SharedStateStore<T>
// ==========================================
pub struct SharedStateStore<T: SharedDocument> {
    key: SlotKey,
    default: T,
    local: Arc<RwLock<T>>,
    revision: Arc<watch::Sender<u64>>,
    unacked: Unacked,
    writes: mpsc::UnboundedSender<WriteJob>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<T: SharedDocument> SharedStateStore<T> {
    /// 打开槽位: 订阅远端, 执行冷启动, 启动监听任务
    ///
    /// 远端读取/订阅失败只记录日志, 槽位仍可用 (本地值为默认值)
    pub async fn open(
        key: SlotKey,
        remote: Arc<dyn RemoteDocumentStore>,
        fallback: Arc<dyn FallbackStore>,
        default: T,
    ) -> (Self, ColdStartOutcome) {
        // 先订阅再读取, 冷启动期间的远端变化不会丢失
        let subscription = match remote.subscribe(key.remote_key()).await {
            Ok(sub) => Some(sub),
            Err(e) => {
                tracing::error!("订阅远端文档失败 key={}: {}", key, e);
                None
            }
        };

        let (initial, outcome) = cold_start(&key, remote.as_ref(), fallback.as_ref(), &default).await;
        tracing::info!("共享槽位 {} 冷启动完成: {:?}", key, outcome);

        let (revision, _) = watch::channel(0u64);
        let revision = Arc::new(revision);
        let local = Arc::new(RwLock::new(initial));
        let unacked: Unacked = Arc::new(Mutex::new(VecDeque::new()));
        let writes = spawn_writer(key.clone(), Arc::clone(&remote), Arc::clone(&unacked));

        let listener = subscription.map(|sub| {
            tokio::spawn(listen(
                sub,
                key.clone(),
                Arc::clone(&remote),
                Arc::clone(&local),
                Arc::clone(&revision),
                Arc::clone(&unacked),
                default.clone(),
            ))
        });

        let store = Self {
            key,
            default,
            local,
            revision,
            unacked,
            writes,
            listener: Mutex::new(listener),
        };
        (store, outcome)
    }

    pub fn key(&self) -> &SlotKey {
        &self.key
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, T> {
        self.local.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, T> {
        self.local.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 当前本地值的副本
    pub fn snapshot(&self) -> T {
        self.read_guard().clone()
    }

    /// 借用当前本地值计算
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.read_guard())
    }

    /// 当前修订号 (本地写入或远端通知各加一)
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// 订阅修订号变化
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// 基于当前本地值计算新值, 立即生效并异步整体覆盖远端
    pub fn update(&self, updater: impl FnOnce(&T) -> T) -> PendingWrite {
        let mut guard = self.write_guard();
        let next = updater(&guard);
        self.commit(&mut guard, next)
    }

    /// 同 update, 但 updater 可拒绝 (本地与远端均不变)
    pub fn try_update<E>(&self, updater: impl FnOnce(&T) -> Result<T, E>) -> Result<PendingWrite, E> {
        let mut guard = self.write_guard();
        let next = updater(&guard)?;
        Ok(self.commit(&mut guard, next))
    }

    /// 同 update, updater 返回 None 时不写入
    pub fn update_if(&self, updater: impl FnOnce(&T) -> Option<T>) -> Option<PendingWrite> {
        let mut guard = self.write_guard();
        let next = updater(&guard)?;
        Some(self.commit(&mut guard, next))
    }

    /// 整体替换
    pub fn set(&self, value: T) -> PendingWrite {
        self.update(|_| value)
    }

    // 持有写锁期间入队, 保证入队顺序与本地生效顺序一致
    fn commit(&self, guard: &mut RwLockWriteGuard<'_, T>, next: T) -> PendingWrite {
        let value = match serde_json::to_value(&next) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("共享槽位 {} 序列化失败, 本地不变: {}", self.key, e);
                return PendingWrite::ready(Err(e.into()));
            }
        };

        **guard = next;
        self.bump_revision();

        // 无监听时不会收到回显, 不记录
        if self.is_listening() {
            lock_unacked(&self.unacked).push_back(value.clone());
        }
        let (done, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(job)) = self.writes.send(WriteJob::Put { value, done }) {
            tracing::error!("共享槽位 {} 写入队列已关闭", self.key);
            if let WriteJob::Put { value, .. } = job {
                forget_unacked(&self.unacked, &value);
            }
            return PendingWrite::ready(Err(RepositoryError::InternalError("写入队列已关闭".to_string())));
        }
        PendingWrite::queued(rx)
    }

    /// 等待此前入队的写入全部落定 (成功与否)
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writes.send(WriteJob::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// 仅当本地值仍为 expected 时恢复为 previous (不写远端)
    ///
    /// 用于多步操作中途失败: 远端未接受的本地变更撤回, 便于重试
    pub fn rollback_if(&self, expected: &T, previous: T) -> bool
    where
        T: PartialEq,
    {
        let mut guard = self.write_guard();
        if *guard != *expected {
            return false;
        }
        *guard = previous;
        drop(guard);
        self.bump_revision();
        tracing::warn!("共享槽位 {} 本地变更已撤回", self.key);
        true
    }

    /// 尚未被远端确认的本地写入数
    pub fn unacked_writes(&self) -> usize {
        lock_unacked(&self.unacked).len()
    }

    /// 是否仍在监听远端
    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// 停止监听远端 (已排队写入不受影响)
    pub fn unsubscribe(&self) {
        let handle = match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
            lock_unacked(&self.unacked).clear();
            tracing::debug!("共享槽位 {} 已退订", self.key);
        }
    }
}

impl<T: SharedDocument> Drop for SharedStateStore<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ==========================================
// 冷启动
// ==========================================
async fn cold_start<T: SharedDocument>(
    key: &SlotKey,
    remote: &dyn RemoteDocumentStore,
    fallback: &dyn FallbackStore,
    default: &T,
) -> (T, ColdStartOutcome) {
    match remote.get(key.remote_key()).await {
        Ok(Some(raw)) => match serde_json::from_value::<T>(raw) {
            Ok(value) => (value, ColdStartOutcome::AdoptedRemote),
            Err(e) => {
                tracing::warn!("远端文档 {} 格式不符, 本地使用默认值: {}", key, e);
                (default.clone(), ColdStartOutcome::RemoteUndecodable)
            }
        },
        Ok(None) => {
            if let Some(value) = read_fallback::<T>(key, fallback) {
                let persisted = push_initial(key, remote, &value).await;
                if persisted {
                    if let Err(e) = fallback.clear_fallback(key.fallback_key()) {
                        tracing::warn!("清除回退数据 {} 失败: {}", key.fallback_key(), e);
                    }
                }
                (value, ColdStartOutcome::MigratedFromFallback { persisted })
            } else {
                let persisted = push_initial(key, remote, default).await;
                (default.clone(), ColdStartOutcome::SeededDefault { persisted })
            }
        }
        Err(e) => {
            tracing::error!("读取远端文档 {} 失败, 保留本地默认值: {}", key, e);
            (default.clone(), ColdStartOutcome::LoadFailed)
        }
    }
}

fn read_fallback<T: SharedDocument>(key: &SlotKey, fallback: &dyn FallbackStore) -> Option<T> {
    match fallback.read_fallback(key.fallback_key()) {
        Ok(Some(raw)) => match serde_json::from_value::<T>(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("回退数据 {} 无法解析, 忽略: {}", key.fallback_key(), e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("读取回退数据 {} 失败, 忽略: {}", key.fallback_key(), e);
            None
        }
    }
}

async fn push_initial<T: SharedDocument>(key: &SlotKey, remote: &dyn RemoteDocumentStore, value: &T) -> bool {
    let raw = match serde_json::to_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!("共享槽位 {} 初始值序列化失败: {}", key, e);
            return false;
        }
    };
    match remote.set(key.remote_key(), raw).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("推送初始值到远端 {} 失败: {}", key, e);
            false
        }
    }
}

// ==========================================
// 写入队列
// ==========================================
// 发送端全部丢弃后, 队列处理完剩余写入再退出
fn spawn_writer(
    key: SlotKey,
    remote: Arc<dyn RemoteDocumentStore>,
    unacked: Unacked,
) -> mpsc::UnboundedSender<WriteJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match job {
                WriteJob::Put { value, done } => {
                    let result = remote.set(key.remote_key(), value.clone()).await;
                    if let Err(e) = &result {
                        tracing::error!("远端写入失败 {} (本地值保留): {}", key, e);
                        forget_unacked(&unacked, &value);
                    }
                    let _ = done.send(result);
                }
                WriteJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!("共享槽位 {} 写入队列退出", key);
    });
    tx
}

fn forget_unacked(unacked: &Mutex<VecDeque<JsonValue>>, value: &JsonValue) {
    let mut pending = lock_unacked(unacked);
    if let Some(pos) = pending.iter().position(|v| v == value) {
        pending.remove(pos);
    }
}

// ==========================================
// 远端通知监听
// ==========================================
async fn listen<T: SharedDocument>(
    mut subscription: DocumentSubscription,
    key: SlotKey,
    remote: Arc<dyn RemoteDocumentStore>,
    local: Arc<RwLock<T>>,
    revision: Arc<watch::Sender<u64>>,
    unacked: Unacked,
    default: T,
) {
    while let Some(event) = subscription.next_event().await {
        match event {
            DocumentEvent::Changed { value: Some(raw), .. } => {
                let decoded = serde_json::from_value::<T>(raw.clone());
                let mut guard = local.write().unwrap_or_else(|poisoned| poisoned.into_inner());
                if !settle_echo(&unacked, Some(&raw)) {
                    tracing::debug!("共享槽位 {} 仍有未确认写入, 跳过远端通知", key);
                    continue;
                }
                match decoded {
                    Ok(value) => {
                        tracing::debug!("共享槽位 {} 收到远端更新", key);
                        *guard = value;
                        drop(guard);
                        revision.send_modify(|rev| *rev += 1);
                    }
                    Err(e) => {
                        tracing::warn!("远端文档 {} 格式不符, 保留本地值: {}", key, e);
                    }
                }
            }
            DocumentEvent::Changed { value: None, .. } => {
                let mut guard = local.write().unwrap_or_else(|poisoned| poisoned.into_inner());
                if !settle_echo(&unacked, None) {
                    continue;
                }
                tracing::info!("远端文档 {} 已删除, 本地重置为默认值", key);
                *guard = default.clone();
                drop(guard);
                revision.send_modify(|rev| *rev += 1);
            }
            DocumentEvent::Failed { message, .. } => {
                tracing::error!("监听远端文档 {} 出错, 保留本地值: {}", key, message);
            }
            DocumentEvent::Lagged { skipped, .. } => {
                tracing::warn!("共享槽位 {} 丢失 {} 条通知, 重新读取远端", key, skipped);
                resync(&key, remote.as_ref(), &local, &revision, &unacked, &default).await;
            }
        }
    }
    lock_unacked(&unacked).clear();
    tracing::warn!("远端文档 {} 的订阅已关闭", key);
}

/// 通知丢失后以远端当前值为准
///
/// 丢失的通知里可能含本地写入的回显, 未确认写入全部作废;
/// 仍在队列中的写入落定后会再次推送通知
async fn resync<T: SharedDocument>(
    key: &SlotKey,
    remote: &dyn RemoteDocumentStore,
    local: &RwLock<T>,
    revision: &watch::Sender<u64>,
    unacked: &Mutex<VecDeque<JsonValue>>,
    default: &T,
) {
    let next = match remote.get(key.remote_key()).await {
        Ok(Some(raw)) => match serde_json::from_value::<T>(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("远端文档 {} 格式不符, 保留本地值: {}", key, e);
                lock_unacked(unacked).clear();
                return;
            }
        },
        Ok(None) => default.clone(),
        Err(e) => {
            tracing::error!("重新读取远端文档 {} 失败, 保留本地值: {}", key, e);
            lock_unacked(unacked).clear();
            return;
        }
    };

    let mut guard = local.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    lock_unacked(unacked).clear();
    *guard = next;
    drop(guard);
    revision.send_modify(|rev| *rev += 1);
}

/// 处理一条通知对未确认写入的影响, 返回是否应覆盖本地值
///
/// 通知按远端写入顺序到达: 命中某条未确认写入即视为回显, 之前的写入一并确认;
/// 确认后仍有未确认写入时, 本地值比该通知更新, 不覆盖
fn settle_echo(unacked: &Mutex<VecDeque<JsonValue>>, raw: Option<&JsonValue>) -> bool {
    let mut pending = lock_unacked(unacked);
    if let Some(raw) = raw {
        if let Some(pos) = pending.iter().position(|v| v == raw) {
            pending.drain(..=pos);
        }
    }
    pending.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fallback_store::MemoryFallbackStore;
    use crate::repository::memory_store::MemoryDocumentStore;
    use crate::repository::remote_store::StoredRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// 包装内存存储: 可令订阅失败, 或在下一次 set 后立即写入一批他人数据
    #[derive(Default)]
    struct BusyRemote {
        inner: MemoryDocumentStore,
        fail_subscribe: AtomicBool,
        burst_after_next_set: AtomicUsize,
    }

    #[async_trait]
    impl RemoteDocumentStore for BusyRemote {
        async fn get(&self, key: &str) -> RepositoryResult<Option<JsonValue>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: JsonValue) -> RepositoryResult<()> {
            self.inner.set(key, value).await?;
            let burst = self.burst_after_next_set.swap(0, Ordering::SeqCst);
            for i in 0..burst {
                self.inner.set(key, json!([format!("peer-{}", i)])).await?;
            }
            Ok(())
        }

        async fn update(&self, key: &str, patch: JsonValue) -> RepositoryResult<()> {
            self.inner.update(key, patch).await
        }

        async fn subscribe(&self, key: &str) -> RepositoryResult<DocumentSubscription> {
            if self.fail_subscribe.load(Ordering::SeqCst) {
                return Err(RepositoryError::Unavailable("listener refused".to_string()));
            }
            self.inner.subscribe(key).await
        }

        async fn append_to_collection(
            &self,
            collection: &str,
            id: &str,
            data: JsonValue,
        ) -> RepositoryResult<StoredRecord> {
            self.inner.append_to_collection(collection, id, data).await
        }

        async fn delete_from_collection(&self, collection: &str, id: &str) -> RepositoryResult<bool> {
            self.inner.delete_from_collection(collection, id).await
        }

        async fn query_ordered_by_timestamp_desc(&self, collection: &str) -> RepositoryResult<Vec<StoredRecord>> {
            self.inner.query_ordered_by_timestamp_desc(collection).await
        }
    }

    type Names = Vec<String>;

    fn names(list: &[&str]) -> Names {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn eventually(store: &SharedStateStore<Names>, expected: Names) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.snapshot() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("等待远端通知超时");
    }

    #[test]
    fn test_slot_key() {
        let key = SlotKey::new("farm", "members");
        assert_eq!(key.remote_key(), "farm/members");
        assert_eq!(key.fallback_key(), "farm_members");
        assert_eq!(SlotKey::new("", "goals").remote_key(), "goals");
    }

    #[tokio::test]
    async fn test_cold_start_migrates_fallback() {
        let remote = Arc::new(MemoryDocumentStore::new());
        let fallback = Arc::new(MemoryFallbackStore::new().with_entry("farm_members", json!(["Ana"])));
        let key = SlotKey::new("farm", "members");

        let (store, outcome) =
            SharedStateStore::open(key, remote.clone(), fallback.clone(), names(&["Default"])).await;

        assert_eq!(outcome, ColdStartOutcome::MigratedFromFallback { persisted: true });
        assert_eq!(store.snapshot(), names(&["Ana"]));
        assert_eq!(remote.get("farm/members").await.unwrap(), Some(json!(["Ana"])));
        assert!(!fallback.contains("farm_members"));
    }

    #[tokio::test]
    async fn test_cold_start_prefers_remote() {
        let remote = Arc::new(MemoryDocumentStore::new());
        remote.set("farm/members", json!(["Remote"])).await.unwrap();
        let fallback = Arc::new(MemoryFallbackStore::new().with_entry("farm_members", json!(["Local"])));

        let (store, outcome) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            fallback.clone(),
            Names::new(),
        )
        .await;

        assert_eq!(outcome, ColdStartOutcome::AdoptedRemote);
        assert_eq!(store.snapshot(), names(&["Remote"]));
        assert!(fallback.contains("farm_members"));
    }

    #[tokio::test]
    async fn test_cold_start_seeds_default() {
        let remote = Arc::new(MemoryDocumentStore::new());
        let (store, outcome) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            names(&["Membro 1"]),
        )
        .await;

        assert_eq!(outcome, ColdStartOutcome::SeededDefault { persisted: true });
        assert!(outcome.is_synced());
        assert_eq!(store.snapshot(), names(&["Membro 1"]));
        assert_eq!(remote.get("farm/members").await.unwrap(), Some(json!(["Membro 1"])));
    }

    #[tokio::test]
    async fn test_undecodable_remote_is_left_untouched() {
        let remote = Arc::new(MemoryDocumentStore::new());
        remote.set("farm/members", json!({"unexpected": true})).await.unwrap();

        let (store, outcome) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            names(&["X"]),
        )
        .await;

        assert_eq!(outcome, ColdStartOutcome::RemoteUndecodable);
        assert_eq!(store.snapshot(), names(&["X"]));
        assert_eq!(remote.get("farm/members").await.unwrap(), Some(json!({"unexpected": true})));
    }

    #[tokio::test]
    async fn test_update_applies_locally_then_persists_in_order() {
        let remote = Arc::new(MemoryDocumentStore::new());
        let (store, _) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            Names::new(),
        )
        .await;

        let first = store.update(|current| {
            let mut next = current.clone();
            next.push("A".to_string());
            next
        });
        assert_eq!(store.snapshot(), names(&["A"]));

        let second = store.update(|current| {
            let mut next = current.clone();
            next.push("B".to_string());
            next
        });
        first.settle().await.unwrap();
        second.settle().await.unwrap();

        assert_eq!(remote.get("farm/members").await.unwrap(), Some(json!(["A", "B"])));
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_writes() {
        let remote = Arc::new(MemoryDocumentStore::new());
        let (store, _) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            Names::new(),
        )
        .await;

        let _ = store.set(names(&["A"]));
        let _ = store.set(names(&["A", "B"]));
        store.flush().await;
        assert_eq!(remote.get("farm/members").await.unwrap(), Some(json!(["A", "B"])));
    }

    #[tokio::test]
    async fn test_rollback_if_only_when_unchanged() {
        let remote = Arc::new(MemoryDocumentStore::new());
        let (store, _) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            names(&["A"]),
        )
        .await;

        let _ = store.set(names(&["B"]));
        assert!(!store.rollback_if(&names(&["X"]), names(&["A"])));
        assert!(store.rollback_if(&names(&["B"]), names(&["A"])));
        assert_eq!(store.snapshot(), names(&["A"]));
    }

    #[tokio::test]
    async fn test_rejected_update_changes_nothing() {
        let remote = Arc::new(MemoryDocumentStore::new());
        let (store, _) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            names(&["A"]),
        )
        .await;
        let before = store.revision();

        let result: Result<PendingWrite, &str> = store.try_update(|_| Err("invalid"));
        assert!(result.is_err());
        assert!(store.update_if(|_| None).is_none());
        assert_eq!(store.revision(), before);
        assert_eq!(store.snapshot(), names(&["A"]));
    }

    #[tokio::test]
    async fn test_remote_notifications_overwrite_local() {
        let remote = Arc::new(MemoryDocumentStore::new());
        let (store, _) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            names(&["Default"]),
        )
        .await;
        let rx = store.watch();

        remote.set("farm/members", json!(["Peer"])).await.unwrap();
        eventually(&store, names(&["Peer"])).await;
        assert!(*rx.borrow() > 0);

        // 格式错误的通知与监听错误都不改变本地值
        remote.set("farm/members", json!({"bad": 1})).await.unwrap();
        remote.inject_listener_error("farm/members", "permission denied");
        remote.set("farm/members", json!(["Peer", "Two"])).await.unwrap();
        eventually(&store, names(&["Peer", "Two"])).await;

        // 远端删除 → 重置为默认值
        remote.remove_document("farm/members").unwrap();
        eventually(&store, names(&["Default"])).await;
    }

    #[tokio::test]
    async fn test_own_echo_does_not_roll_back_newer_edits() {
        let remote = Arc::new(MemoryDocumentStore::new());
        let (store, _) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            Names::new(),
        )
        .await;

        let mut last = None;
        for name in ["A", "B", "C"] {
            last = Some(store.update(|current| {
                let mut next = current.clone();
                next.push(name.to_string());
                next
            }));
            tokio::task::yield_now().await;
            assert_eq!(store.snapshot().last().map(String::as_str), Some(name));
        }
        if let Some(write) = last {
            write.settle().await.unwrap();
        }

        eventually(&store, names(&["A", "B", "C"])).await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.unacked_writes() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("回显未确认");
        assert_eq!(remote.get("farm/members").await.unwrap(), Some(json!(["A", "B", "C"])));
    }

    #[tokio::test]
    async fn test_lost_echo_resyncs_from_remote() {
        let remote = Arc::new(BusyRemote::default());
        let (store, _) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            Names::new(),
        )
        .await;

        // 自己的回显之后紧跟大量他人写入, 订阅通道溢出
        remote.burst_after_next_set.store(100, Ordering::SeqCst);
        store.set(names(&["mine"])).settle().await.unwrap();

        eventually(&store, names(&["peer-99"])).await;
        assert_eq!(store.unacked_writes(), 0);

        remote.inner.set("farm/members", json!(["peer-final"])).await.unwrap();
        eventually(&store, names(&["peer-final"])).await;
    }

    #[tokio::test]
    async fn test_writes_without_listener_are_not_tracked() {
        let remote = Arc::new(BusyRemote::default());
        remote.fail_subscribe.store(true, Ordering::SeqCst);
        let (store, outcome) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            Names::new(),
        )
        .await;
        assert_eq!(outcome, ColdStartOutcome::SeededDefault { persisted: true });
        assert!(!store.is_listening());

        for i in 0..200 {
            store.set(names(&[format!("m{}", i).as_str()])).settle().await.unwrap();
        }
        assert_eq!(store.unacked_writes(), 0);
        assert_eq!(remote.get("farm/members").await.unwrap(), Some(json!(["m199"])));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_echo_tracking() {
        let remote = Arc::new(MemoryDocumentStore::new());
        let (store, _) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            Names::new(),
        )
        .await;

        store.unsubscribe();
        for i in 0..50 {
            let _ = store.set(names(&[format!("m{}", i).as_str()]));
        }
        store.flush().await;
        assert_eq!(store.unacked_writes(), 0);
        assert_eq!(store.snapshot(), names(&["m49"]));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let remote = Arc::new(MemoryDocumentStore::new());
        let (store, _) = SharedStateStore::open(
            SlotKey::new("farm", "members"),
            remote.clone(),
            Arc::new(MemoryFallbackStore::new()),
            Names::new(),
        )
        .await;
        assert!(store.is_listening());
        assert_eq!(remote.subscriber_count("farm/members"), 1);

        drop(store);
        tokio::time::timeout(Duration::from_secs(2), async {
            while remote.subscriber_count("farm/members") > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("监听任务未退出");
    }
}
