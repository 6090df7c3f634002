// ==========================================
// 农场配额追踪 - 应用状态
// ==========================================
// 职责: 装配共享上下文与各 API 实例, 维护台账整形任务
// ==========================================

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::api::{
    ArchiveManager, ColdStartReport, DashboardApi, DeliveryApi, FarmContext, MembershipManager,
};
use crate::config::FarmConfig;
use crate::repository::fallback_store::FallbackStore;
use crate::repository::remote_store::RemoteDocumentStore;

/// 应用状态
///
/// 持有共享上下文和所有 API 实例
pub struct AppState {
    pub context: Arc<FarmContext>,

    /// 成员管理
    pub membership: Arc<MembershipManager>,

    /// 周期归档
    pub archive: Arc<ArchiveManager>,

    /// 录入
    pub delivery: Arc<DeliveryApi>,

    /// 看板
    pub dashboard: Arc<DashboardApi>,

    pub config: FarmConfig,

    /// 启动时各槽位的冷启动结果
    pub cold_start: ColdStartReport,

    shape_watcher: JoinHandle<()>,
}

impl AppState {
    /// 连接远端并完成冷启动
    ///
    /// # 说明
    /// 1. 按配置切换界面语言
    /// 2. 并发打开四个共享槽位
    /// 3. 首次整形台账
    /// 4. 启动后台任务: 名单/产量/目标/台账变化时重新整形
    pub async fn connect(
        remote: Arc<dyn RemoteDocumentStore>,
        fallback: Arc<dyn FallbackStore>,
        config: FarmConfig,
    ) -> Self {
        tracing::info!(namespace = %config.namespace, locale = %config.locale, "初始化AppState");
        crate::i18n::set_locale(&config.locale);

        let (context, cold_start) = FarmContext::open(remote, fallback, &config).await;
        tracing::info!(?cold_start, "冷启动完成");

        let context = Arc::new(context);
        let _ = context.reconcile_ledger();
        let shape_watcher = spawn_shape_watcher(Arc::clone(&context));

        Self {
            membership: Arc::new(MembershipManager::new(Arc::clone(&context))),
            archive: Arc::new(ArchiveManager::new(Arc::clone(&context))),
            delivery: Arc::new(DeliveryApi::new(Arc::clone(&context))),
            dashboard: Arc::new(DashboardApi::new(Arc::clone(&context))),
            context,
            config,
            cold_start,
            shape_watcher,
        }
    }

    /// 停止后台任务与远端监听, 并等待已入队写入落定
    pub async fn shutdown(&self) {
        self.shape_watcher.abort();
        self.context.unsubscribe_all();
        self.context.flush().await;
        tracing::info!("AppState已关闭");
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.shape_watcher.abort();
    }
}

/// 任一影响台账形状的槽位变化后, 重新整形台账 (形状一致时不写入)
fn spawn_shape_watcher(context: Arc<FarmContext>) -> JoinHandle<()> {
    let [mut roster, mut production, mut goals, mut ledger] = context.shape_watchers();
    tokio::spawn(async move {
        loop {
            let changed = tokio::select! {
                r = roster.changed() => r,
                r = production.changed() => r,
                r = goals.changed() => r,
                r = ledger.changed() => r,
            };
            if changed.is_err() {
                tracing::debug!("槽位已关闭, 台账整形任务退出");
                break;
            }
            roster.borrow_and_update();
            production.borrow_and_update();
            goals.borrow_and_update();
            ledger.borrow_and_update();

            if context.reconcile_ledger().is_some() {
                tracing::debug!("远端变化触发台账整形");
            }
        }
    })
}

/// 获取默认数据库路径
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径
    if let Ok(path) = std::env::var("FARM_CONTROL_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./farm_control.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("farm-control");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("farm_control.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }
}
