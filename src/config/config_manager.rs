// ==========================================
// 农场配额追踪 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 约定: 缺失或格式错误的配置项回落到默认值并告警, 不中断启动
// ==========================================

use crate::config::farm_config::FarmConfig;
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::production::{ProductionTargets, RecipeTable};
use crate::domain::types::QuotaMode;
use crate::engine::ranking::TierPolicy;
use crate::i18n::is_supported_locale;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
            init_schema(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值 (存在则覆盖)
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key"
        )?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    // ===== 农场配置 =====

    /// 读取完整的农场配置
    pub fn load_farm_config(&self) -> Result<FarmConfig, Box<dyn Error>> {
        let defaults = FarmConfig::default();

        let namespace = match self.get_config_value(config_keys::NAMESPACE)? {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => defaults.namespace,
        };

        let quota_mode = match self.get_config_value(config_keys::QUOTA_MODE)? {
            Some(raw) => QuotaMode::parse(&raw).unwrap_or_else(|| {
                warn_invalid(config_keys::QUOTA_MODE, &raw);
                defaults.quota_mode
            }),
            None => defaults.quota_mode,
        };

        let tier_policy = match self.get_config_value(config_keys::TIER_POLICY)? {
            Some(raw) => parse_tier_policy(&raw).unwrap_or_else(|| {
                warn_invalid(config_keys::TIER_POLICY, &raw);
                defaults.tier_policy
            }),
            None => defaults.tier_policy,
        };

        let partial_ratio_pct = match self.get_config_value(config_keys::PARTIAL_RATIO_PCT)? {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(pct) if (1..=100).contains(&pct) => pct,
                _ => {
                    warn_invalid(config_keys::PARTIAL_RATIO_PCT, &raw);
                    defaults.partial_ratio_pct
                }
            },
            None => defaults.partial_ratio_pct,
        };

        let recipe_table = match self.get_config_value(config_keys::RECIPE_TABLE)? {
            Some(raw) => match serde_json::from_str::<RecipeTable>(&raw) {
                Ok(table) if !table.is_empty() => table,
                _ => {
                    warn_invalid(config_keys::RECIPE_TABLE, &raw);
                    defaults.recipe_table
                }
            },
            None => defaults.recipe_table,
        };

        let default_production = match self.get_config_value(config_keys::DEFAULT_PRODUCTION)? {
            Some(raw) => match serde_json::from_str::<BTreeMap<String, u64>>(&raw) {
                Ok(values) => {
                    let mut targets = ProductionTargets::new();
                    for (product, qty) in values {
                        targets.set(&product, qty.into());
                    }
                    targets
                }
                Err(_) => {
                    warn_invalid(config_keys::DEFAULT_PRODUCTION, &raw);
                    defaults.default_production
                }
            },
            None => defaults.default_production,
        };

        let default_members = match self.get_config_value(config_keys::DEFAULT_MEMBERS)? {
            Some(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(names) => names,
                Err(_) => {
                    warn_invalid(config_keys::DEFAULT_MEMBERS, &raw);
                    defaults.default_members
                }
            },
            None => defaults.default_members,
        };

        let locale = match self.get_config_value(config_keys::LOCALE)? {
            Some(raw) if is_supported_locale(raw.trim()) => raw.trim().to_string(),
            Some(raw) => {
                warn_invalid(config_keys::LOCALE, &raw);
                defaults.locale
            }
            None => defaults.locale,
        };

        Ok(FarmConfig {
            namespace,
            quota_mode,
            tier_policy,
            partial_ratio_pct,
            recipe_table,
            default_production,
            default_members,
            locale,
        })
    }
}

fn warn_invalid(key: &str, raw: &str) {
    tracing::warn!(
        config_key = key,
        raw_value = %raw,
        "配置格式错误，使用默认值"
    );
}

/// STANDARD | LENIENT | {"top":..,"second":..,"third":..}
fn parse_tier_policy(raw: &str) -> Option<TierPolicy> {
    match raw.trim().to_uppercase().as_str() {
        "STANDARD" => Some(TierPolicy::standard()),
        "LENIENT" => Some(TierPolicy::lenient()),
        _ => serde_json::from_str::<TierPolicy>(raw)
            .ok()
            .filter(|policy| policy.is_valid()),
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 文档键前缀
    pub const NAMESPACE: &str = "namespace";

    // 配额与排名
    pub const QUOTA_MODE: &str = "quota_mode";           // EVEN_SPLIT | MANUAL
    pub const TIER_POLICY: &str = "tier_policy";         // STANDARD | LENIENT | JSON
    pub const PARTIAL_RATIO_PCT: &str = "partial_ratio_pct";

    // 默认数据 (JSON)
    pub const RECIPE_TABLE: &str = "recipe_table";
    pub const DEFAULT_PRODUCTION: &str = "default_production";
    pub const DEFAULT_MEMBERS: &str = "default_members";

    // 界面语言
    pub const LOCALE: &str = "locale";
}
