// ==========================================
// 农场配额追踪 - 命令行入口
// ==========================================
// 用法:
//   farm-control [--db <path>] status
//   farm-control [--db <path>] members
//   farm-control [--db <path>] add-member <name>
//   farm-control [--db <path>] remove-member <index>
//   farm-control [--db <path>] set-target <product> <quantity>
//   farm-control [--db <path>] deliver <material> <member_index> <quantity>
//   farm-control [--db <path>] close-cycle
//   farm-control [--db <path>] history
//   farm-control [--db <path>] export <entry_id>
//   farm-control [--db <path>] delete-history <entry_id> --yes
//   farm-control [--db <path>] config [<key> <value>]
// ==========================================

use anyhow::{anyhow, bail, Context};
use farm_control::app::{get_default_db_path, AppState};
use farm_control::config::ConfigManager;
use farm_control::i18n::t;
use farm_control::repository::{SqliteDocumentStore, SqliteFallbackStore};
use std::sync::Arc;

const USAGE: &str = "用法: farm-control [--db <path>] <status|members|add-member|remove-member|set-target|deliver|close-cycle|history|export|delete-history|config> [参数...]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    farm_control::logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = match args.iter().position(|a| a == "--db") {
        Some(pos) => {
            if pos + 1 >= args.len() {
                bail!("--db 缺少路径参数");
            }
            let path = args.remove(pos + 1);
            args.remove(pos);
            path
        }
        None => get_default_db_path(),
    };
    let Some(command) = args.first().cloned() else {
        println!("{}", USAGE);
        return Ok(());
    };
    let params = &args[1..];

    tracing::info!(version = farm_control::VERSION, db_path = %db_path, command = %command, "{}", farm_control::APP_NAME);

    let config_manager =
        ConfigManager::new(&db_path).map_err(|e| anyhow!("无法打开配置: {}", e))?;

    if command == "config" {
        return run_config(&config_manager, params);
    }

    let config = config_manager
        .load_farm_config()
        .map_err(|e| anyhow!("无法加载配置: {}", e))?;
    let remote = Arc::new(SqliteDocumentStore::new(&db_path).context("无法打开文档存储")?);
    let fallback = Arc::new(SqliteFallbackStore::new(&db_path).context("无法打开回退存储")?);

    let app = AppState::connect(remote, fallback, config).await;
    let result = run_command(&app, &command, params).await;
    app.shutdown().await;
    result
}

fn run_config(manager: &ConfigManager, params: &[String]) -> anyhow::Result<()> {
    match params {
        [] => {
            let snapshot = manager
                .get_config_snapshot()
                .map_err(|e| anyhow!("读取配置失败: {}", e))?;
            println!("{}", snapshot);
        }
        [key, value] => {
            manager
                .set_config_value(key, value)
                .map_err(|e| anyhow!("写入配置失败: {}", e))?;
            println!("{}", t("common.success"));
        }
        _ => bail!("用法: farm-control config [<key> <value>]"),
    }
    Ok(())
}

async fn run_command(app: &AppState, command: &str, params: &[String]) -> anyhow::Result<()> {
    match (command, params) {
        ("status", []) => {
            let overview = app.dashboard.overview();
            println!("{}", serde_json::to_string_pretty(&overview)?);
            for (rank, standing) in app.dashboard.ranking().iter().enumerate() {
                println!(
                    "{:>2}. {:<16} {:>6}/{:<6} {:>3}%  {}",
                    rank + 1,
                    standing.name,
                    standing.total_delivered,
                    standing.total_target,
                    standing.percent,
                    t(standing.tier.label_key())
                );
            }
        }
        ("members", []) => {
            for (index, member) in app.membership.list().iter().enumerate() {
                println!("{:>2}  {}  {}", index, member.id, member.name);
            }
        }
        ("add-member", [name]) => {
            let id = app.membership.add(name).map_err(user_error)?;
            println!("{}", id);
        }
        ("remove-member", [index]) => {
            let index: usize = index.parse().context("成员序号必须为非负整数")?;
            let member = app.membership.remove(index).map_err(user_error)?;
            println!("{} {}", member.id, member.name);
        }
        ("set-target", [product, quantity]) => {
            app.delivery
                .set_production_target(product, quantity)
                .map_err(user_error)?;
            println!("{}", t("common.success"));
        }
        ("deliver", [material, index, quantity]) => {
            let index: usize = index.parse().context("成员序号必须为非负整数")?;
            let written = app
                .delivery
                .set_delivery(material, index, quantity)
                .map_err(user_error)?;
            if !written {
                bail!("台账中无此单元格: {} / {}", material, index);
            }
            println!("{}", t("common.success"));
        }
        ("close-cycle", []) => {
            let report = app.archive.close_cycle().await.map_err(user_error)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ("history", []) => {
            for entry in app.archive.history().await.map_err(user_error)? {
                println!("{}  {}  {}", entry.id, entry.label(), entry.closed_at.to_rfc3339());
            }
        }
        ("export", [id]) => {
            let csv = app.archive.export_csv(id).await.map_err(user_error)?;
            print!("{}", csv);
        }
        ("delete-history", [id, rest @ ..]) => {
            let confirmed = rest.iter().any(|a| a == "--yes");
            app.archive
                .delete_entry(id, confirmed)
                .await
                .map_err(user_error)?;
            println!("{}", t("common.success"));
        }
        _ => bail!("{}", USAGE),
    }
    Ok(())
}

fn user_error(err: farm_control::ApiError) -> anyhow::Error {
    anyhow!(err.user_message())
}
