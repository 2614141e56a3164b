// ==========================================
// 车队排班导入系统 - 命令行入口
// ==========================================
// 职责: 参数解析 → 组装 ImportService → 输出 JSON 结果
// 说明: 日志写 stderr，结果写 stdout
// ==========================================

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fleet_import::config::{ConfigManager, ConfigScope};
use fleet_import::db::open_shared_database;
use fleet_import::domain::{Actor, ColumnMapping};
use fleet_import::importer::{templates, ImportService, UploadRequest};
use fleet_import::{logging, ImportType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 车队 / 排班数据导入对账工具
#[derive(Parser)]
#[command(name = "fleet-import")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite 数据库路径
    #[arg(long, global = true, env = "FLEET_IMPORT_DB")]
    db: Option<PathBuf>,

    /// 工作区 ID
    #[arg(short, long, global = true, env = "FLEET_IMPORT_WORKSPACE", default_value = "default")]
    workspace: String,

    /// 操作人
    #[arg(short, long, global = true, env = "FLEET_IMPORT_USER", default_value = "cli")]
    user: String,

    /// 以 JSON 行格式输出日志
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 上传文件并生成预览
    Upload {
        /// 待导入文件
        file: PathBuf,

        /// 导入类型: FLEET / SHIFTS
        #[arg(short = 't', long, value_parser = parse_import_type)]
        import_type: ImportType,

        /// 映射模板名
        #[arg(long)]
        template: Option<String>,

        /// 显式列映射，格式 源表头=字段（字段留空表示忽略该列），可重复
        #[arg(short, long = "map")]
        maps: Vec<String>,

        /// 工作表名（仅电子表格）
        #[arg(long)]
        sheet: Option<String>,

        /// 声明的 MIME 类型
        #[arg(long)]
        mime: Option<String>,
    },

    /// 修改预览批次的列映射并重算差异
    Remap {
        batch_id: String,

        #[arg(long)]
        template: Option<String>,

        #[arg(short, long = "map")]
        maps: Vec<String>,
    },

    /// 查看批次
    Show {
        batch_id: String,

        /// 输出完整差异记录
        #[arg(long)]
        records: bool,
    },

    /// 列出工作区批次
    List {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 接受预览并应用（APPLYING 状态下重试即恢复）
    Accept { batch_id: String },

    /// 拒绝预览
    Decline { batch_id: String },

    /// 回滚已应用批次
    Rollback { batch_id: String },

    /// 列出批次变更集
    ChangeSets { batch_id: String },

    /// 列出映射模板
    Templates {
        #[arg(short = 't', long, value_parser = parse_import_type)]
        import_type: Option<ImportType>,
    },

    /// 配置管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 写入配置
    Set {
        key: String,
        value: String,
        /// 写入当前工作区作用域（默认 global）
        #[arg(long)]
        workspace_scope: bool,
    },
    /// 读取生效配置（工作区 → global）
    Get { key: String },
    /// 列出作用域内全部配置
    List {
        #[arg(long)]
        workspace_scope: bool,
    },
}

fn parse_import_type(raw: &str) -> Result<ImportType, String> {
    ImportType::parse(raw).ok_or_else(|| format!("未知导入类型: {}（可选 FLEET / SHIFTS）", raw))
}

fn parse_mapping(template: Option<String>, maps: &[String]) -> Result<ColumnMapping> {
    let mut columns = BTreeMap::new();
    for entry in maps {
        let Some((header, field)) = entry.split_once('=') else {
            bail!("列映射格式错误: {}（应为 源表头=字段）", entry);
        };
        columns.insert(header.trim().to_string(), field.trim().to_string());
    }
    Ok(ColumnMapping { template, columns })
}

/// 数据库路径: --db / FLEET_IMPORT_DB → 用户数据目录
fn resolve_db_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    let mut path = PathBuf::from("./fleet_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("fleet-import");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("无法创建数据目录: {}", dir.display()))?;
        path = dir.join("fleet_import.db");
    }
    Ok(path)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn run_config(config: &ConfigManager, actor: &Actor, action: ConfigAction) -> Result<()> {
    let scope_of = |workspace_scope: bool| {
        if workspace_scope {
            ConfigScope::Workspace(actor.workspace_id.clone())
        } else {
            ConfigScope::Global
        }
    };

    match action {
        ConfigAction::Set {
            key,
            value,
            workspace_scope,
        } => {
            config.set_config_value(&scope_of(workspace_scope), &key, &value)?;
            println!("{} = {}", key, value);
        }
        ConfigAction::Get { key } => match config.get_effective_value(&actor.workspace_id, &key)? {
            Some(value) => println!("{}", value),
            None => bail!("配置不存在: {}", key),
        },
        ConfigAction::List { workspace_scope } => {
            print_json(&config.list_scope(&scope_of(workspace_scope))?)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    let db_path = resolve_db_path(cli.db)?;
    let db_path_str = db_path.to_string_lossy().into_owned();
    tracing::debug!(db_path = %db_path_str, version = fleet_import::VERSION, "打开数据库");

    let conn = open_shared_database(&db_path_str)
        .with_context(|| format!("无法打开数据库: {}", db_path_str))?;
    let config = ConfigManager::from_connection(conn.clone());
    let actor = Actor::new(cli.user, cli.workspace);
    let service = ImportService::with_defaults(conn.clone(), ConfigManager::from_connection(conn));

    match cli.command {
        Commands::Upload {
            file,
            import_type,
            template,
            maps,
            sheet,
            mime,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("无法读取文件: {}", file.display()))?;
            let request = UploadRequest {
                import_type,
                file_name: file_name_of(&file),
                mime_type: mime,
                bytes,
                sheet_name: sheet,
                mapping: parse_mapping(template, &maps)?,
            };
            let batch = service.upload(&actor, request).await?;
            print_json(&batch)?;
        }
        Commands::Remap {
            batch_id,
            template,
            maps,
        } => {
            let batch = service
                .update_mapping(&actor, &batch_id, parse_mapping(template, &maps)?)
                .await?;
            print_json(&batch)?;
        }
        Commands::Show { batch_id, records } => {
            let mut batch = service.get_batch(&actor, &batch_id)?;
            if !records {
                if let Some(diff) = batch.diff_summary.as_mut() {
                    diff.records.clear();
                }
            }
            print_json(&batch)?;
        }
        Commands::List { limit } => {
            for batch in service.list_batches(&actor, limit)? {
                println!(
                    "{}  {:<12} {:<7} {}  {}",
                    batch.batch_id,
                    batch.status,
                    batch.import_type,
                    batch.created_at.format("%Y-%m-%d %H:%M:%S"),
                    batch.file_name
                );
            }
        }
        Commands::Accept { batch_id } => print_json(&service.accept(&actor, &batch_id).await?)?,
        Commands::Decline { batch_id } => print_json(&service.decline(&actor, &batch_id).await?)?,
        Commands::Rollback { batch_id } => print_json(&service.rollback(&actor, &batch_id).await?)?,
        Commands::ChangeSets { batch_id } => print_json(&service.list_change_sets(&actor, &batch_id)?)?,
        Commands::Templates { import_type } => {
            for template in templates()
                .iter()
                .filter(|t| import_type.map_or(true, |it| t.import_type == it))
            {
                println!("{:<20} {:<8} {}", template.name, template.import_type, template.description);
            }
        }
        Commands::Config { action } => run_config(&config, &actor, action)?,
    }

    Ok(())
}
