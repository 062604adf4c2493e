use bucketsync_lib::logging::{init_logging, LogConfig};
use bucketsync_lib::{LocalTree, S3Store, SyncConfig, SyncEngine, SyncOptions};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// 将本地目录同步到 S3 bucket
#[derive(Debug, Parser)]
#[command(name = "bucketsync", version, about)]
struct Cli {
    /// JSON 配置文件，命令行参数覆盖其中的值
    #[arg(long)]
    config: Option<PathBuf>,

    /// 目标 bucket
    #[arg(long, env = "BUCKETSYNC_BUCKET")]
    bucket: Option<String>,

    /// 远程 key 前缀（直接拼接，例如 "site/"）
    #[arg(long)]
    prefix: Option<String>,

    /// 本地源目录
    #[arg(long)]
    dir: Option<PathBuf>,

    /// 包含规则，可重复
    #[arg(long = "include", value_name = "GLOB")]
    includes: Vec<String>,

    /// 排除规则，可重复
    #[arg(long = "exclude", value_name = "GLOB")]
    excludes: Vec<String>,

    /// 上传优先级，逗号分隔的 glob 列表
    #[arg(long)]
    order: Option<String>,

    /// Cache-Control 规则 `glob=value`，可重复
    #[arg(long = "cache-control", value_name = "GLOB=VALUE")]
    cache_control: Vec<String>,

    /// 远程已存在的文件也全部上传
    #[arg(long)]
    force_upload: bool,

    /// 删除远程多余的文件
    #[arg(long)]
    delete_orphaned: bool,

    /// 删除前等待的毫秒数
    #[arg(long, value_name = "MILLIS")]
    wait_before_delete: Option<u64>,

    /// 只打印将执行的操作
    #[arg(long)]
    dry_run: bool,

    /// 最大并发上传数
    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// S3 兼容服务的 endpoint
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    endpoint: Option<String>,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 额外写入的日志文件
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// 合并配置文件与命令行参数
    fn into_options(self) -> anyhow::Result<SyncOptions> {
        let mut options = match &self.config {
            Some(path) => SyncOptions::load(path)?,
            None => SyncOptions::default(),
        };

        if let Some(bucket) = self.bucket {
            options.bucket = bucket;
        }
        if let Some(prefix) = self.prefix {
            options.prefix = prefix;
        }
        if let Some(dir) = self.dir {
            options.dir = dir;
        }
        if !self.includes.is_empty() {
            options.includes = self.includes;
        }
        if !self.excludes.is_empty() {
            options.excludes = self.excludes;
        }
        if let Some(order) = self.order {
            options.order = order;
        }
        if !self.cache_control.is_empty() {
            options.cache_control = self.cache_control;
        }
        options.force_upload |= self.force_upload;
        options.delete_orphaned |= self.delete_orphaned;
        options.dry_run |= self.dry_run;
        if let Some(wait) = self.wait_before_delete {
            options.wait_before_delete = wait;
        }
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency;
        }
        if self.region.is_some() {
            options.region = self.region;
        }
        if self.endpoint.is_some() {
            options.endpoint = self.endpoint;
        }

        options.validate()?;
        Ok(options)
    }
}

async fn run(options: SyncOptions) -> anyhow::Result<()> {
    let config = SyncConfig::from_options(&options)?;
    let store = S3Store::new(
        &options.bucket,
        options.region.as_deref(),
        options.endpoint.as_deref(),
    )?;

    let engine = SyncEngine::new(Arc::new(store), LocalTree::new(options.dir.clone()), config);
    engine.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: cli.log_level.clone(),
        file: cli.log_file.clone(),
        ..Default::default()
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("初始化日志失败: {}", e);
    }

    let result = match cli.into_options() {
        Ok(options) => run(options).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("同步失败: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
