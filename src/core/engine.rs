use crate::config::SyncOptions;
use crate::core::comparator::{CompareConfig, FileComparator, SyncPlan};
use crate::core::glob::GlobFilter;
use crate::core::order::OrderRule;
use crate::core::rules::CacheControlRules;
use crate::core::transfer::{TransferConfig, TransferManager, UploadKind};
use crate::error::SyncError;
use crate::storage::{LocalFile, LocalTree, RemoteInventory, RemoteStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 同步配置（已编译的规则）
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 远程 key 前缀
    pub prefix: String,
    pub filter: GlobFilter,
    pub order: OrderRule,
    pub cache_control: CacheControlRules,
    pub force_upload: bool,
    pub delete_orphaned: bool,
    pub wait_before_delete: Duration,
    pub dry_run: bool,
    /// 最大并发上传数
    pub concurrency: usize,
    /// 分块大小（上传与指纹共用）
    pub chunk_size: u64,
}

impl SyncConfig {
    /// 从已校验的选项编译 glob 与规则
    pub fn from_options(options: &SyncOptions) -> Result<Self, SyncError> {
        options.validate()?;

        Ok(Self {
            prefix: options.prefix.clone(),
            filter: GlobFilter::new(&options.includes, &options.excludes)?,
            order: OrderRule::parse(&options.order)?,
            cache_control: CacheControlRules::parse(&options.cache_control)?,
            force_upload: options.force_upload,
            delete_orphaned: options.delete_orphaned,
            wait_before_delete: Duration::from_millis(options.wait_before_delete),
            dry_run: options.dry_run,
            concurrency: options.concurrency,
            chunk_size: options.chunk_size,
        })
    }
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub start_time: i64,
    pub end_time: i64,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub bytes_transferred: u64,
    pub dry_run: bool,
}

/// 同步引擎：列出 -> 比较 -> 上传 -> 删除
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    local: LocalTree,
    config: SyncConfig,
    transfer: TransferManager,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn RemoteStore>, local: LocalTree, config: SyncConfig) -> Self {
        let transfer = TransferManager::new(
            store.clone(),
            TransferConfig {
                prefix: config.prefix.clone(),
                concurrency: config.concurrency,
                chunk_size: config.chunk_size,
                dry_run: config.dry_run,
            },
            config.cache_control.clone(),
        );

        Self {
            store,
            local,
            config,
            transfer,
        }
    }

    /// 运行一次同步
    ///
    /// 列表、扫描、指纹或上传出错都会在删除阶段之前中止。
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let start_time = chrono::Utc::now().timestamp();

        info!(
            "同步 {} -> {}{} (includes={:?}, excludes={:?}, order={:?})",
            self.local.name(),
            self.store.name(),
            if self.config.prefix.is_empty() {
                String::new()
            } else {
                format!("/{}", self.config.prefix)
            },
            self.config.filter.includes(),
            self.config.filter.excludes(),
            self.config.order.patterns()
        );

        // 1) 列出阶段：远程与本地并发进行
        let (inventory, local_files) = tokio::try_join!(self.list_remote(), self.list_local())?;

        // 2) 比较阶段
        let plan = self.compare(local_files, inventory).await?;

        info!(
            "比较完成: {} 个新文件, {} 个已修改, {} 个未变化, {} 个孤立",
            plan.new_files.len(),
            plan.modified_files.len(),
            plan.unchanged.len(),
            plan.orphaned.len()
        );

        // 3) 同步阶段
        let mut bytes_transferred = 0;

        if !plan.new_files.is_empty() {
            info!("上传 {} 个新文件", plan.new_files.len());
            let summary = self
                .transfer
                .upload_all(&plan.new_files, UploadKind::New)
                .await?;
            bytes_transferred += summary.bytes_transferred;
        }

        if !plan.modified_files.is_empty() {
            info!(
                "上传 {} 个已修改文件 (force={})",
                plan.modified_files.len(),
                self.config.force_upload
            );
            let summary = self
                .transfer
                .upload_all(&plan.modified_files, UploadKind::Modified)
                .await?;
            bytes_transferred += summary.bytes_transferred;
        }

        let mut deleted = 0;
        if !plan.orphaned.is_empty() {
            self.transfer
                .wait_before_delete(plan.orphaned.len(), self.config.wait_before_delete)
                .await;
            info!("删除 {} 个孤立文件", plan.orphaned.len());
            let removed = self.transfer.delete_all(&plan.orphaned).await?;
            deleted = if self.config.dry_run {
                plan.orphaned.len()
            } else {
                removed.len()
            };
        }

        let report = SyncReport {
            start_time,
            end_time: chrono::Utc::now().timestamp(),
            added: plan.new_files.len(),
            updated: plan.modified_files.len(),
            deleted,
            unchanged: plan.unchanged.len(),
            bytes_transferred,
            dry_run: self.config.dry_run,
        };

        info!(
            "完成 ({} added, {} updated, {} deleted{})",
            report.added,
            report.updated,
            report.deleted,
            if report.dry_run { ", dry-run" } else { "" }
        );

        Ok(report)
    }

    /// 列出远程对象，去掉前缀并应用过滤
    async fn list_remote(&self) -> Result<RemoteInventory, SyncError> {
        let objects = self
            .store
            .list_objects(&self.config.prefix)
            .await
            .map_err(|e| SyncError::Listing {
                location: format!("{}/{}", self.store.name(), self.config.prefix),
                source: e.into(),
            })?;

        let mut inventory = RemoteInventory::from_listing(objects, &self.config.prefix);
        let listed = inventory.len();
        inventory.retain(|key| self.config.filter.is_match(key));
        debug!("远程文件: {} 个, 过滤后 {} 个", listed, inventory.len());

        Ok(inventory)
    }

    /// 列出本地文件，应用过滤后 stat
    async fn list_local(&self) -> Result<Vec<LocalFile>, SyncError> {
        let paths = self.local.list_files().await?;
        let listed = paths.len();
        let paths = self.config.filter.filter(paths);
        debug!("本地文件: {} 个, 过滤后 {} 个", listed, paths.len());

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(self.local.describe(&path).await?);
        }
        Ok(files)
    }

    /// 分类并排序，指纹计算在 blocking 线程中完成
    async fn compare(
        &self,
        files: Vec<LocalFile>,
        inventory: RemoteInventory,
    ) -> Result<SyncPlan, SyncError> {
        let comparator = FileComparator::new(CompareConfig {
            force_upload: self.config.force_upload,
            delete_orphaned: self.config.delete_orphaned,
            chunk_size: self.config.chunk_size,
        });

        let mut plan =
            tokio::task::spawn_blocking(move || comparator.compare(files, &inventory)).await??;

        self.config.order.sort(&mut plan.new_files);
        self.config.order.sort(&mut plan.modified_files);

        Ok(plan)
    }
}
