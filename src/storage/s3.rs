use super::{PutRequest, RemoteObject, RemoteStore, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::core::fingerprint::normalize_etag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use md5::{Digest, Md5};
use opendal::services::S3;
use opendal::{layers::TimeoutLayer, Metakey, Operator, Writer};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::warn;

/// 未配置 region 时使用的默认值
pub const DEFAULT_REGION: &str = "us-east-1";

/// 同时进行的单个删除请求数
const DELETE_CONCURRENCY: usize = 16;

/// 基于 opendal 的 S3 存储
pub struct S3Store {
    operator: Operator,
    name: String,
}

impl S3Store {
    /// 凭证从标准 AWS 环境变量 / 配置文件加载
    pub fn new(bucket: &str, region: Option<&str>, endpoint: Option<&str>) -> Result<Self> {
        let mut builder = S3::default().region(region.unwrap_or(DEFAULT_REGION));
        if let Some(ep) = endpoint {
            builder = builder.endpoint(ep);
        }
        Self::with_builder(builder, bucket)
    }

    fn with_builder(builder: S3, bucket: &str) -> Result<Self> {
        // key 前缀由调用方处理，这里固定根目录
        let builder = builder.bucket(bucket).root("/");

        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        Ok(Self {
            operator,
            name: format!("s3://{}", bucket),
        })
    }

    /// 分块上传：每块大小与指纹计算的分块一致
    async fn put_multipart(&self, request: &PutRequest) -> Result<()> {
        let mut future = self
            .operator
            .writer_with(&request.key)
            .chunk(request.chunk_size as usize)
            .content_type(&request.content_type);
        if let Some(cc) = &request.cache_control {
            future = future.cache_control(cc);
        }
        let mut writer = future.await?;

        if let Err(e) = Self::copy_chunks(&mut writer, request).await {
            // 放弃未完成的分块上传，避免残留
            if let Err(abort_err) = writer.abort().await {
                warn!("取消分块上传失败 {}: {}", request.key, abort_err);
            }
            return Err(e);
        }

        writer.close().await?;
        Ok(())
    }

    /// 单次 PUT 后核对存储记录的 ETag 与本地内容 MD5
    async fn verify_etag(&self, key: &str, expected: &str) -> Result<()> {
        let meta = self.operator.stat(key).await?;
        match meta.etag().map(normalize_etag) {
            Some(etag) if etag == expected => Ok(()),
            Some(etag) => anyhow::bail!("上传内容校验失败 {}: 本地 {} 远程 {}", key, expected, etag),
            None => {
                warn!("存储未返回 ETag，跳过校验 {}", key);
                Ok(())
            }
        }
    }

    async fn copy_chunks(writer: &mut Writer, request: &PutRequest) -> Result<()> {
        let mut file = tokio::fs::File::open(&request.source)
            .await
            .with_context(|| format!("打开文件失败: {}", request.source.display()))?;

        loop {
            let mut buf = Vec::with_capacity(request.chunk_size as usize);
            let n = (&mut file)
                .take(request.chunk_size)
                .read_to_end(&mut buf)
                .await
                .with_context(|| format!("读取文件失败: {}", request.source.display()))?;
            if n == 0 {
                break;
            }
            writer.write(buf).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();

        // lister 会自动跟随 continuation token 直到结束
        let mut lister = self
            .operator
            .lister_with(prefix)
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::Etag | Metakey::Mode)
            .await?;

        while let Some(entry) = lister.try_next().await? {
            let meta = entry.metadata();
            if meta.is_dir() {
                continue;
            }

            objects.push(RemoteObject {
                key: entry.path().trim_start_matches('/').to_string(),
                size: meta.content_length(),
                etag: meta.etag().unwrap_or_default().to_string(),
            });
        }

        Ok(objects)
    }

    async fn put_object(&self, request: &PutRequest) -> Result<()> {
        if request.is_multipart() {
            return self.put_multipart(request).await;
        }

        let data = tokio::fs::read(&request.source)
            .await
            .with_context(|| format!("读取文件失败: {}", request.source.display()))?;
        let expected = hex::encode(Md5::digest(&data));

        let mut future = self
            .operator
            .write_with(&request.key, data)
            .content_type(&request.content_type);
        if let Some(cc) = &request.cache_control {
            future = future.cache_control(cc);
        }
        future.await?;

        self.verify_etag(&request.key, &expected).await
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<String>> {
        // 逐个删除，以便知道每个 key 的结果
        let outcomes: Vec<(String, opendal::Result<()>)> = futures::stream::iter(keys.iter().cloned())
            .map(|key| async move {
                let result = self.operator.delete(&key).await;
                (key, result)
            })
            .buffer_unordered(DELETE_CONCURRENCY)
            .collect()
            .await;

        let mut deleted = Vec::with_capacity(keys.len());
        let mut first_error = None;
        for (key, result) in outcomes {
            match result {
                Ok(()) => deleted.push(key),
                Err(e) => {
                    warn!("删除失败 {}: {}", key, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if deleted.is_empty() {
            if let Some(e) = first_error {
                return Err(e).context(format!("{} 个对象全部删除失败", keys.len()));
            }
        }

        // 保持与请求相同的顺序
        deleted.sort_by_key(|k| keys.iter().position(|x| x == k));
        Ok(deleted)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
