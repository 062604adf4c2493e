//! 本地文件指纹，与 S3 的 ETag 计算方式保持一致
//!
//! 不超过分块大小的文件：整个内容的 MD5（hex）。
//! 超过分块大小的文件：每块 MD5 原始摘要拼接后再做 MD5，后缀 `-<块数>`。

use crate::error::{io_err, SyncError};
use crate::storage::LocalFile;
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// 默认分块大小，上传分块和指纹计算必须使用同一个值
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// S3 分块的最小值，opendal 会把更小的分块静默调大到这个值
pub const MIN_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// S3 单个分块的最大值
pub const MAX_CHUNK_SIZE: u64 = 5 * 1024 * 1024 * 1024;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// 已计算指纹的本地文件
#[derive(Debug, Clone)]
pub struct HashedFile {
    pub file: LocalFile,
    pub fingerprint: String,
}

impl LocalFile {
    /// 计算指纹（阻塞 IO，在 blocking 线程中调用）
    pub fn ensure_fingerprint(self, chunk_size: u64) -> Result<HashedFile, SyncError> {
        let fingerprint = fingerprint_file(&self.full_path, chunk_size)?;
        Ok(HashedFile {
            file: self,
            fingerprint,
        })
    }
}

/// 计算文件指纹
pub fn fingerprint_file(path: &Path, chunk_size: u64) -> Result<String, SyncError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    fingerprint_reader(file, chunk_size).map_err(|e| io_err(path, e))
}

/// 从任意 reader 计算指纹
pub fn fingerprint_reader<R: Read>(mut reader: R, chunk_size: u64) -> io::Result<String> {
    if chunk_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "chunk size must be greater than zero",
        ));
    }

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut parts: Vec<Vec<u8>> = Vec::new();

    loop {
        let mut hasher = Md5::new();
        let n = hash_chunk(&mut reader, &mut hasher, &mut buf, chunk_size)?;
        if n == 0 && !parts.is_empty() {
            break;
        }
        parts.push(hasher.finalize().to_vec());
        if n < chunk_size {
            break;
        }
    }

    // 只有一块时上传走单次 PUT，ETag 为普通 MD5
    if parts.len() == 1 {
        return Ok(hex::encode(&parts[0]));
    }

    let mut combined = Md5::new();
    for digest in &parts {
        combined.update(digest);
    }
    Ok(format!("{}-{}", hex::encode(combined.finalize()), parts.len()))
}

/// 读取最多 `limit` 字节送入 hasher，返回实际读取的字节数
fn hash_chunk<R: Read>(
    reader: &mut R,
    hasher: &mut Md5,
    buf: &mut [u8],
    limit: u64,
) -> io::Result<u64> {
    let mut read = 0u64;
    while read < limit {
        let want = (limit - read).min(buf.len() as u64) as usize;
        let n = match reader.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        read += n as u64;
    }
    Ok(read)
}

/// 去掉存储返回的引号（以及弱 ETag 前缀）
pub fn normalize_etag(etag: &str) -> &str {
    etag.trim().trim_start_matches("W/").trim_matches('"')
}
