//! 结果写入服务 - 业务能力层
//!
//! 只负责"把一条结果追加为 JSONL 的一行"能力，不关心批次和顺序

use async_trait::async_trait;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SinkError;
use crate::models::ResultRecord;

/// 结果输出目标
///
/// 调度器在每道题完成时调用 `append`，多个 worker 可能同时调用。
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn append(&self, record: &ResultRecord) -> Result<(), SinkError>;
}

/// JSONL 追加写入器
///
/// "序列化 + 写入 + flush" 在同一把锁内完成，并发写入不会交错，
/// 中途崩溃时文件中保留的是已完成结果的完整行。
pub struct JsonlWriter<W = File> {
    path: String,
    writer: Mutex<W>,
}

impl JsonlWriter<File> {
    /// 以追加模式打开（不存在则创建）
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| SinkError::WriteFailed {
                path: path_str.clone(),
                source,
            })?;

        Ok(Self::from_writer(path_str, file))
    }
}

impl<W> JsonlWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// 使用任意写入目标，`label` 仅用于日志和错误信息
    pub fn from_writer(label: impl Into<String>, writer: W) -> Self {
        Self {
            path: label.into(),
            writer: Mutex::new(writer),
        }
    }

    /// 取回底层写入目标
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> RecordSink for JsonlWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn append(&self, record: &ResultRecord) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().await;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let write_failed = |source| SinkError::WriteFailed {
            path: self.path.clone(),
            source,
        };
        writer.write_all(line.as_bytes()).await.map_err(write_failed)?;
        writer.flush().await.map_err(write_failed)?;

        debug!("写入结果: {} ({} 字节)", self.path, line.len());
        Ok(())
    }
}
