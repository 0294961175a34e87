//! 并发调度器 - 编排层
//!
//! ## 职责
//!
//! 把一批互不依赖的题目交给 `Responder`，限制同时进行的调用数量，
//! 按提交顺序返回结果，同时（可选）在每道题完成时立即追加写入 JSONL。
//!
//! ## 并发模型
//!
//! - 固定数量的 worker（`tokio::spawn`），从共享队列按提交顺序取题
//! - 每次调用先从共享的 `Semaphore` 取得一个名额，名额总数即最大并发数
//! - 调用在独立任务中执行；超时后该任务被 abort，名额随之归还。
//!   `BlockingResponder` 的线程无法中止，由线程自己持有名额直到结束，
//!   因此超时的阻塞调用仍计入并发数
//! - 单题失败（错误、超时、panic）只影响这一道题，结果中回复字段为空
//! - 写文件在 `RecordSink` 内部加锁，不同 worker 的写入不会交错
//!
//! ## 顺序
//!
//! 返回值按提交顺序（index）排列；JSONL 文件中的行按**完成顺序**排列，两者可能不同。

use futures::future::join_all;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, ResponderError};
use crate::logger::preview;
use crate::models::{BatchRequest, ResultRecord, WorkItem};
use crate::services::responder::with_invocation_slot;
use crate::services::{GenerationParams, RecordSink, Responder};

/// 默认单次调用超时
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// 进度回调
pub type ProgressCallback = Arc<dyn Fn(BatchProgress) + Send + Sync>;

/// 批次进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// 已完成数量（含失败）
    pub completed: usize,
    /// 其中失败的数量
    pub failed: usize,
    /// 总数
    pub total: usize,
}

/// 调度参数
#[derive(Clone)]
pub struct BatchOptions {
    /// 最大并发数，必须 >= 1
    pub max_concurrency: usize,
    /// 单次调用超时，超时按失败处理
    pub request_timeout: Duration,
    /// 生成参数
    pub params: GenerationParams,
    /// 取消后不再开始新的题目，进行中的调用继续直到完成或超时
    pub cancel: Option<CancellationToken>,
    /// 每完成一道题回调一次
    pub progress: Option<ProgressCallback>,
}

impl BatchOptions {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            params: GenerationParams::default(),
            cancel: None,
            progress: None,
        }
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(BatchProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency < 1 {
            return Err(ConfigError::InvalidConcurrency(self.max_concurrency));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl std::fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOptions")
            .field("max_concurrency", &self.max_concurrency)
            .field("request_timeout", &self.request_timeout)
            .field("params", &self.params)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// 并发调用一批题目
///
/// # 参数
/// - `items`: 题目列表（`Vec<WorkItem>` 或 `BatchRequest`），index 按此顺序分配
/// - `responder`: 模型调用能力，每道题最多调用一次
/// - `options`: 并发数、超时、生成参数等
/// - `sink`: 结果实时写入目标（可选），按完成顺序每题一行
///
/// # 返回
/// 与输入等长、按提交顺序排列的结果。只有参数错误会返回 `Err`，
/// 单题失败体现在结果数据中（回复与思考过程为空）。
pub async fn run_batch<R>(
    items: impl Into<BatchRequest>,
    responder: Arc<R>,
    options: &BatchOptions,
    sink: Option<Arc<dyn RecordSink>>,
) -> Result<Vec<ResultRecord>, ConfigError>
where
    R: Responder + ?Sized + 'static,
{
    options.validate()?;

    let mut items = items.into().into_items();
    let total = items.len();
    if total == 0 {
        debug!("题目列表为空，跳过调度");
        return Ok(Vec::new());
    }

    for (index, item) in items.iter_mut().enumerate() {
        item.index = index;
    }

    let worker_count = options.max_concurrency.min(total);
    info!("📦 开始处理 {} 道题目，并发数 {}", total, worker_count);

    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let ctx = Arc::new(WorkerContext {
        responder,
        permits: Arc::new(Semaphore::new(options.max_concurrency)),
        sink,
        params: options.params,
        request_timeout: options.request_timeout,
        cancel: options.cancel.clone(),
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        handles.push(tokio::spawn(worker_loop(
            worker_id,
            Arc::clone(&queue),
            Arc::clone(&ctx),
            tx.clone(),
        )));
    }
    drop(tx);

    // 按 index 回收结果
    let mut slots: Vec<Option<ResultRecord>> = vec![None; total];
    let mut progress = BatchProgress {
        completed: 0,
        failed: 0,
        total,
    };
    let log_step = (total / 20).max(1);

    while let Some(Completion { index, record }) = rx.recv().await {
        progress.completed += 1;
        if !record.is_success() {
            progress.failed += 1;
        }
        if progress.completed % log_step == 0 || progress.completed == total {
            info!(
                "📈 进度 {}/{}（失败 {}）",
                progress.completed, progress.total, progress.failed
            );
        }
        if let Some(callback) = &options.progress {
            callback(progress);
        }
        slots[index] = Some(record);
    }

    for (worker_id, joined) in join_all(handles).await.into_iter().enumerate() {
        if let Err(e) = joined {
            error!("[worker {}] 任务执行失败: {}", worker_id, e);
        }
    }

    // 取消后仍在队列中的题目：没有调用、不写文件，但结果中保留一条空记录
    let skipped: Vec<WorkItem> = queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .collect();
    if !skipped.is_empty() {
        warn!("⚠️ 批次已取消，{} 道题目未开始", skipped.len());
    }
    for item in skipped {
        slots[item.index] = Some(ResultRecord::failed(item.metadata));
    }

    let results = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                error!("[题目 {}] 没有收到结果，按失败处理", index + 1);
                ResultRecord::failed(None)
            })
        })
        .collect();

    Ok(results)
}

/// 一道题的完成通知
struct Completion {
    index: usize,
    record: ResultRecord,
}

/// worker 共享的上下文
struct WorkerContext<R: ?Sized> {
    responder: Arc<R>,
    /// 并发名额，总数为 `max_concurrency`
    permits: Arc<Semaphore>,
    sink: Option<Arc<dyn RecordSink>>,
    params: GenerationParams,
    request_timeout: Duration,
    cancel: Option<CancellationToken>,
}

impl<R> WorkerContext<R>
where
    R: Responder + ?Sized + 'static,
{
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// 等待一个并发名额；取消时返回 `None`
    async fn acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        let acquire = Arc::clone(&self.permits).acquire_owned();
        let permit = match &self.cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                permit = acquire => permit,
            },
            None => acquire.await,
        };
        permit.ok()
    }

    /// 调用一次 responder，所有失败都转换为空字段结果
    ///
    /// 调用在独立任务中执行并持有 `permit`；超时后该任务被 abort。
    async fn invoke(&self, item: WorkItem, permit: OwnedSemaphorePermit) -> ResultRecord {
        let WorkItem {
            index,
            prompt,
            image_refs,
            metadata,
        } = item;

        debug!("[题目 {}] 开始调用: {}", index + 1, preview(&prompt, 40));

        let responder = Arc::clone(&self.responder);
        let params = self.params;
        let mut call = tokio::spawn(with_invocation_slot(permit, async move {
            responder.respond(&prompt, &image_refs, &params).await
        }));

        let outcome = match tokio::time::timeout(self.request_timeout, &mut call).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => {
                Err(ResponderError::Panicked(panic_message(e.into_panic().as_ref())))
            }
            Ok(Err(e)) => Err(ResponderError::other(e.to_string())),
            Err(_) => {
                call.abort();
                Err(ResponderError::Timeout(self.request_timeout))
            }
        };

        match outcome {
            Ok(reply) => {
                debug!("[题目 {}] ✓ 调用完成", index + 1);
                ResultRecord::from_reply(reply, metadata)
            }
            Err(e) => {
                warn!("[题目 {}] ❌ 调用失败: {}", index + 1, e);
                ResultRecord::failed(metadata)
            }
        }
    }
}

async fn worker_loop<R>(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<WorkItem>>>,
    ctx: Arc<WorkerContext<R>>,
    tx: mpsc::UnboundedSender<Completion>,
) where
    R: Responder + ?Sized + 'static,
{
    loop {
        if ctx.is_cancelled() {
            debug!("[worker {}] 收到取消信号，停止取题", worker_id);
            break;
        }

        let Some(permit) = ctx.acquire_slot().await else {
            debug!("[worker {}] 等待名额时收到取消信号", worker_id);
            break;
        };

        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(item) = next else {
            break;
        };

        let index = item.index;
        let record = ctx.invoke(item, permit).await;

        if let Some(sink) = &ctx.sink {
            if let Err(e) = sink.append(&record).await {
                error!("[题目 {}] 写入结果失败: {}", index + 1, e);
            }
        }

        if tx.send(Completion { index, record }).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ModelReply;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    struct EchoResponder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Responder for EchoResponder {
        async fn respond(
            &self,
            prompt: &str,
            image_refs: &[String],
            _params: &GenerationParams,
        ) -> Result<ModelReply, ResponderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ModelReply::text(format!("{}#{}", prompt, image_refs.len())))
        }
    }

    fn echo() -> Arc<EchoResponder> {
        Arc::new(EchoResponder {
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_config_error() {
        let responder = echo();
        let err = run_batch(
            vec![WorkItem::new("a")],
            responder.clone(),
            &BatchOptions::new(0),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidConcurrency(0)));
        assert_eq!(responder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_timeout_is_config_error() {
        let options = BatchOptions::new(2).with_timeout(Duration::ZERO);
        let err = run_batch(Vec::<WorkItem>::new(), echo(), &options, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTimeout));
    }

    #[tokio::test]
    async fn test_metadata_carried_through() {
        let items = vec![
            WorkItem::new("a").with_metadata(json!({"id": "a"})),
            WorkItem::new("b").with_images(vec!["https://b.png".to_string()]),
        ];

        let results = assert_ok!(run_batch(items, echo(), &BatchOptions::new(2), None).await);

        assert_eq!(results[0].response.as_deref(), Some("a#0"));
        assert_eq!(results[0].information, Some(json!({"id": "a"})));
        assert_eq!(results[1].response.as_deref(), Some("b#1"));
        assert_eq!(results[1].information, None);
    }

    #[tokio::test]
    async fn test_progress_callback_counts_completions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let options = BatchOptions::new(3).with_progress(move |p| {
            seen_clone.lock().unwrap().push(p);
        });

        let items: Vec<WorkItem> = (0..7).map(|i| WorkItem::new(i.to_string())).collect();
        assert_ok!(run_batch(items, echo(), &options, None).await);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 7);
        assert_eq!(
            seen.last().copied(),
            Some(BatchProgress {
                completed: 7,
                failed: 0,
                total: 7
            })
        );
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
