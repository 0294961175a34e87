//! 模型调用能力
//!
//! 调度器只依赖 `Responder` trait，具体实现（远程 LLM、测试桩、同步函数）由调用方注入。

use async_trait::async_trait;
use std::cell::RefCell;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;

use crate::error::ResponderError;

/// 生成参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// 采样温度
    pub temperature: f32,
    /// 最大输出 token 数
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 2048,
        }
    }
}

/// 模型回复
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelReply {
    /// 回复内容
    pub response: Option<String>,
    /// 思考过程（模型提供 reasoning_content 时才有）
    pub reasoning: Option<String>,
}

impl ModelReply {
    /// 只有回复内容
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// 模型调用能力
///
/// 对同一道题，调度器最多调用一次 `respond`。
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(
        &self,
        prompt: &str,
        image_refs: &[String],
        params: &GenerationParams,
    ) -> Result<ModelReply, ResponderError>;
}

tokio::task_local! {
    static INVOCATION_SLOT: RefCell<Option<OwnedSemaphorePermit>>;
}

/// 调度器分配给一次调用的并发名额
///
/// 名额被释放之前，调度器不会开始新的调用。
#[derive(Debug)]
pub struct InvocationSlot {
    _permit: OwnedSemaphorePermit,
}

/// 在名额作用域内执行 `fut`，`fut` 结束或被丢弃时归还名额（除非已被 `claim_invocation_slot` 取走）
pub(crate) async fn with_invocation_slot<F: std::future::Future>(
    permit: OwnedSemaphorePermit,
    fut: F,
) -> F::Output {
    INVOCATION_SLOT.scope(RefCell::new(Some(permit)), fut).await
}

/// 取走当前调用的并发名额
///
/// 把工作交给其它线程的实现应持有返回值直到那部分工作真正结束：
/// 调用超时后调度器只丢弃 future，线程上的工作仍在运行，名额必须跟着它走。
/// 不在调度器内调用、或名额已被取走时返回 `None`。
pub fn claim_invocation_slot() -> Option<InvocationSlot> {
    INVOCATION_SLOT
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
        .map(|permit| InvocationSlot { _permit: permit })
}

/// 把同步（阻塞 I/O）函数适配为 `Responder`
///
/// 每次调用都在 `spawn_blocking` 线程上执行，多个 worker 可以真正并行。
/// 线程持有本次调用的并发名额，超时后线程仍在运行时名额不会被提前归还。
pub struct BlockingResponder<F> {
    func: Arc<F>,
}

impl<F> BlockingResponder<F>
where
    F: Fn(&str, &[String], &GenerationParams) -> Result<ModelReply, ResponderError>
        + Send
        + Sync
        + 'static,
{
    pub fn new(func: F) -> Self {
        Self {
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl<F> Responder for BlockingResponder<F>
where
    F: Fn(&str, &[String], &GenerationParams) -> Result<ModelReply, ResponderError>
        + Send
        + Sync
        + 'static,
{
    async fn respond(
        &self,
        prompt: &str,
        image_refs: &[String],
        params: &GenerationParams,
    ) -> Result<ModelReply, ResponderError> {
        let func = Arc::clone(&self.func);
        let prompt = prompt.to_string();
        let image_refs = image_refs.to_vec();
        let params = *params;
        let slot = claim_invocation_slot();

        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            func(&prompt, &image_refs, &params)
        })
            .await
            .map_err(|e| ResponderError::Panicked(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocking_responder_runs_closure() {
        let responder =
            BlockingResponder::new(|prompt: &str, images: &[String], params: &GenerationParams| {
                Ok(ModelReply::text(format!(
                    "{}|{}|{}",
                    prompt,
                    images.len(),
                    params.max_tokens
                )))
            });

        let reply = responder
            .respond("题目", &["https://a.png".to_string()], &GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(reply.response.as_deref(), Some("题目|1|2048"));
        assert_eq!(reply.reasoning, None);
    }

    #[tokio::test]
    async fn test_blocking_responder_panic_becomes_error() {
        let responder = BlockingResponder::new(
            |_: &str, _: &[String], _: &GenerationParams| -> Result<ModelReply, ResponderError> {
                panic!("boom")
            },
        );

        let err = responder
            .respond("题目", &[], &GenerationParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ResponderError::Panicked(_)));
    }

    #[tokio::test]
    async fn test_blocking_thread_keeps_slot_after_future_dropped() {
        let slots = Arc::new(tokio::sync::Semaphore::new(1));
        let permit = Arc::clone(&slots).acquire_owned().await.unwrap();

        let responder = BlockingResponder::new(|_: &str, _: &[String], _: &GenerationParams| {
            std::thread::sleep(std::time::Duration::from_millis(200));
            Ok(ModelReply::text("late"))
        });

        // 只给 20ms，future 被丢弃，但线程还在运行
        let params = GenerationParams::default();
        let call = with_invocation_slot(
            permit,
            responder.respond("题目", &[], &params),
        );
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), call).await;
        assert!(timed_out.is_err());
        assert_eq!(slots.available_permits(), 0);

        // 线程结束后名额归还
        let again = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            Arc::clone(&slots).acquire_owned(),
        )
        .await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_claim_outside_dispatcher_is_none() {
        assert!(claim_invocation_slot().is_none());
    }
}
