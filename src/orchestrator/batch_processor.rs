//! 批量处理入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：校验配置、创建 LLM 服务
//! 2. **批量加载**：从输入文件加载所有待处理的题目
//! 3. **调度**：交给 `run_batch` 并发调用模型，实时写入 JSONL
//! 4. **全局统计**：汇总成功/失败数量

use crate::config::Config;
use crate::logger;
use crate::models::{load_work_items, ResultRecord};
use crate::orchestrator::dispatcher::{run_batch, BatchOptions};
use crate::services::{JsonlWriter, LlmService, RecordSink};
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    llm_service: Arc<LlmService>,
    cancel: CancellationToken,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;

        logger::log_startup(&config.llm_model_name, config.max_concurrency);

        let llm_service = Arc::new(LlmService::from_config(&config)?);

        Ok(Self {
            config,
            llm_service,
            cancel: CancellationToken::new(),
        })
    }

    /// 用于在 Ctrl-C 等场景下停止派发新题目
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<Vec<ResultRecord>> {
        let items = load_work_items(&self.config.input_path).await?;

        if items.is_empty() {
            warn!("⚠️ 没有找到待处理的题目，程序结束");
            return Ok(Vec::new());
        }
        info!(total = items.len(), input = %self.config.input_path, "📚 题目加载完成");

        let sink: Option<Arc<dyn RecordSink>> = match &self.config.output_jsonl {
            Some(path) => Some(Arc::new(JsonlWriter::open(path).await?)),
            None => None,
        };

        let options = BatchOptions::new(self.config.max_concurrency)
            .with_timeout(self.config.request_timeout())
            .with_params(self.config.generation_params())
            .with_cancel(self.cancel.clone());

        let results = run_batch(items, Arc::clone(&self.llm_service), &options, sink).await?;

        logger::log_final_stats(&results, self.config.output_jsonl.as_deref());
        info!("🏁 批次结束");

        Ok(results)
    }
}
