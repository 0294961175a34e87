//! # Question Bank Dispatch
//!
//! 题库建设中的批量模型调用工具：把一批"提示词 + 图片"并发发送给兼容 OpenAI 接口的模型，
//! 按提交顺序返回结果，并把每条结果实时追加写入 JSONL 文件。
//!
//! ## 架构设计
//!
//! ### ① 数据模型（Models）
//! - `WorkItem` / `BatchRequest` - 待调用的题目（提示词、图片、附加信息）
//! - `ResultRecord` - 调用结果（回复、思考过程、附加信息）
//! - `loaders` - 从 `.jsonl` / `.toml` 加载题目
//!
//! ### ② 业务能力层（Services）
//! - `Responder` - 模型调用能力（trait，可注入测试桩）
//! - `LlmService` - OpenAI 兼容接口的实现
//! - `JsonlWriter` - 加锁追加写 JSONL 的能力
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator::dispatcher` - 有界并发调度、顺序还原、实时写入
//! - `orchestrator::batch_processor` - 应用入口，加载输入并输出统计
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, ConfigError, ResponderError, SinkError};
pub use models::{BatchRequest, ResultRecord, WorkItem};
pub use orchestrator::{run_batch, App, BatchOptions, BatchProgress};
pub use services::{
    BlockingResponder, GenerationParams, JsonlWriter, LlmService, ModelReply, RecordSink,
    Responder,
};
