//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `dispatcher` - 并发调度器
//! - 固定数量的 worker 从队列按提交顺序取题
//! - 单题失败/超时/panic 只产生一条空结果，不影响其他题
//! - 完成即写入 JSONL（加锁，不交错）
//! - 按提交顺序返回结果
//!
//! ### `batch_processor` - 应用入口
//! - 校验配置、加载输入文件
//! - 创建 LLM 服务并调用 dispatcher
//! - 输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (App)
//!     ↓
//! dispatcher::run_batch (处理 Vec<WorkItem>)
//!     ↓
//! services (能力层：Responder / RecordSink)
//! ```

pub mod batch_processor;
pub mod dispatcher;

// 重新导出主要类型
pub use batch_processor::App;
pub use dispatcher::{run_batch, BatchOptions, BatchProgress, ProgressCallback};
