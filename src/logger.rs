//! 日志工具模块
//!
//! 控制台和运行日志文件各一个 fmt layer，级别相同：
//! `RUST_LOG` 优先，否则 verbose 时为 debug，默认为 info。

use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;
use tracing::{info, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::models::ResultRecord;

fn env_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// 初始化 tracing 日志
///
/// `log_file` 为 `Some` 时，日志同时写入该文件（文件开头写入带时间戳的标题）。
/// 全局 subscriber 已存在时（测试中多次调用）静默跳过。
pub fn init(verbose: bool, log_file: Option<&str>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => Some(file_layer(path)?.with_filter(env_filter(verbose))),
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_filter(env_filter(verbose)),
        )
        .with(file_layer)
        .try_init();

    Ok(())
}

/// 写入运行日志文件的 fmt layer
pub type FileLayer<S> = fmt::Layer<S, DefaultFields, Format, Mutex<File>>;

/// 创建写入运行日志文件的 layer（无 ANSI 颜色）
pub fn file_layer<S>(path: &str) -> Result<FileLayer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let file = open_log_file(path)?;
    Ok(fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false))
}

/// 新建（覆盖）日志文件并写入标题
fn open_log_file(path: &str) -> Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("无法创建日志文件: {}", path))?;

    let rule = "=".repeat(60);
    writeln!(
        file,
        "{rule}\n批量模型调用日志 - {}\n{rule}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
    )
    .with_context(|| format!("无法写入日志文件: {}", path))?;

    Ok(file)
}

/// 记录程序启动信息
pub fn log_startup(model_name: &str, max_concurrency: usize) {
    info!(model = model_name, max_concurrency, "🚀 程序启动 - 并发模型调用模式");
}

/// 汇总并记录一个批次的结果
pub fn log_final_stats(results: &[ResultRecord], output_path: Option<&str>) {
    let success = results.iter().filter(|r| r.is_success()).count();
    info!(
        total = results.len(),
        success,
        failed = results.len() - success,
        "📊 全部处理完成"
    );
    if let Some(path) = output_path {
        info!("结果已保存至: {}", path);
    }
}

/// 日志中显示的文本预览，超过 `max_chars` 个字符时截断并加省略号
pub fn preview(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}…", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}
