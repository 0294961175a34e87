//! 错误类型
//!
//! 按层划分：
//! - `ConfigError`：配置/参数错误，调度开始前直接返回给调用方
//! - `ResponderError`：模型调用失败，只影响单个任务，转换为空字段结果
//! - `SinkError`：JSONL 写入失败，只记录日志，不中断批次
//! - `AppError`：二进制入口使用的顶层错误

use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 并发数必须 >= 1
    #[error("并发数无效: {0}，必须大于等于 1")]
    InvalidConcurrency(usize),

    /// 单次请求超时不能为 0
    #[error("请求超时时间不能为 0")]
    ZeroTimeout,

    /// 并行序列长度超过了题目数量，无法按位置对齐
    #[error("{name} 长度 {len} 超过了 prompts 长度 {expected}，无法对齐")]
    MisalignedSequence {
        name: &'static str,
        len: usize,
        expected: usize,
    },

    /// 必填配置项为空
    #[error("配置项 {0} 不能为空")]
    MissingField(&'static str),

    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 模型调用错误
#[derive(Debug, Error)]
pub enum ResponderError {
    /// 网络请求失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: reqwest::Error,
    },

    /// API 返回非成功状态码
    #[error("LLM API返回错误响应 (模型: {model}): status={status}, body={body}")]
    BadStatus {
        model: String,
        status: u16,
        body: String,
    },

    /// 响应体无法解析
    #[error("LLM 响应解析失败: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    /// 返回结果为空
    #[error("LLM返回结果为空 (模型: {model})")]
    EmptyResponse { model: String },

    /// 构建请求失败
    #[error("构建 LLM 请求失败: {0}")]
    InvalidRequest(#[from] async_openai::error::OpenAIError),

    /// 单次调用超时
    #[error("LLM 调用超时 ({0:?})")]
    Timeout(std::time::Duration),

    /// 调用过程中发生 panic
    #[error("LLM 调用发生 panic: {0}")]
    Panicked(String),

    /// 其他调用方自定义的失败
    #[error("{0}")]
    Other(String),
}

impl ResponderError {
    /// 用任意消息构造错误，便于自定义 Responder 使用
    pub fn other(message: impl Into<String>) -> Self {
        ResponderError::Other(message.into())
    }
}

/// JSONL 写入错误
#[derive(Debug, Error)]
pub enum SinkError {
    /// 序列化失败
    #[error("结果序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),

    /// 写入失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 读取输入文件失败
    #[error("读取文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 输入文件格式错误
    #[error("解析输入文件失败 ({path} 第 {line} 行): {message}")]
    InputParseFailed {
        path: String,
        line: usize,
        message: String,
    },

    /// 不支持的输入文件类型
    #[error("不支持的输入文件类型: {0}")]
    UnsupportedInput(String),
}

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::FileReadFailed {
            path: path.into(),
            source,
        }
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::MisalignedSequence {
            name: "information",
            len: 5,
            expected: 3,
        };
        assert_eq!(
            err.to_string(),
            "information 长度 5 超过了 prompts 长度 3，无法对齐"
        );
    }

    #[test]
    fn test_app_error_wraps_config() {
        let err: AppError = ConfigError::InvalidConcurrency(0).into();
        assert!(matches!(err, AppError::Config(ConfigError::InvalidConcurrency(0))));
        assert!(err.to_string().starts_with("配置错误"));
    }
}
