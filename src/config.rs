use crate::error::ConfigError;
use crate::services::GenerationParams;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时进行的模型调用数量
    pub max_concurrency: usize,
    /// 采样温度
    pub temperature: f32,
    /// 最大输出 token 数
    pub max_tokens: u32,
    /// 单次调用超时（秒）
    pub request_timeout_secs: u64,
    /// 题目输入文件（.jsonl / .toml）
    pub input_path: String,
    /// 结果实时追加写入的 JSONL 文件
    pub output_jsonl: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: 32,
            temperature: 0.0,
            max_tokens: 2048,
            request_timeout_secs: 120,
            input_path: "input.jsonl".to_string(),
            output_jsonl: Some("output.jsonl".to_string()),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量加载，无法解析的值回退到默认值
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrency: env_parse("MAX_CONCURRENCY").unwrap_or(default.max_concurrency),
            temperature: env_parse("LLM_TEMPERATURE").unwrap_or(default.temperature),
            max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(default.max_tokens),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(default.request_timeout_secs),
            input_path: std::env::var("INPUT_PATH").unwrap_or(default.input_path),
            output_jsonl: std::env::var("OUTPUT_JSONL").ok().or(default.output_jsonl).filter(|p| !p.trim().is_empty()),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
        }
    }

    /// 从 TOML 文件加载，缺失的字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    /// `output_jsonl = ""` 表示不写结果文件，与环境变量 `OUTPUT_JSONL=` 一致
    fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.output_jsonl = config.output_jsonl.filter(|p| !p.trim().is_empty());
        Ok(config)
    }

    /// 校验配置，在任何调度开始前调用
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency < 1 {
            return Err(ConfigError::InvalidConcurrency(self.max_concurrency));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.llm_api_base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("llm_api_base_url"));
        }
        if self.llm_model_name.trim().is_empty() {
            return Err(ConfigError::MissingField("llm_model_name"));
        }
        if self.llm_api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("llm_api_key"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str) -> Option<T> {
    std::env::var(var_name).ok().and_then(|v| v.trim().parse().ok())
}
