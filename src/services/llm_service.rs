//! LLM 服务 - 业务能力层
//!
//! 只负责"把一道题发给模型"能力，不关心批量和并发
//!
//! ## 技术栈
//! - 使用 `async-openai` 的请求类型构建消息（文本 + 图片）
//! - 使用 `reqwest` 发送请求并自行解析响应，以便读取部分模型返回的 `reasoning_content`
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ConfigError, ResponderError};
use crate::logger::preview;
use crate::services::responder::{GenerationParams, ModelReply, Responder};

/// LLM 服务
///
/// 显式构造并注入调度器，不依赖任何全局客户端。
pub struct LlmService {
    http: reqwest::Client,
    api_base_url: String,
    model_name: String,
    api_key: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    ///
    /// 三个参数都不能为空
    pub fn new(
        api_base_url: impl Into<String>,
        model_name: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let api_base_url = api_base_url.into();
        let model_name = model_name.into();
        let api_key = api_key.into();

        if api_base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("llm_api_base_url"));
        }
        if model_name.trim().is_empty() {
            return Err(ConfigError::MissingField("llm_model_name"));
        }
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("llm_api_key"));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            api_base_url,
            model_name,
            api_key,
        })
    }

    /// 根据配置创建
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            &config.llm_api_base_url,
            &config.llm_model_name,
            &config.llm_api_key,
        )
    }

    /// 构建请求
    ///
    /// 只使用一条 user 消息：先放提示词（有图片且提示词为空时省略），再按顺序放图片。
    fn build_request(
        &self,
        prompt: &str,
        image_refs: &[String],
        params: &GenerationParams,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let user_msg = if image_refs.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
        } else {
            let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                Vec::with_capacity(image_refs.len() + 1);

            if !prompt.is_empty() {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText {
                        text: prompt.to_string(),
                    },
                ));
            }

            for url in image_refs {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()?
        };

        CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(params.temperature)
            .max_tokens(params.max_tokens)
            .build()
    }
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// 从响应体提取第一个 choice 的回复和思考过程
fn parse_completion(body: &str, model: &str) -> Result<ModelReply, ResponderError> {
    let body: CompletionBody = serde_json::from_str(body)?;

    let message = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ResponderError::EmptyResponse {
            model: model.to_string(),
        })?
        .message;

    Ok(ModelReply {
        response: message.content,
        reasoning: message.reasoning_content,
    })
}

#[async_trait]
impl Responder for LlmService {
    async fn respond(
        &self,
        prompt: &str,
        image_refs: &[String],
        params: &GenerationParams,
    ) -> Result<ModelReply, ResponderError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", prompt.len());
        if !image_refs.is_empty() {
            debug!("使用 Vision API，包含 {} 张图片", image_refs.len());
        }

        let request = self.build_request(prompt, image_refs, params)?;
        let url = format!(
            "{}/chat/completions",
            self.api_base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|source| {
                warn!("LLM API 调用失败: {}", source);
                ResponderError::ApiCallFailed {
                    model: self.model_name.clone(),
                    source,
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ResponderError::ApiCallFailed {
                model: self.model_name.clone(),
                source,
            })?;

        if !status.is_success() {
            warn!("LLM API 返回错误状态: {}", status);
            return Err(ResponderError::BadStatus {
                model: self.model_name.clone(),
                status: status.as_u16(),
                body: preview(&body, 200).into_owned(),
            });
        }

        debug!("LLM API 调用成功");
        parse_completion(&body, &self.model_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    /// 创建测试用的 LlmService
    fn create_test_service() -> LlmService {
        LlmService::new("http://localhost:9/v1", "doubao-seed-1.6", "sk-test").unwrap()
    }

    fn request_json(prompt: &str, images: &[String]) -> Value {
        let request = create_test_service()
            .build_request(prompt, images, &GenerationParams::default())
            .unwrap();
        serde_json::to_value(&request).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_fields() {
        assert!(matches!(
            LlmService::new("", "m", "k"),
            Err(ConfigError::MissingField("llm_api_base_url"))
        ));
        assert!(matches!(
            LlmService::new("http://x", " ", "k"),
            Err(ConfigError::MissingField("llm_model_name"))
        ));
        assert!(matches!(
            LlmService::new("http://x", "m", ""),
            Err(ConfigError::MissingField("llm_api_key"))
        ));
    }

    #[test]
    fn test_build_request_text_only() {
        let value = request_json("你好", &[]);

        assert_eq!(value["model"], "doubao-seed-1.6");
        assert_eq!(value["max_tokens"], 2048);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "你好");
    }

    #[test]
    fn test_build_request_with_images() {
        let images = vec![
            "https://img.xkw.com/a.png".to_string(),
            "data:image/png;base64,AAAA".to_string(),
        ];
        let value = request_json("描述图片", &images);
        let parts = value["messages"][0]["content"].as_array().unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "描述图片");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "https://img.xkw.com/a.png");
        assert_eq!(parts[2]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_build_request_empty_prompt_with_images() {
        let value = request_json("", &["https://img.xkw.com/a.png".to_string()]);
        let parts = value["messages"][0]["content"].as_array().unwrap();

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["type"], "image_url");
    }

    #[test]
    fn test_parse_completion_with_reasoning() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "true", "reasoning_content": "选项按 A B C D 排列"}
            }]
        }"#;

        let reply = parse_completion(body, "m").unwrap();
        assert_eq!(reply.response.as_deref(), Some("true"));
        assert_eq!(reply.reasoning.as_deref(), Some("选项按 A B C D 排列"));
    }

    #[test]
    fn test_parse_completion_without_reasoning() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;

        let reply = parse_completion(body, "m").unwrap();
        assert_eq!(reply, ModelReply::default());
    }

    #[test]
    fn test_parse_completion_errors() {
        assert!(matches!(
            parse_completion(r#"{"choices": []}"#, "m"),
            Err(ResponderError::EmptyResponse { .. })
        ));
        assert!(matches!(
            parse_completion("<html>502</html>", "m"),
            Err(ResponderError::MalformedResponse(_))
        ));
    }

    /// 测试真实 API 调用（需要 LLM_API_KEY 等环境变量）
    #[tokio::test]
    #[ignore]
    async fn test_respond_live() {
        let _ = crate::logger::init(true, None);

        let service = LlmService::from_config(&Config::from_env()).expect("缺少 LLM 配置");
        let reply = service
            .respond("请用一句话介绍你自己", &[], &GenerationParams::default())
            .await
            .expect("LLM 调用失败");

        println!("{:?}", reply);
        assert!(reply.response.is_some());
    }
}
