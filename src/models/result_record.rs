use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::ModelReply;

/// 单道题目的模型调用结果
///
/// 写入 JSONL 时每行一个对象，字段名为 `Response` / `Reasoning` / `Information`。
/// `Response` 为空表示没有拿到模型回复（调用失败、超时或未开始）。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "Response")]
    pub response: Option<String>,
    #[serde(rename = "Reasoning")]
    pub reasoning: Option<String>,
    #[serde(
        rename = "Information",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub information: Option<Value>,
}

impl ResultRecord {
    /// 调用失败时的结果：回复与思考过程都为空
    pub fn failed(information: Option<Value>) -> Self {
        Self {
            response: None,
            reasoning: None,
            information,
        }
    }

    pub fn from_reply(reply: ModelReply, information: Option<Value>) -> Self {
        Self {
            response: reply.response,
            reasoning: reply.reasoning,
            information,
        }
    }

    /// 是否拿到了模型回复
    pub fn is_success(&self) -> bool {
        self.response.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_uses_field_tags() {
        let record = ResultRecord {
            response: Some("答案是 B".to_string()),
            reasoning: None,
            information: Some(json!({"paper": "2025-云南"})),
        };
        let line = serde_json::to_string(&record).unwrap();

        assert_eq!(
            line,
            r#"{"Response":"答案是 B","Reasoning":null,"Information":{"paper":"2025-云南"}}"#
        );
    }

    #[test]
    fn test_information_omitted_when_absent() {
        let line = serde_json::to_string(&ResultRecord::failed(None)).unwrap();
        assert_eq!(line, r#"{"Response":null,"Reasoning":null}"#);

        let parsed: ResultRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, ResultRecord::failed(None));
        assert!(!parsed.is_success());
    }
}
