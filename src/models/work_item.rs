use serde_json::Value;

use crate::error::ConfigError;

/// 一道待调用模型的题目
///
/// `index` 由调度器在入队时按提交顺序分配，之后不再改变。
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub(crate) index: usize,
    /// 提示词
    pub prompt: String,
    /// 图片引用（URL 或 `data:image/...;base64,` 形式），按顺序发送
    pub image_refs: Vec<String>,
    /// 调用方附带的信息，原样写入结果
    pub metadata: Option<Value>,
}

impl WorkItem {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            index: 0,
            prompt: prompt.into(),
            image_refs: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_images(mut self, image_refs: Vec<String>) -> Self {
        self.image_refs = image_refs;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// 按位置对齐的批量请求
///
/// 对应"prompts / 每题图片列表 / 附加信息"三个平行序列的调用方式。
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    items: Vec<WorkItem>,
}

impl BatchRequest {
    /// 由平行序列构建
    ///
    /// `batch_images` 或 `information` 比 `prompts` 短时，未覆盖的题目没有图片/附加信息，
    /// 这不是错误；比 `prompts` 长则无法对齐，返回 `ConfigError`。
    pub fn from_parts(
        prompts: Vec<String>,
        batch_images: Vec<Vec<String>>,
        information: Vec<Value>,
    ) -> Result<Self, ConfigError> {
        if batch_images.len() > prompts.len() {
            return Err(ConfigError::MisalignedSequence {
                name: "batch_images",
                len: batch_images.len(),
                expected: prompts.len(),
            });
        }
        if information.len() > prompts.len() {
            return Err(ConfigError::MisalignedSequence {
                name: "information",
                len: information.len(),
                expected: prompts.len(),
            });
        }

        let mut images = batch_images.into_iter();
        let mut info = information.into_iter();
        let items = prompts
            .into_iter()
            .map(|prompt| WorkItem {
                index: 0,
                prompt,
                image_refs: images.next().unwrap_or_default(),
                metadata: info.next(),
            })
            .collect();

        Ok(Self { items })
    }

    pub fn into_items(self) -> Vec<WorkItem> {
        self.items
    }
}

impl From<Vec<WorkItem>> for BatchRequest {
    fn from(items: Vec<WorkItem>) -> Self {
        Self { items }
    }
}
