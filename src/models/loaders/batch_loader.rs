use crate::error::{AppError, AppResult};
use crate::models::image_ref::resolve_image_ref;
use crate::models::work_item::WorkItem;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tokio::fs;

/// 输入文件中的一道题
#[derive(Debug, Deserialize)]
struct ItemInput {
    prompt: String,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    information: Option<Value>,
}

/// TOML 输入文件：`[[items]]` 数组
#[derive(Debug, Deserialize)]
struct TomlBatch {
    #[serde(default)]
    items: Vec<ItemInput>,
}

/// 从 `.jsonl` 或 `.toml` 文件加载题目
///
/// 本地图片路径（相对路径以输入文件所在目录为基准）会被编码为 data URI。
pub async fn load_work_items(path: impl AsRef<Path>) -> AppResult<Vec<WorkItem>> {
    let path = path.as_ref();
    let path_str = path.display().to_string();

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file_read_failed(&path_str, e))?;

    let inputs = match path.extension().and_then(|s| s.to_str()) {
        Some("jsonl") => parse_jsonl(&content, &path_str)?,
        Some("toml") => parse_toml(&content, &path_str)?,
        _ => return Err(AppError::UnsupportedInput(path_str)),
    };

    let base_dir = path.parent();
    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        let mut image_refs = Vec::with_capacity(input.images.len());
        for image in &input.images {
            image_refs.push(resolve_image_ref(image, base_dir).await?);
        }

        let mut item = WorkItem::new(input.prompt).with_images(image_refs);
        item.metadata = input.information;
        items.push(item);
    }

    tracing::debug!("从 {} 解析出 {} 道题目", path_str, items.len());
    Ok(items)
}

fn parse_jsonl(content: &str, path: &str) -> AppResult<Vec<ItemInput>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<ItemInput>(line).map_err(|e| AppError::InputParseFailed {
                path: path.to_string(),
                line: idx + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

fn parse_toml(content: &str, path: &str) -> AppResult<Vec<ItemInput>> {
    let batch: TomlBatch = toml::from_str(content).map_err(|e| AppError::InputParseFailed {
        path: path.to_string(),
        line: e
            .span()
            .map(|span| content[..span.start].matches('\n').count() + 1)
            .unwrap_or(0),
        message: e.message().to_string(),
    })?;
    Ok(batch.items)
}
