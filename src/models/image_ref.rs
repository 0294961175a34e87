//! 图片引用
//!
//! 模型接口接受公网 URL 或 `data:image/png;base64,{...}` 形式的内联图片。

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tokio::fs;

use crate::error::{AppError, AppResult};

/// 是否可以直接发送给模型（URL 或 data URI）
pub fn is_remote_or_inline(image_ref: &str) -> bool {
    image_ref.starts_with("http://")
        || image_ref.starts_with("https://")
        || image_ref.starts_with("data:")
}

/// 读取本地图片并编码为 data URI
pub async fn encode_image_data_uri(path: impl AsRef<Path>) -> AppResult<String> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    Ok(format!(
        "data:{};base64,{}",
        mime_for(path),
        STANDARD.encode(bytes)
    ))
}

/// 把本地路径转成 data URI，URL 和 data URI 原样返回
pub async fn resolve_image_ref(image_ref: &str, base_dir: Option<&Path>) -> AppResult<String> {
    if is_remote_or_inline(image_ref) {
        return Ok(image_ref.to_string());
    }

    let path = Path::new(image_ref);
    match base_dir {
        Some(dir) if path.is_relative() => encode_image_data_uri(dir.join(path)).await,
        _ => encode_image_data_uri(path).await,
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/png",
    }
}
