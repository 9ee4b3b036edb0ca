pub mod logger;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisError {
    #[error("配置错误: {0}")]
    Config(String),

    /// 文档或资源请求失败（可重试一次）
    #[error("请求失败 {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// 文档无法解析，整个任务中止
    #[error("解析错误: {0}")]
    Parse(String),

    /// 单个资源下载失败，只影响该元素
    #[error("下载失败 {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("URL错误: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type VisResult<T> = Result<T, VisError>;

/// 将连续空白折叠为单个空格
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 按字符数截断（不按字节，避免切断多字节字符）
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
