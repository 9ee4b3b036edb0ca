pub mod pmc;

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::utils::{VisError, VisResult};

pub use pmc::{PmcClient, PmcMetadata};

/// 一次 HTTP GET 的原始结果
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 网络层失败（超时、连接错误等），总是视为可重试
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct TransportError(pub String);

/// 网络访问的接缝，测试中替换为内存实现
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<RawResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> VisResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| VisError::Config(format!("无法创建HTTP客户端: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?
            .to_vec();

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

/// 5xx、429 与网络错误可以重试，其余状态码直接作为最终结果
fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn is_markup_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime.starts_with("text/") || mime.contains("html") || mime.contains("xml")
}

/// 按 content-type 中的 charset 解码；未声明或无法识别时按 UTF-8（BOM 优先）
fn decode_markup(content_type: Option<&str>, body: &[u8]) -> String {
    let encoding = content_type
        .and_then(|ct| {
            ct.split(';').skip(1).find_map(|param| {
                let (key, value) = param.split_once('=')?;
                key.trim()
                    .eq_ignore_ascii_case("charset")
                    .then(|| value.trim().trim_matches(|c| c == '"' || c == '\''))
            })
        })
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        debug!("按 {} 解码时遇到无效字节", used.name());
    }
    text.into_owned()
}

/// 带固定重试预算的抓取器，文档与资源共用同一策略
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    max_retries: u32,
    retry_delay: Duration,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, config: &FetchConfig) -> Self {
        Self {
            transport,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }

    pub fn from_config(config: &FetchConfig) -> VisResult<Self> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// 返回最终响应（可能是 4xx），或重试耗尽后的失败原因
    async fn get_with_retry(&self, url: &Url) -> Result<RawResponse, String> {
        let attempts = self.max_retries + 1;
        let mut last_failure = String::from("未发送请求");

        for attempt in 1..=attempts {
            match self.transport.get(url).await {
                Ok(resp) if is_transient_status(resp.status) => {
                    warn!("{} 返回 {} (第 {}/{} 次尝试)", url, resp.status, attempt, attempts);
                    last_failure = format!("HTTP {}", resp.status);
                }
                Ok(resp) => {
                    debug!("{} 响应状态: {}, {} 字节", url, resp.status, resp.body.len());
                    return Ok(resp);
                }
                Err(e) => {
                    warn!("请求失败 {} (第 {}/{} 次): {}", url, attempt, attempts, e);
                    last_failure = e.0;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(last_failure)
    }

    /// 获取论文页面的 HTML
    pub async fn fetch_document(&self, url: &Url) -> VisResult<String> {
        info!("正在获取页面: {}", url);

        let fetch_error = |reason: String| VisError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self.get_with_retry(url).await.map_err(fetch_error)?;

        if !response.is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status)));
        }

        if let Some(ct) = response.content_type.as_deref() {
            if !is_markup_content_type(ct) {
                return Err(fetch_error(format!("不支持的内容类型: {}", ct)));
            }
        }

        info!("页面获取成功: {} 字节", response.body.len());
        Ok(decode_markup(response.content_type.as_deref(), &response.body))
    }

    /// 获取单个二进制资源
    pub async fn fetch_asset(&self, url: &Url) -> VisResult<RawResponse> {
        let download_error = |reason: String| VisError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self.get_with_retry(url).await.map_err(download_error)?;

        if !response.is_success() {
            return Err(download_error(format!("HTTP {}", response.status)));
        }

        Ok(response)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{quick_fetch_config, ScriptedTransport};
    use super::*;

    fn fetcher(transport: &Arc<ScriptedTransport>) -> Fetcher {
        Fetcher::new(transport.clone(), &quick_fetch_config())
    }

    #[tokio::test]
    async fn server_error_is_retried_once_then_succeeds() {
        let transport = Arc::new(ScriptedTransport::new());
        let url = "https://example.org/paper";
        transport.respond(url, 503, None, b"");
        transport.respond(url, 200, Some("text/html; charset=utf-8"), b"<html></html>");

        let html = fetcher(&transport)
            .fetch_document(&Url::parse(url).unwrap())
            .await
            .unwrap();

        assert_eq!(html, "<html></html>");
        assert_eq!(transport.calls(url), 2);
    }

    #[tokio::test]
    async fn document_failure_after_retry_budget_is_fetch_error() {
        let transport = Arc::new(ScriptedTransport::new());
        let url = "https://example.org/paper";
        transport.respond(url, 500, None, b"");

        let err = fetcher(&transport)
            .fetch_document(&Url::parse(url).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, VisError::Fetch { ref reason, .. } if reason == "HTTP 500"));
        assert_eq!(transport.calls(url), 2);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        let url = "https://example.org/missing.png";
        transport.respond(url, 404, None, b"");

        let err = fetcher(&transport)
            .fetch_asset(&Url::parse(url).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, VisError::Download { .. }));
        assert_eq!(transport.calls(url), 1);
    }

    #[tokio::test]
    async fn network_errors_consume_the_retry_budget() {
        let transport = Arc::new(ScriptedTransport::new());
        let url = "https://example.org/slow.png";
        transport.fail(url, "operation timed out");

        let err = fetcher(&transport)
            .fetch_asset(&Url::parse(url).unwrap())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("operation timed out"));
        assert_eq!(transport.calls(url), 2);
    }

    #[tokio::test]
    async fn binary_content_type_is_rejected_for_documents() {
        let transport = Arc::new(ScriptedTransport::new());
        let url = "https://example.org/paper.pdf";
        transport.respond(url, 200, Some("application/pdf"), b"%PDF-1.7");

        let err = fetcher(&transport)
            .fetch_document(&Url::parse(url).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, VisError::Fetch { .. }));
    }

    #[tokio::test]
    async fn declared_charset_is_used_to_decode_documents() {
        let transport = Arc::new(ScriptedTransport::new());
        let url = "https://example.org/latin1";
        transport.respond(
            url,
            200,
            Some("text/html; charset=ISO-8859-1"),
            b"<p>Caf\xe9 r\xe9sum\xe9</p>",
        );

        let html = fetcher(&transport)
            .fetch_document(&Url::parse(url).unwrap())
            .await
            .unwrap();

        assert_eq!(html, "<p>Café résumé</p>");
    }

    #[test]
    fn undeclared_or_unknown_charset_falls_back_to_utf8() {
        let body = "<p>Größe</p>".as_bytes();
        assert_eq!(decode_markup(None, body), "<p>Größe</p>");
        assert_eq!(decode_markup(Some("text/html"), body), "<p>Größe</p>");
        assert_eq!(decode_markup(Some("text/html; charset=\"x-bogus\""), body), "<p>Größe</p>");
        assert_eq!(
            decode_markup(Some("text/html;charset=\"windows-1252\""), b"\x93q\x94"),
            "\u{201c}q\u{201d}"
        );
    }

    #[test]
    fn markup_content_types() {
        assert!(is_markup_content_type("text/html; charset=UTF-8"));
        assert!(is_markup_content_type("application/xhtml+xml"));
        assert!(!is_markup_content_type("image/png"));
    }
}
