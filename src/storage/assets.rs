use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use super::models::{ElementKind, TableContent};
use crate::crawler::Fetcher;
use crate::parser::table_parser::TableParser;
use crate::utils::VisResult;

const FALLBACK_EXTENSION: &str = "bin";

/// 把元素落盘：图片/图下载到 images/，表格渲染到 tables/
pub struct AssetMaterializer {
    fetcher: Fetcher,
    base_dir: PathBuf,
}

impl AssetMaterializer {
    pub fn new(fetcher: Fetcher, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub async fn prepare_dirs(&self) -> VisResult<()> {
        for kind in [ElementKind::Image, ElementKind::Table] {
            tokio::fs::create_dir_all(self.base_dir.join(kind.subdir())).await?;
        }
        Ok(())
    }

    /// 下载远程资源；同名文件直接覆盖（序号保证同一次运行内不冲突）
    pub async fn materialize(&self, url: &Url, kind: ElementKind, ordinal: u32) -> VisResult<PathBuf> {
        let response = self.fetcher.fetch_asset(url).await?;

        let ext = infer_extension(response.content_type.as_deref(), url, &response.body);
        let path = self
            .base_dir
            .join(kind.subdir())
            .join(format!("{}_{}.{}", kind.as_str(), ordinal, ext));

        tokio::fs::write(&path, &response.body).await?;
        info!("已下载 {} {}: {} ({} 字节)", kind.as_str(), ordinal, path.display(), response.body.len());
        Ok(path)
    }

    /// 表格只在本地渲染，不访问网络
    pub async fn materialize_table(&self, content: &TableContent, ordinal: u32) -> VisResult<PathBuf> {
        let path = self
            .base_dir
            .join(ElementKind::Table.subdir())
            .join(format!("table_{}.html", ordinal));

        tokio::fs::write(&path, TableParser::render_document(content)).await?;
        debug!("表格已保存: {}", path.display());
        Ok(path)
    }
}

fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let ext = match mime.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/tiff" => "tif",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "image/avif" => "avif",
        _ => return None,
    };
    Some(ext)
}

fn extension_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.last()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    // 只认图片格式的后缀；render.php 之类交给文件头识别
    let ext = ext.to_ascii_lowercase();
    let known = ext == "svg" || image::ImageFormat::from_extension(&ext).is_some();
    known.then_some(ext)
}

/// 依次参考 content-type、URL 后缀、文件头，最后退回 bin
pub fn infer_extension(content_type: Option<&str>, url: &Url, body: &[u8]) -> String {
    if let Some(ext) = content_type.and_then(extension_from_content_type) {
        return ext.to_string();
    }
    if let Some(ext) = extension_from_url(url) {
        return ext;
    }
    if let Ok(format) = image::guess_format(body) {
        if let Some(ext) = format.extensions_str().first() {
            return ext.to_string();
        }
    }
    FALLBACK_EXTENSION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::{quick_fetch_config, ScriptedTransport};
    use std::sync::Arc;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0, 0, 0, 0];

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn extension_prefers_content_type() {
        assert_eq!(
            infer_extension(Some("image/jpeg"), &url("https://x.org/a.png"), b""),
            "jpg"
        );
        assert_eq!(
            infer_extension(Some("application/octet-stream"), &url("https://x.org/fig/F1.GIF"), b""),
            "gif"
        );
    }

    #[test]
    fn script_suffix_is_not_taken_as_image_extension() {
        let render = url("https://x.org/cgi/render.php?id=3");
        assert_eq!(
            infer_extension(Some("application/octet-stream"), &render, PNG_MAGIC),
            "png"
        );
        assert_eq!(infer_extension(None, &render, b"??"), "bin");
        assert_eq!(infer_extension(None, &url("https://x.org/f/plot.svg"), b"<svg"), "svg");
        assert_eq!(infer_extension(None, &url("https://x.org/f/scan.jpeg"), b""), "jpeg");
    }

    #[test]
    fn extension_sniffed_then_defaulted() {
        assert_eq!(infer_extension(None, &url("https://x.org/render?id=3"), PNG_MAGIC), "png");
        assert_eq!(infer_extension(None, &url("https://x.org/blob"), b"??"), "bin");
    }

    #[tokio::test]
    async fn figure_is_written_under_images_with_ordinal_name() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("https://x.org/f.png", 200, Some("image/png"), PNG_MAGIC);

        let materializer =
            AssetMaterializer::new(Fetcher::new(transport, &quick_fetch_config()), dir.path());
        materializer.prepare_dirs().await.unwrap();

        let path = materializer
            .materialize(&url("https://x.org/f.png"), ElementKind::Figure, 3)
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("images").join("figure_3.png"));
        assert_eq!(std::fs::read(&path).unwrap(), PNG_MAGIC);
    }

    #[tokio::test]
    async fn existing_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("https://x.org/i.gif", 200, Some("image/gif"), b"GIF89a-new");

        let materializer =
            AssetMaterializer::new(Fetcher::new(transport, &quick_fetch_config()), dir.path());
        materializer.prepare_dirs().await.unwrap();
        let target = dir.path().join("images").join("image_1.gif");
        std::fs::write(&target, b"stale").unwrap();

        materializer
            .materialize(&url("https://x.org/i.gif"), ElementKind::Image, 1)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"GIF89a-new");
    }

    #[tokio::test]
    async fn table_is_rendered_locally() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let materializer =
            AssetMaterializer::new(Fetcher::new(transport.clone(), &quick_fetch_config()), dir.path());
        materializer.prepare_dirs().await.unwrap();

        let content = TableContent {
            html: "<table><tr><td>1</td></tr></table>".to_string(),
            rows: vec![vec!["1".to_string()]],
            has_header: false,
        };
        let path = materializer.materialize_table(&content, 2).await.unwrap();

        assert_eq!(path, dir.path().join("tables").join("table_2.html"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("<table><tr><td>1</td></tr></table>"));
    }
}
