use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// 视觉元素的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Image,
    Figure,
    Table,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Image => "image",
            ElementKind::Figure => "figure",
            ElementKind::Table => "table",
        }
    }

    /// 产物所在的子目录；图片与图都放在 images/ 下
    pub fn subdir(&self) -> &'static str {
        match self {
            ElementKind::Image | ElementKind::Figure => "images",
            ElementKind::Table => "tables",
        }
    }
}

/// 表格的结构化内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableContent {
    /// 原始 `<table>` 标记
    pub html: String,
    pub rows: Vec<Vec<String>>,
    /// 第一行是否为表头
    pub has_header: bool,
}

/// 远程资源引用
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAsset {
    /// 文档中出现的原始引用
    pub reference: String,
    /// 相对页面基准 URL 解析后的绝对地址
    pub url: Url,
}

/// 图片/图只有远程引用，表格只有内联内容
#[derive(Debug, Clone, PartialEq)]
pub enum ElementPayload {
    Remote(RemoteAsset),
    Inline(TableContent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualElement {
    pub kind: ElementKind,
    /// 在同类元素中的序号，从 1 开始
    pub ordinal: u32,
    pub caption_or_alt: String,
    pub context: String,
    pub payload: ElementPayload,
    /// 仅在落盘成功后设置
    pub local_path: Option<PathBuf>,
}

impl VisualElement {
    pub fn source_reference(&self) -> Option<&RemoteAsset> {
        match &self.payload {
            ElementPayload::Remote(asset) => Some(asset),
            ElementPayload::Inline(_) => None,
        }
    }

    pub fn table_content(&self) -> Option<&TableContent> {
        match &self.payload {
            ElementPayload::Inline(content) => Some(content),
            ElementPayload::Remote(_) => None,
        }
    }

    pub fn structured_data(&self) -> Option<&[Vec<String>]> {
        self.table_content().map(|t| t.rows.as_slice())
    }

    pub fn is_materialized(&self) -> bool {
        self.local_path.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub affiliation: Option<String>,
}

/// 论文级别的信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperInfo {
    pub title: String,
    pub authors: Vec<Author>,
    pub source_url: String,
    pub doi: Option<String>,
    pub pmcid: Option<String>,
    pub journal: Option<String>,
    pub pubdate: Option<String>,
}

/// 一次运行的全部提取结果，组装完成后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub paper: PaperInfo,
    pub images: Vec<VisualElement>,
    pub figures: Vec<VisualElement>,
    pub tables: Vec<VisualElement>,
    pub extraction_date: String,
}

fn path_string(path: &Option<PathBuf>) -> Option<String> {
    path.as_deref().map(|p: &Path| p.to_string_lossy().replace('\\', "/"))
}

impl ExtractionResult {
    pub fn total_elements(&self) -> usize {
        self.images.len() + self.figures.len() + self.tables.len()
    }

    pub fn failed_elements(&self) -> usize {
        self.all_elements().filter(|e| !e.is_materialized()).count()
    }

    pub fn all_elements(&self) -> impl Iterator<Item = &VisualElement> {
        self.images.iter().chain(self.figures.iter()).chain(self.tables.iter())
    }

    pub fn to_document(&self) -> MetadataDocument {
        let images = self
            .images
            .iter()
            .map(|e| ImageRecord {
                kind: e.kind.as_str().to_string(),
                number: e.ordinal,
                alt_text: e.caption_or_alt.clone(),
                image_url: e.source_reference().map(|a| a.url.to_string()).unwrap_or_default(),
                local_path: path_string(&e.local_path),
                context: e.context.clone(),
            })
            .collect();

        let tables = self
            .tables
            .iter()
            .map(|e| {
                let content = e.table_content();
                TableRecord {
                    kind: e.kind.as_str().to_string(),
                    number: e.ordinal,
                    caption: e.caption_or_alt.clone(),
                    html_content: content.map(|c| c.html.clone()).unwrap_or_default(),
                    local_path: path_string(&e.local_path),
                    data: content.map(|c| c.rows.clone()).unwrap_or_default(),
                    has_header: content.map(|c| c.has_header).unwrap_or(false),
                    context: e.context.clone(),
                }
            })
            .collect();

        let figures = self
            .figures
            .iter()
            .map(|e| FigureRecord {
                kind: e.kind.as_str().to_string(),
                number: e.ordinal,
                caption: e.caption_or_alt.clone(),
                image_url: e.source_reference().map(|a| a.url.to_string()).unwrap_or_default(),
                local_path: path_string(&e.local_path),
                context: e.context.clone(),
            })
            .collect();

        MetadataDocument {
            images,
            tables,
            figures,
            metadata: RunSummary {
                source_url: self.paper.source_url.clone(),
                title: self.paper.title.clone(),
                authors: self.paper.authors.iter().map(|a| a.name.clone()).collect(),
                doi: self.paper.doi.clone(),
                pmcid: self.paper.pmcid.clone(),
                extraction_date: self.extraction_date.clone(),
                total_elements: self.total_elements(),
                failed_elements: self.failed_elements(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: u32,
    pub alt_text: String,
    pub image_url: String,
    pub local_path: Option<String>,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: u32,
    pub caption: String,
    pub html_content: String,
    pub local_path: Option<String>,
    pub data: Vec<Vec<String>>,
    pub has_header: bool,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: u32,
    pub caption: String,
    pub image_url: String,
    pub local_path: Option<String>,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub source_url: String,
    pub title: String,
    pub authors: Vec<String>,
    pub doi: Option<String>,
    pub pmcid: Option<String>,
    pub extraction_date: String,
    pub total_elements: usize,
    pub failed_elements: usize,
}

/// visual_elements_metadata.json 的结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub images: Vec<ImageRecord>,
    pub tables: Vec<TableRecord>,
    pub figures: Vec<FigureRecord>,
    pub metadata: RunSummary,
}
