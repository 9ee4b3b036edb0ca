pub mod classifier;
pub mod context;
pub mod paper_info;
pub mod table_parser;

pub use classifier::{Candidate, Classifier, Rule};
pub use context::ContextExtractor;
pub use table_parser::TableParser;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::config::RuleConfig;
use crate::storage::models::{ElementPayload, PaperInfo, VisualElement};
use crate::utils::{normalize_whitespace, VisError, VisResult};

static BASE_HREF: Lazy<Selector> =
    Lazy::new(|| Selector::parse("base[href]").expect("Failed to parse base selector"));

/// 解析后的文档树
pub struct DocumentTree {
    html: Html,
}

impl DocumentTree {
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// 按文档顺序遍历所有元素
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.root().descendants().filter_map(ElementRef::wrap)
    }
}

/// 宽松解析：结构错误会被容忍，只有完全不像标记文档时才报错
pub fn parse(raw_html: &str) -> VisResult<DocumentTree> {
    if raw_html.trim().is_empty() {
        return Err(VisError::Parse("文档为空".to_string()));
    }
    if raw_html.contains('\0') {
        return Err(VisError::Parse("文档包含二进制内容".to_string()));
    }
    if !raw_html.contains('<') {
        return Err(VisError::Parse("内容不是标记文档".to_string()));
    }

    let html = Html::parse_document(raw_html);
    if !html.errors.is_empty() {
        debug!("HTML 解析容错 {} 处", html.errors.len());
    }
    Ok(DocumentTree { html })
}

/// 分类规则需要的节点能力：标签名、属性、是否有子节点
pub trait NodeView {
    fn tag_name(&self) -> &str;
    fn attr(&self, name: &str) -> Option<&str>;
    fn has_children(&self) -> bool;

    fn class_attr(&self) -> &str {
        self.attr("class").unwrap_or("")
    }

    fn id_attr(&self) -> &str {
        self.attr("id").unwrap_or("")
    }
}

impl<'a> NodeView for ElementRef<'a> {
    fn tag_name(&self) -> &str {
        self.value().name()
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.value().attr(name)
    }

    fn has_children(&self) -> bool {
        (**self).has_children()
    }
}

/// 元素的规范化文本
pub fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

pub fn parent_element<'a>(element: ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.parent().and_then(ElementRef::wrap)
}

pub fn ancestor_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.ancestors().filter_map(ElementRef::wrap)
}

/// 把文档中的引用解析成可下载的绝对 URL；空引用、data: 等非 http(s) 地址返回 None
pub fn resolve_reference(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let url = base.join(raw).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// 页面中 `<base href>` 优先于页面自身的 URL
pub fn document_base_url(tree: &DocumentTree, page_url: &Url) -> Url {
    tree.html
        .select(&BASE_HREF)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

/// 页面分析结果，已与文档树脱离，可以跨 await 使用
#[derive(Debug, Clone)]
pub struct Analysis {
    pub base_url: Url,
    pub paper: PaperInfo,
    /// 按分类顺序排列的元素
    pub elements: Vec<VisualElement>,
}

/// 分类 + 标题/上下文 + 表格解析
pub struct PageAnalyzer {
    classifier: Classifier,
    context_extractor: ContextExtractor,
    table_parser: TableParser,
}

impl PageAnalyzer {
    pub fn new(rules: &RuleConfig, context_max_chars: usize) -> Self {
        Self {
            classifier: Classifier::new(rules),
            context_extractor: ContextExtractor::new(rules, context_max_chars),
            table_parser: TableParser::new(),
        }
    }

    pub fn analyze(&self, tree: &DocumentTree, page_url: &Url) -> Analysis {
        let base_url = document_base_url(tree, page_url);
        let paper = paper_info::extract_paper_info(tree, page_url);

        let candidates = self.classifier.classify(tree, &base_url);
        let elements: Vec<VisualElement> = candidates
            .into_iter()
            .map(|candidate| {
                let (caption_or_alt, context) = self.context_extractor.extract(&candidate);
                let payload = match candidate.source {
                    Some(asset) => ElementPayload::Remote(asset),
                    None => ElementPayload::Inline(self.table_parser.extract(candidate.node)),
                };
                VisualElement {
                    kind: candidate.kind,
                    ordinal: candidate.ordinal,
                    caption_or_alt,
                    context,
                    payload,
                    local_path: None,
                }
            })
            .collect();

        info!("页面分析完成: {} 个视觉元素, 标题: {}", elements.len(), paper.title);

        Analysis {
            base_url,
            paper,
            elements,
        }
    }
}
