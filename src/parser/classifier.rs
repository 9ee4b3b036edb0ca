use scraper::ElementRef;
use std::collections::HashMap;
use tracing::{debug, info};
use url::Url;

use super::{ancestor_elements, parent_element, resolve_reference, DocumentTree, NodeView};
use crate::config::rules::{ContainerMatcher, RuleConfig};
use crate::storage::models::{ElementKind, RemoteAsset};

/// 分类规则，按 `RULE_ORDER` 依次尝试，先命中者生效
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// `<table>` 本身
    TableStructure,
    /// 位于图容器内的 `<img>`
    ContainedImage,
    /// 位于表格内的 `<img>`，属于表格内容，不单独计数
    ImageInTable,
    /// 其余 `<img>`
    BareImage,
}

/// 容器匹配在裸图匹配之前，保证图容器里的图片只被记为 Figure
pub const RULE_ORDER: [Rule; 4] = [
    Rule::TableStructure,
    Rule::ContainedImage,
    Rule::ImageInTable,
    Rule::BareImage,
];

impl Rule {
    /// None 表示命中后丢弃
    pub fn kind(&self) -> Option<ElementKind> {
        match self {
            Rule::TableStructure => Some(ElementKind::Table),
            Rule::ContainedImage => Some(ElementKind::Figure),
            Rule::ImageInTable => None,
            Rule::BareImage => Some(ElementKind::Image),
        }
    }
}

impl ContainerMatcher {
    pub fn matches<N: NodeView>(&self, node: &N) -> bool {
        match self {
            ContainerMatcher::Tag(tag) => node.tag_name().eq_ignore_ascii_case(tag),
            ContainerMatcher::ClassContains(needle) => node
                .class_attr()
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
            ContainerMatcher::ClassPrefix(prefix) => {
                let prefix = prefix.to_ascii_lowercase();
                node.class_attr()
                    .split_ascii_whitespace()
                    .any(|token| token.to_ascii_lowercase().starts_with(&prefix))
            }
            ContainerMatcher::Attribute(name) => node.attr(name).is_some(),
        }
    }
}

/// 分类结果：种类、序号、节点，以及图片类元素已解析的地址
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub kind: ElementKind,
    pub ordinal: u32,
    pub node: ElementRef<'a>,
    /// 命中的图容器（仅 Figure）
    pub container: Option<ElementRef<'a>>,
    pub source: Option<RemoteAsset>,
}

pub struct Classifier {
    containers: Vec<ContainerMatcher>,
    skip_url_patterns: Vec<String>,
    skip_alt_patterns: Vec<String>,
    interface_indicators: Vec<String>,
    min_image_size: u32,
}

impl Classifier {
    pub fn new(rules: &RuleConfig) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items.iter().map(|s| s.to_ascii_lowercase()).collect()
        };
        Self {
            containers: rules.figure_containers.clone(),
            skip_url_patterns: lower(&rules.skip_url_patterns),
            skip_alt_patterns: lower(&rules.skip_alt_patterns),
            interface_indicators: lower(&rules.interface_indicators),
            min_image_size: rules.min_image_size,
        }
    }

    pub fn is_figure_container<N: NodeView>(&self, node: &N) -> bool {
        self.containers.iter().any(|m| m.matches(node))
    }

    /// 最近的图容器祖先
    pub fn figure_container<'a>(&self, node: ElementRef<'a>) -> Option<ElementRef<'a>> {
        ancestor_elements(node).find(|a| self.is_figure_container(a))
    }

    fn rule_applies(&self, rule: Rule, node: ElementRef<'_>) -> bool {
        let is_img = node.tag_name() == "img";
        match rule {
            Rule::TableStructure => node.tag_name() == "table",
            Rule::ContainedImage => is_img && self.figure_container(node).is_some(),
            Rule::ImageInTable => is_img && ancestor_elements(node).any(|a| a.tag_name() == "table"),
            Rule::BareImage => is_img,
        }
    }

    pub fn match_rule(&self, node: ElementRef<'_>) -> Option<Rule> {
        RULE_ORDER.into_iter().find(|rule| self.rule_applies(*rule, node))
    }

    /// 图标、logo、导航等界面图片
    fn is_interface_chrome(&self, img: ElementRef<'_>, url: &Url) -> bool {
        let url_text = url.as_str().to_ascii_lowercase();
        if self.skip_url_patterns.iter().any(|p| url_text.contains(p.as_str())) {
            return true;
        }

        let alt = img.attr("alt").unwrap_or("").to_ascii_lowercase();
        if self.skip_alt_patterns.iter().any(|p| alt.contains(p.as_str())) {
            return true;
        }

        let dimension = |name: &str| img.attr(name).and_then(|v| v.trim().parse::<u32>().ok());
        if let (Some(w), Some(h)) = (dimension("width"), dimension("height")) {
            if w < self.min_image_size || h < self.min_image_size {
                return true;
            }
        }

        if let Some(parent) = parent_element(img) {
            let marks = format!("{} {}", parent.class_attr(), parent.id_attr()).to_ascii_lowercase();
            if self.interface_indicators.iter().any(|i| marks.contains(i.as_str())) {
                return true;
            }
        }

        false
    }

    fn image_source(img: ElementRef<'_>) -> Option<&str> {
        ["src", "data-src"]
            .into_iter()
            .filter_map(|name| img.attr(name))
            .find(|v| !v.trim().is_empty())
    }

    /// 按文档顺序分类；无法归类的节点直接略过，整体不会失败
    pub fn classify<'a>(&self, tree: &'a DocumentTree, base_url: &Url) -> Vec<Candidate<'a>> {
        let mut counters: HashMap<ElementKind, u32> = HashMap::new();
        let mut candidates = Vec::new();

        for node in tree.elements() {
            let Some(rule) = self.match_rule(node) else {
                continue;
            };
            let Some(kind) = rule.kind() else {
                continue;
            };

            let source = if kind == ElementKind::Table {
                None
            } else {
                let Some(raw) = Self::image_source(node) else {
                    debug!("跳过无地址的图片");
                    continue;
                };
                let Some(url) = resolve_reference(base_url, raw) else {
                    debug!("跳过无法解析的图片地址: {}", raw);
                    continue;
                };
                if rule == Rule::BareImage && self.is_interface_chrome(node, &url) {
                    debug!("跳过界面图片: {}", url);
                    continue;
                }
                Some(RemoteAsset {
                    reference: raw.to_string(),
                    url,
                })
            };

            let counter = counters.entry(kind).or_insert(0);
            *counter += 1;

            candidates.push(Candidate {
                kind,
                ordinal: *counter,
                node,
                container: if kind == ElementKind::Figure {
                    self.figure_container(node)
                } else {
                    None
                },
                source,
            });
        }

        info!(
            "分类完成: 图片 {}, 图 {}, 表格 {}",
            counters.get(&ElementKind::Image).unwrap_or(&0),
            counters.get(&ElementKind::Figure).unwrap_or(&0),
            counters.get(&ElementKind::Table).unwrap_or(&0)
        );
        candidates
    }
}
