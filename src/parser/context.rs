use scraper::{ElementRef, Selector};
use tracing::warn;

use super::classifier::Candidate;
use super::{ancestor_elements, element_text, parent_element, NodeView};
use crate::config::RuleConfig;
use crate::storage::models::ElementKind;
use crate::utils::truncate_chars;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "li", "main", "ol", "p", "pre",
    "section", "table", "ul",
];

fn is_block(element: &ElementRef<'_>) -> bool {
    BLOCK_TAGS.contains(&element.tag_name())
}

fn non_empty_text(element: ElementRef<'_>) -> Option<String> {
    let text = element_text(element);
    (!text.is_empty()).then_some(text)
}

/// 为元素找标题/alt 文本，并截取前后相邻块的文字作为上下文
pub struct ContextExtractor {
    caption_selectors: Vec<Selector>,
    max_chars: usize,
}

impl ContextExtractor {
    pub fn new(rules: &RuleConfig, max_chars: usize) -> Self {
        let caption_selectors = rules
            .caption_selectors
            .iter()
            .filter_map(|s| match Selector::parse(s) {
                Ok(selector) => Some(selector),
                Err(e) => {
                    warn!("忽略无效的标题选择器 '{}': {:?}", s, e);
                    None
                }
            })
            .collect();

        Self {
            caption_selectors,
            max_chars,
        }
    }

    /// 返回 (标题或 alt, 上下文)；找不到时为空字符串
    pub fn extract(&self, candidate: &Candidate<'_>) -> (String, String) {
        let caption = self.caption(candidate);
        let anchor = match candidate.kind {
            ElementKind::Figure => candidate.container.unwrap_or(candidate.node),
            _ => candidate.node,
        };
        (caption, self.context_window(anchor))
    }

    fn caption(&self, candidate: &Candidate<'_>) -> String {
        let node = candidate.node;
        let explicit = match candidate.kind {
            ElementKind::Figure => candidate
                .container
                .and_then(|container| self.caption_within(container)),
            ElementKind::Table => self.table_caption(node),
            ElementKind::Image => self.sibling_caption(node),
        };

        explicit
            .or_else(|| {
                node.attr("alt")
                    .map(|alt| alt.trim().to_string())
                    .filter(|alt| !alt.is_empty())
            })
            .unwrap_or_default()
    }

    fn is_caption(&self, element: &ElementRef<'_>) -> bool {
        self.caption_selectors.iter().any(|s| s.matches(element))
    }

    fn caption_within(&self, scope: ElementRef<'_>) -> Option<String> {
        self.caption_selectors
            .iter()
            .find_map(|selector| scope.select(selector).find_map(non_empty_text))
    }

    /// 紧邻的前一个或后一个元素兄弟节点
    fn sibling_caption(&self, node: ElementRef<'_>) -> Option<String> {
        let prev = node.prev_siblings().filter_map(ElementRef::wrap).next();
        let next = node.next_siblings().filter_map(ElementRef::wrap).next();

        prev.into_iter()
            .chain(next)
            .filter(|el| self.is_caption(el))
            .find_map(non_empty_text)
    }

    /// `<caption>` 子节点 → 相邻兄弟 → 包裹容器下的其它标题节点
    fn table_caption(&self, table: ElementRef<'_>) -> Option<String> {
        table
            .children()
            .filter_map(ElementRef::wrap)
            .find(|child| child.tag_name() == "caption")
            .and_then(non_empty_text)
            .or_else(|| self.sibling_caption(table))
            .or_else(|| {
                parent_element(table)
                    .filter(|p| !matches!(p.tag_name(), "body" | "html"))?
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| el.id() != table.id() && self.is_caption(el))
                    .find_map(non_empty_text)
            })
    }

    fn context_window(&self, anchor: ElementRef<'_>) -> String {
        let block = if is_block(&anchor) {
            anchor
        } else {
            ancestor_elements(anchor)
                .take_while(|a| a.tag_name() != "body")
                .find(is_block)
                .unwrap_or(anchor)
        };

        let before = block
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .filter(is_block)
            .find_map(non_empty_text);
        let after = block
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .filter(is_block)
            .find_map(non_empty_text);

        let mut parts: Vec<String> = before.into_iter().chain(after).collect();
        if parts.is_empty() {
            parts.extend(non_empty_text(block));
        }

        truncate_chars(&parts.join(" "), self.max_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, Classifier};
    use url::Url;

    fn extract_all(html: &str, max_chars: usize) -> Vec<(String, String)> {
        let tree = parse(html).unwrap();
        let base = Url::parse("https://example.org/").unwrap();
        let rules = RuleConfig::default();
        let extractor = ContextExtractor::new(&rules, max_chars);
        Classifier::new(&rules)
            .classify(&tree, &base)
            .iter()
            .map(|c| extractor.extract(c))
            .collect()
    }

    #[test]
    fn figure_caption_from_container() {
        let out = extract_all(
            r#"<body>
                <p>Methods were applied.</p>
                <div class="fig"><img src="f.png" alt="alt text"><div class="caption"> Figure 1.  Bone density </div></div>
                <p>Results follow.</p>
            </body>"#,
            500,
        );
        assert_eq!(out[0].0, "Figure 1. Bone density");
        assert_eq!(out[0].1, "Methods were applied. Results follow.");
    }

    #[test]
    fn table_caption_sources_in_order() {
        let out = extract_all(
            r#"<body>
                <table><caption>Table 1. Counts</caption><tr><td>1</td></tr></table>
                <div class="table-caption">Table 2. Doses</div>
                <table><tr><td>2</td></tr></table>
                <div><table><tr><td>3</td></tr></table><p class="caption">Table 3. Notes</p></div>
                <table><tr><td>4</td></tr></table>
            </body>"#,
            500,
        );
        let captions: Vec<&str> = out.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(captions, vec!["Table 1. Counts", "Table 2. Doses", "Table 3. Notes", ""]);
    }

    #[test]
    fn image_falls_back_to_alt_then_empty() {
        let out = extract_all(
            r#"<body><p><img src="a.png" alt=" Mouse femur "></p><p><img src="b.png"></p></body>"#,
            500,
        );
        assert_eq!(out[0].0, "Mouse femur");
        assert_eq!(out[1].0, "");
    }

    #[test]
    fn context_uses_own_block_when_no_siblings() {
        let out = extract_all(
            r#"<body><div><p>Shown below <img src="a.png"> is the sample.</p></div></body>"#,
            500,
        );
        assert_eq!(out[0].1, "Shown below is the sample.");
    }

    #[test]
    fn context_is_truncated_by_characters() {
        let long = "é".repeat(50);
        let out = extract_all(
            &format!(r#"<body><p>{}</p><figure><img src="f.png"></figure></body>"#, long),
            10,
        );
        assert_eq!(out[0].1.chars().count(), 10);
    }
}
