use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use url::Url;

use super::{element_text, DocumentTree};
use crate::crawler::pmc::{pmcid_from_url, strip_doi_prefix};
use crate::storage::models::{Author, PaperInfo};
use crate::utils::normalize_whitespace;

struct PaperSelectors {
    named_meta: Selector,
    og_title: Selector,
    heading: Selector,
    page_title: Selector,
    author_fallback: Selector,
    body: Selector,
}

static SELECTORS: Lazy<PaperSelectors> = Lazy::new(|| PaperSelectors {
    named_meta: Selector::parse("meta[name][content]").expect("Failed to parse meta selector"),
    og_title: Selector::parse(r#"meta[property="og:title"][content]"#)
        .expect("Failed to parse og:title selector"),
    heading: Selector::parse("h1").expect("Failed to parse h1 selector"),
    page_title: Selector::parse("head > title").expect("Failed to parse title selector"),
    author_fallback: Selector::parse(".author, [itemprop=\"author\"]")
        .expect("Failed to parse author selector"),
    body: Selector::parse("body").expect("Failed to parse body selector"),
});

static RE_DOI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"10\.\d{4,9}/[^\s"<>]+"#).expect("Failed to compile DOI regex"));

fn clean(value: &str) -> Option<String> {
    let value = normalize_whitespace(value);
    (!value.is_empty()).then_some(value)
}

/// 从页面元数据中读取标题、作者、DOI 等
pub fn extract_paper_info(tree: &DocumentTree, page_url: &Url) -> PaperInfo {
    let html = tree.html();
    let mut info = PaperInfo {
        source_url: page_url.to_string(),
        pmcid: pmcid_from_url(page_url.as_str()),
        ..PaperInfo::default()
    };

    // citation_author_institution 跟在对应的 citation_author 之后
    for meta in html.select(&SELECTORS.named_meta) {
        let name = meta.value().attr("name").unwrap_or("").to_ascii_lowercase();
        let Some(content) = meta.value().attr("content").and_then(clean) else {
            continue;
        };

        match name.as_str() {
            "citation_title" if info.title.is_empty() => info.title = content,
            "citation_author" => info.authors.push(Author {
                name: content,
                affiliation: None,
            }),
            "citation_author_institution" => {
                if let Some(last) = info.authors.last_mut() {
                    if last.affiliation.is_none() {
                        last.affiliation = Some(content);
                    }
                }
            }
            "citation_doi" | "dc.identifier" if info.doi.is_none() => {
                let doi = strip_doi_prefix(&content);
                if doi.starts_with("10.") {
                    info.doi = Some(doi);
                }
            }
            "citation_journal_title" if info.journal.is_none() => info.journal = Some(content),
            "citation_publication_date" | "citation_date" if info.pubdate.is_none() => {
                info.pubdate = Some(content)
            }
            _ => {}
        }
    }

    if info.title.is_empty() {
        info.title = html
            .select(&SELECTORS.og_title)
            .filter_map(|m| m.value().attr("content").and_then(clean))
            .chain(html.select(&SELECTORS.heading).map(element_text))
            .chain(html.select(&SELECTORS.page_title).map(element_text))
            .find(|t| !t.is_empty())
            .unwrap_or_default();
    }

    if info.authors.is_empty() {
        info.authors = html
            .select(&SELECTORS.author_fallback)
            .map(element_text)
            .filter(|name| name.chars().count() > 2)
            .map(|name| Author {
                name,
                affiliation: None,
            })
            .collect();
    }

    if info.doi.is_none() {
        info.doi = html
            .select(&SELECTORS.body)
            .next()
            .map(|body| body.text().collect::<Vec<_>>().join(" "))
            .and_then(|text| RE_DOI.find(&text).map(|m| m.as_str().trim_end_matches(['.', ',', ';', ')']).to_string()));
    }

    info
}
