use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::Fetcher;
use crate::utils::VisResult;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

static RE_PMCID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PMC(\d+)").expect("Failed to compile PMCID regex"));

/// PubMed Central 返回的论文元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PmcMetadata {
    pub pmcid: String,
    pub title: Option<String>,
    pub journal: Option<String>,
    pub pubdate: Option<String>,
    pub authors: Vec<String>,
    pub doi: Option<String>,
}

/// 从 URL 中取出 PMCID 的数字部分
pub fn pmcid_from_url(url: &str) -> Option<String> {
    RE_PMCID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub struct PmcClient {
    fetcher: Fetcher,
    base_url: String,
}

impl PmcClient {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            base_url: EUTILS_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// esummary 取基本信息；缺少 DOI 时再用 efetch 的 XML 补
    pub async fn fetch(&self, pmcid: &str) -> VisResult<PmcMetadata> {
        info!("查询 PMC 元数据: PMC{}", pmcid);

        let esummary_url = Url::parse(&format!(
            "{}/esummary.fcgi?db=pmc&id={}&retmode=json",
            self.base_url, pmcid
        ))?;
        let response = self.fetcher.fetch_asset(&esummary_url).await?;
        let summary: Value = serde_json::from_slice(&response.body)?;
        let mut metadata = parse_esummary(pmcid, &summary);

        if metadata.doi.is_none() {
            let efetch_url = Url::parse(&format!(
                "{}/efetch.fcgi?db=pmc&id={}&retmode=xml",
                self.base_url, pmcid
            ))?;
            match self.fetcher.fetch_asset(&efetch_url).await {
                Ok(resp) => {
                    metadata.doi = parse_efetch_doi(&String::from_utf8_lossy(&resp.body));
                }
                Err(e) => warn!("efetch 查询 DOI 失败: {}", e),
            }
        }

        debug!("PMC 元数据: {:?}", metadata);
        Ok(metadata)
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub(crate) fn strip_doi_prefix(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("doi:") {
        trimmed[4..].trim().to_string()
    } else if let Some(idx) = lower.find("doi.org/") {
        trimmed[idx + "doi.org/".len()..].to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn parse_esummary(pmcid: &str, summary: &Value) -> PmcMetadata {
    let result = &summary["result"][pmcid];

    let authors = result["authors"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|a| match a {
                    Value::Object(_) => non_empty_str(&a["name"]),
                    other => non_empty_str(other),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut doi = non_empty_str(&result["elocationid"])
        .filter(|e| e.to_ascii_lowercase().contains("doi"))
        .map(|e| strip_doi_prefix(&e));

    if doi.is_none() {
        if let Some(ids) = result["articleids"].as_array() {
            doi = ids.iter().find_map(|aid| {
                let value = non_empty_str(&aid["value"]).or_else(|| non_empty_str(&aid["id"]))?;
                let idtype = aid["idtype"].as_str().unwrap_or("").to_ascii_lowercase();
                if idtype.contains("doi") || value.starts_with("10.") || value.contains("doi.org") {
                    Some(strip_doi_prefix(&value))
                } else {
                    None
                }
            });
        }
    }

    PmcMetadata {
        pmcid: pmcid.to_string(),
        title: non_empty_str(&result["title"]),
        journal: non_empty_str(&result["fulljournalname"]),
        pubdate: non_empty_str(&result["pubdate"]),
        authors,
        doi,
    }
}

/// 在 efetch XML 中查找 `<article-id pub-id-type="doi">`，其次是指向 doi.org 的 `<ext-link>`
pub(crate) fn parse_efetch_doi(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_doi_id = false;
    let mut link_doi: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"article-id" => {
                in_doi_id = matches!(
                    e.try_get_attribute("pub-id-type"),
                    Ok(Some(attr)) if attr
                        .unescape_value()
                        .map(|v| v.to_ascii_lowercase().contains("doi"))
                        .unwrap_or(false)
                );
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.name().as_ref() == b"ext-link" && link_doi.is_none() =>
            {
                let href_attr = match e.try_get_attribute("xlink:href") {
                    Ok(Some(attr)) => Some(attr),
                    _ => e.try_get_attribute("href").ok().flatten(),
                };
                if let Some(attr) = href_attr {
                    if let Ok(href) = attr.unescape_value() {
                        if href.contains("doi.org") {
                            link_doi = Some(strip_doi_prefix(&href));
                        }
                    }
                }
            }
            Ok(Event::Text(t)) if in_doi_id => {
                if let Ok(text) = t.unescape() {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Some(text.to_string());
                    }
                }
            }
            Ok(Event::End(_)) => in_doi_id = false,
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("efetch XML 解析中断: {}", e);
                break;
            }
            _ => {}
        }
    }

    link_doi
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::{quick_fetch_config, ScriptedTransport};
    use std::sync::Arc;

    #[test]
    fn pmcid_is_read_from_article_url() {
        assert_eq!(
            pmcid_from_url("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC4136787/").as_deref(),
            Some("4136787")
        );
        assert_eq!(pmcid_from_url("https://example.org/paper/42"), None);
    }

    #[test]
    fn esummary_fields_and_articleid_doi() {
        let summary: Value = serde_json::from_str(
            r#"{"result": {"uids": ["4136787"], "4136787": {
                "title": "Spaceflight and bone loss",
                "fulljournalname": "PLoS ONE",
                "pubdate": "2014 Aug 18",
                "authors": [{"name": "Smith J"}, {"name": ""}, "Doe A"],
                "elocationid": "e104830",
                "articleids": [
                    {"idtype": "pmid", "value": "25133741"},
                    {"idtype": "doi", "value": "10.1371/journal.pone.0104830"}
                ]
            }}}"#,
        )
        .unwrap();

        let meta = parse_esummary("4136787", &summary);
        assert_eq!(meta.title.as_deref(), Some("Spaceflight and bone loss"));
        assert_eq!(meta.journal.as_deref(), Some("PLoS ONE"));
        assert_eq!(meta.authors, vec!["Smith J", "Doe A"]);
        assert_eq!(meta.doi.as_deref(), Some("10.1371/journal.pone.0104830"));
    }

    #[test]
    fn elocation_doi_takes_priority() {
        let summary: Value = serde_json::from_str(
            r#"{"result": {"7": {"elocationid": "doi: 10.1000/xyz"}}}"#,
        )
        .unwrap();
        assert_eq!(parse_esummary("7", &summary).doi.as_deref(), Some("10.1000/xyz"));
    }

    #[test]
    fn efetch_article_id_doi() {
        let xml = r#"<pmc-articleset><article><front><article-meta>
            <article-id pub-id-type="pmid">25133741</article-id>
            <article-id pub-id-type="doi">10.1371/journal.pone.0104830</article-id>
            </article-meta></front></article></pmc-articleset>"#;
        assert_eq!(
            parse_efetch_doi(xml).as_deref(),
            Some("10.1371/journal.pone.0104830")
        );
    }

    #[test]
    fn efetch_ext_link_fallback() {
        let xml = r#"<article><back>
            <ext-link ext-link-type="uri" xlink:href="https://doi.org/10.5555/abc.1"/>
            </back></article>"#;
        assert_eq!(parse_efetch_doi(xml).as_deref(), Some("10.5555/abc.1"));
        assert_eq!(parse_efetch_doi("<article></article>"), None);
    }

    #[tokio::test]
    async fn fetch_falls_back_to_efetch_for_doi() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "https://eutils.test/esummary.fcgi?db=pmc&id=99&retmode=json",
            200,
            Some("application/json"),
            br#"{"result": {"99": {"title": "A paper", "authors": [{"name": "Lee K"}]}}}"#,
        );
        transport.respond(
            "https://eutils.test/efetch.fcgi?db=pmc&id=99&retmode=xml",
            200,
            Some("text/xml"),
            br#"<article><article-id pub-id-type="doi">10.1/xyz</article-id></article>"#,
        );

        let client = PmcClient::new(Fetcher::new(transport.clone(), &quick_fetch_config()))
            .with_base_url("https://eutils.test/");
        let meta = client.fetch("99").await.unwrap();

        assert_eq!(meta.title.as_deref(), Some("A paper"));
        assert_eq!(meta.authors, vec!["Lee K"]);
        assert_eq!(meta.doi.as_deref(), Some("10.1/xyz"));
    }
}
