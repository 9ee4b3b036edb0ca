use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::models::{ExtractionResult, VisualElement};
use crate::utils::{normalize_whitespace, VisResult};

/// 本次运行中唯一一条 paper 记录的占位主键
pub const PAPER_ID: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub id: u32,
    pub title: String,
    pub source_url: String,
    pub doi: Option<String>,
    pub pmcid: Option<String>,
    pub journal: Option<String>,
    pub pubdate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub id: u32,
    pub name: String,
    pub affiliation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperResourceRecord {
    pub id: u32,
    pub paper_id: u32,
    pub resource_type: String,
    pub number: u32,
    pub caption: String,
    pub source_url: Option<String>,
    pub local_path: Option<String>,
    /// 表格行数据的 JSON 字符串
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperAuthorRecord {
    pub paper_id: u32,
    pub author_id: u32,
    pub author_order: u32,
}

/// database_data.json：四张表对应的扁平记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseProjection {
    pub paper: Vec<PaperRecord>,
    pub author: Vec<AuthorRecord>,
    pub paper_resource: Vec<PaperResourceRecord>,
    pub paper_author: Vec<PaperAuthorRecord>,
}

/// 作者去重键：去首尾空白、折叠空白、忽略大小写
fn author_key(name: &str) -> String {
    normalize_whitespace(name).to_lowercase()
}

fn resource_record(id: u32, element: &VisualElement) -> VisResult<Option<PaperResourceRecord>> {
    let rows = element.structured_data().filter(|rows| !rows.is_empty());
    if element.local_path.is_none() && rows.is_none() {
        return Ok(None);
    }

    let content = match rows {
        Some(rows) => Some(serde_json::to_string(rows)?),
        None => None,
    };

    Ok(Some(PaperResourceRecord {
        id,
        paper_id: PAPER_ID,
        resource_type: element.kind.as_str().to_string(),
        number: element.ordinal,
        caption: element.caption_or_alt.clone(),
        source_url: element.source_reference().map(|a| a.url.to_string()),
        local_path: element
            .local_path
            .as_ref()
            .map(|p| p.to_string_lossy().replace('\\', "/")),
        content,
    }))
}

/// 从提取结果推导出关系型记录；只读、可重复计算
pub fn project(result: &ExtractionResult) -> VisResult<DatabaseProjection> {
    let paper = PaperRecord {
        id: PAPER_ID,
        title: result.paper.title.clone(),
        source_url: result.paper.source_url.clone(),
        doi: result.paper.doi.clone(),
        pmcid: result.paper.pmcid.clone(),
        journal: result.paper.journal.clone(),
        pubdate: result.paper.pubdate.clone(),
    };

    let mut authors: Vec<AuthorRecord> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for author in &result.paper.authors {
        let key = author_key(&author.name);
        if key.is_empty() {
            continue;
        }
        match seen.get(&key) {
            Some(&idx) => {
                if authors[idx].affiliation.is_none() {
                    authors[idx].affiliation = author.affiliation.clone();
                }
            }
            None => {
                seen.insert(key, authors.len());
                authors.push(AuthorRecord {
                    id: authors.len() as u32 + 1,
                    name: normalize_whitespace(&author.name),
                    affiliation: author.affiliation.clone(),
                });
            }
        }
    }

    let paper_author = authors
        .iter()
        .enumerate()
        .map(|(i, a)| PaperAuthorRecord {
            paper_id: PAPER_ID,
            author_id: a.id,
            author_order: i as u32 + 1,
        })
        .collect();

    let mut paper_resource = Vec::new();
    for element in result.all_elements() {
        let id = paper_resource.len() as u32 + 1;
        if let Some(record) = resource_record(id, element)? {
            paper_resource.push(record);
        }
    }

    Ok(DatabaseProjection {
        paper: vec![paper],
        author: authors,
        paper_resource,
        paper_author,
    })
}

pub fn persist_projection(projection: &DatabaseProjection, path: &Path) -> VisResult<()> {
    let json = serde_json::to_string_pretty(projection)?;
    std::fs::write(path, json)?;
    info!(
        "数据库记录已保存: {} (作者 {} 条, 资源 {} 条)",
        path.display(),
        projection.author.len(),
        projection.paper_resource.len()
    );
    Ok(())
}
