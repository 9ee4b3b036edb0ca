use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use tracing::debug;

use super::{ancestor_elements, element_text, NodeView};
use crate::storage::models::TableContent;

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("Failed to parse row selector"));

pub struct TableParser;

impl TableParser {
    pub fn new() -> Self {
        Self
    }

    /// 读取表格的单元格文本；嵌套表格的行不计入外层表格
    pub fn extract(&self, table: ElementRef<'_>) -> TableContent {
        let own_rows: Vec<ElementRef<'_>> = table
            .select(&ROW)
            .filter(|tr| {
                ancestor_elements(*tr)
                    .find(|a| a.tag_name() == "table")
                    .map(|owner| owner.id() == table.id())
                    .unwrap_or(false)
            })
            .collect();

        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut has_header = false;

        for tr in &own_rows {
            let cells: Vec<ElementRef<'_>> = tr
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.tag_name(), "td" | "th"))
                .collect();

            if cells.is_empty() {
                continue;
            }

            if rows.is_empty() {
                has_header = Self::is_header_row(*tr, &cells);
            }
            rows.push(cells.into_iter().map(element_text).collect());
        }

        debug!("解析表格: {} 行, 表头: {}", rows.len(), has_header);

        TableContent {
            html: table.html(),
            rows,
            has_header,
        }
    }

    /// 全部是 `<th>` 或位于 `<thead>` 中的首行视为表头
    fn is_header_row(tr: ElementRef<'_>, cells: &[ElementRef<'_>]) -> bool {
        let in_thead = super::parent_element(tr)
            .map(|p| p.tag_name() == "thead")
            .unwrap_or(false);
        in_thead || cells.iter().all(|c| c.tag_name() == "th")
    }

    /// 独立保存用的完整 HTML 文档
    pub fn render_document(content: &TableContent) -> String {
        format!(
            "<html><head><meta charset='utf-8'></head><body>{}</body></html>",
            content.html
        )
    }
}

impl Default for TableParser {
    fn default() -> Self {
        Self::new()
    }
}
