use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use url::Url;

use crate::config::{AppConfig, RuleConfig};
use crate::crawler::{Fetcher, PmcClient, PmcMetadata};
use crate::parser::{self, Analysis, PageAnalyzer};
use crate::storage::{
    self, AssetMaterializer, Author, DatabaseProjection, ElementKind, ElementPayload,
    ExtractionResult, PaperInfo, VisualElement, DATABASE_FILE, METADATA_FILE,
};
use crate::utils::{VisError, VisResult};

/// 一次运行的产物
#[derive(Debug)]
pub struct PipelineOutput {
    pub result: ExtractionResult,
    pub projection: DatabaseProjection,
    pub metadata_path: PathBuf,
    pub database_path: PathBuf,
}

/// 抓取 → 解析 → 分类 → 上下文 → 落盘 → 汇总 → 投影
pub struct ExtractionPipeline {
    config: AppConfig,
    analyzer: PageAnalyzer,
    fetcher: Fetcher,
}

impl ExtractionPipeline {
    pub fn new(config: AppConfig, rules: &RuleConfig) -> VisResult<Self> {
        let fetcher = Fetcher::from_config(&config.fetch)?;
        Ok(Self::with_fetcher(config, rules, fetcher))
    }

    pub fn with_fetcher(config: AppConfig, rules: &RuleConfig, fetcher: Fetcher) -> Self {
        let analyzer = PageAnalyzer::new(rules, config.extract.context_max_chars);
        Self {
            config,
            analyzer,
            fetcher,
        }
    }

    /// 文档抓取或解析失败时直接返回错误，此前不会写出任何文件
    pub async fn run(&self, url: &str, output_dir: &Path) -> VisResult<PipelineOutput> {
        let page_url = Url::parse(url)?;
        if !matches!(page_url.scheme(), "http" | "https") {
            return Err(VisError::Fetch {
                url: url.to_string(),
                reason: "仅支持 http/https 地址".to_string(),
            });
        }

        info!("开始提取: {}", page_url);
        let raw_html = self.fetcher.fetch_document(&page_url).await?;

        // 文档树不跨越 await
        let Analysis {
            paper, elements, ..
        } = {
            let tree = parser::parse(&raw_html)?;
            self.analyzer.analyze(&tree, &page_url)
        };

        let paper = if self.config.extract.enrich_from_pmc {
            self.enrich(paper).await
        } else {
            paper
        };

        let materializer = AssetMaterializer::new(self.fetcher.clone(), output_dir);
        materializer.prepare_dirs().await?;

        let elements = self.materialize_all(&materializer, elements).await;

        let mut images = Vec::new();
        let mut figures = Vec::new();
        let mut tables = Vec::new();
        for element in elements {
            match element.kind {
                ElementKind::Image => images.push(element),
                ElementKind::Figure => figures.push(element),
                ElementKind::Table => tables.push(element),
            }
        }

        let result = storage::assemble(images, figures, tables, paper);
        let metadata_path = output_dir.join(METADATA_FILE);
        storage::persist(&result, &metadata_path)?;

        let projection = storage::project(&result)?;
        let database_path = output_dir.join(DATABASE_FILE);
        storage::persist_projection(&projection, &database_path)?;

        let failed = result.failed_elements();
        if failed > 0 {
            warn!("提取完成，其中 {} 个元素未能落盘", failed);
        }
        info!(
            "✅ 提取完成: 图片 {}, 图 {}, 表格 {}, 失败 {}",
            result.images.len(),
            result.figures.len(),
            result.tables.len(),
            failed
        );

        Ok(PipelineOutput {
            result,
            projection,
            metadata_path,
            database_path,
        })
    }

    /// 表格同步写出；图片并发下载，结果按原分类顺序回填
    async fn materialize_all(
        &self,
        materializer: &AssetMaterializer,
        mut elements: Vec<VisualElement>,
    ) -> Vec<VisualElement> {
        let mut downloads = Vec::new();

        for (idx, element) in elements.iter_mut().enumerate() {
            match &element.payload {
                ElementPayload::Inline(content) => {
                    match materializer.materialize_table(content, element.ordinal).await {
                        Ok(path) => element.local_path = Some(path),
                        Err(e) => error!("表格 {} 保存失败: {}", element.ordinal, e),
                    }
                }
                ElementPayload::Remote(asset) => {
                    downloads.push((idx, asset.url.clone(), element.kind, element.ordinal));
                }
            }
        }

        let workers = self.config.fetch.worker_count();
        info!("开始下载 {} 个图片资源 (并发 {})", downloads.len(), workers);

        let mut finished: Vec<(usize, VisResult<PathBuf>)> = stream::iter(downloads)
            .map(|(idx, url, kind, ordinal)| async move {
                (idx, materializer.materialize(&url, kind, ordinal).await)
            })
            .buffer_unordered(workers)
            .collect()
            .await;
        finished.sort_by_key(|(idx, _)| *idx);

        for (idx, outcome) in finished {
            let element = &mut elements[idx];
            match outcome {
                Ok(path) => element.local_path = Some(path),
                Err(e) => warn!("{} {} 下载失败: {}", element.kind.as_str(), element.ordinal, e),
            }
        }

        elements
    }

    /// 只补全页面上缺失的字段；查询失败不影响本次运行
    async fn enrich(&self, paper: PaperInfo) -> PaperInfo {
        let Some(pmcid) = paper.pmcid.clone() else {
            return paper;
        };

        match PmcClient::new(self.fetcher.clone()).fetch(&pmcid).await {
            Ok(meta) => merge_pmc(paper, meta),
            Err(e) => {
                warn!("PMC 元数据补全失败: {}", e);
                paper
            }
        }
    }
}

pub fn merge_pmc(mut paper: PaperInfo, meta: PmcMetadata) -> PaperInfo {
    if paper.title.is_empty() {
        paper.title = meta.title.unwrap_or_default();
    }
    if paper.authors.is_empty() {
        paper.authors = meta
            .authors
            .into_iter()
            .map(|name| Author {
                name,
                affiliation: None,
            })
            .collect();
    }
    paper.doi = paper.doi.or(meta.doi);
    paper.journal = paper.journal.or(meta.journal);
    paper.pubdate = paper.pubdate.or(meta.pubdate);
    paper
}
