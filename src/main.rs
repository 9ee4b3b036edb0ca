use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use url::Url;

use papervis::config::rules::RULES_PATH;
use papervis::config::SETTINGS_PATH;
use papervis::crawler::{Fetcher, PmcClient};
use papervis::parser::{self, paper_info};
use papervis::pipeline::merge_pmc;
use papervis::utils::logger;
use papervis::{AppConfig, ExtractionPipeline, RuleConfig};

#[derive(Parser)]
#[command(name = "papervis")]
#[command(about = "论文网页视觉元素提取工具", long_about = None)]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成默认配置文件
    Init,
    /// 提取论文页面中的图片、图和表格
    Extract {
        /// 论文页面地址
        url: String,
        /// 输出目录（默认取配置中的 output_dir）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 查看论文元数据（含 PMC 补全），不下载任何资源
    Metadata {
        /// 论文页面地址
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose);

    let outcome = match cli.command {
        Commands::Init => init_command().await,
        Commands::Extract { url, output } => extract_command(&url, output).await,
        Commands::Metadata { url } => metadata_command(&url).await,
    };

    if let Err(e) = outcome {
        error!("❌ 任务中止: {:#}", e);
        std::process::exit(1);
    }
}

async fn init_command() -> Result<()> {
    info!("初始化配置...");
    tokio::fs::create_dir_all("config").await?;

    AppConfig::default().save(SETTINGS_PATH)?;
    info!("已生成配置文件: {}", SETTINGS_PATH);

    let rules_toml = toml::to_string_pretty(&RuleConfig::default())?;
    tokio::fs::write(RULES_PATH, rules_toml).await?;
    info!("已生成规则配置: {}", RULES_PATH);

    info!("✅ 初始化完成，运行 'papervis extract <URL>' 开始提取");
    Ok(())
}

async fn extract_command(url: &str, output: Option<PathBuf>) -> Result<()> {
    let app_config = AppConfig::load()?;
    let rules = RuleConfig::load()?;
    let output_dir = output.unwrap_or_else(|| app_config.output.output_dir.clone());

    let pipeline = ExtractionPipeline::new(app_config, &rules)?;
    let output = pipeline.run(url, &output_dir).await?;

    let result = &output.result;
    info!("标题: {}", result.paper.title);
    info!(
        "图片 {} / 图 {} / 表格 {}，失败 {}",
        result.images.len(),
        result.figures.len(),
        result.tables.len(),
        result.failed_elements()
    );
    info!("元数据: {}", output.metadata_path.display());
    info!("数据库记录: {}", output.database_path.display());
    Ok(())
}

async fn metadata_command(url: &str) -> Result<()> {
    let app_config = AppConfig::load()?;
    let page_url = Url::parse(url)?;
    let fetcher = Fetcher::from_config(&app_config.fetch)?;

    let raw_html = fetcher.fetch_document(&page_url).await?;
    let mut paper = {
        let tree = parser::parse(&raw_html)?;
        paper_info::extract_paper_info(&tree, &page_url)
    };

    // 该命令总是尝试 PMC 补全，不看 enrich_from_pmc 开关
    if let Some(pmcid) = paper.pmcid.clone() {
        match PmcClient::new(fetcher).fetch(&pmcid).await {
            Ok(meta) => paper = merge_pmc(paper, meta),
            Err(e) => warn!("PMC 元数据补全失败: {}", e),
        }
    }

    println!("{}", serde_json::to_string_pretty(&paper)?);
    Ok(())
}
