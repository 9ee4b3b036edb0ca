//! 从论文网页中提取图片、图与表格，连同标题与上下文一起落盘

pub mod config;
pub mod crawler;
pub mod parser;
pub mod pipeline;
pub mod storage;
pub mod utils;

pub use config::{AppConfig, RuleConfig};
pub use pipeline::{ExtractionPipeline, PipelineOutput};
pub use utils::{VisError, VisResult};
