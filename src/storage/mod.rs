pub mod assets;
pub mod models;
pub mod projection;

pub use assets::AssetMaterializer;
pub use models::{
    Author, ElementKind, ElementPayload, ExtractionResult, MetadataDocument, PaperInfo,
    RemoteAsset, TableContent, VisualElement,
};
pub use projection::{persist_projection, project, DatabaseProjection};

use std::path::Path;
use tracing::info;

use crate::utils::VisResult;

pub const METADATA_FILE: &str = "visual_elements_metadata.json";
pub const DATABASE_FILE: &str = "database_data.json";

/// 聚合各类元素；保持分类顺序，不重新编号
pub fn assemble(
    images: Vec<VisualElement>,
    figures: Vec<VisualElement>,
    tables: Vec<VisualElement>,
    paper: PaperInfo,
) -> ExtractionResult {
    ExtractionResult {
        paper,
        images,
        figures,
        tables,
        extraction_date: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

pub fn persist(result: &ExtractionResult, path: &Path) -> VisResult<()> {
    let json = serde_json::to_string_pretty(&result.to_document())?;
    std::fs::write(path, json)?;
    info!("元数据已保存: {}", path.display());
    Ok(())
}
