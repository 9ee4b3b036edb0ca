pub mod rules;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use rules::RuleConfig;

pub const SETTINGS_PATH: &str = "config/settings.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub output: OutputConfig,
    pub extract: ExtractConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// 失败后的额外尝试次数（不含首次请求）
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub user_agent: String,
    /// 并发下载数
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// 上下文窗口的最大字符数
    pub context_max_chars: usize,
    /// 是否通过 PMC 接口补全论文元数据
    pub enrich_from_pmc: bool,
}

impl AppConfig {
    /// 依次叠加 config/settings.toml 与 PAPERVIS__ 前缀的环境变量
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(SETTINGS_PATH).required(false))
            .add_source(
                config::Environment::with_prefix("PAPERVIS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn worker_count(&self) -> usize {
        self.concurrency.clamp(1, 8)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 1,
            retry_delay_ms: 1000,
            user_agent: "Mozilla/5.0 (compatible; papervis/0.1; research figure extraction)".to_string(),
            concurrency: 4,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("extracted_visuals"),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            context_max_chars: 500,
            enrich_from_pmc: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [fetch]
            concurrency = 32

            [extract]
            context_max_chars = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.fetch.max_retries, 1);
        assert_eq!(config.fetch.worker_count(), 8);
        assert_eq!(config.extract.context_max_chars, 120);
        assert!(!config.extract.enrich_from_pmc);
        assert_eq!(config.output.output_dir, PathBuf::from("extracted_visuals"));
    }

    #[test]
    fn zero_concurrency_still_runs_one_worker() {
        let fetch = FetchConfig {
            concurrency: 0,
            ..FetchConfig::default()
        };
        assert_eq!(fetch.worker_count(), 1);
    }
}
