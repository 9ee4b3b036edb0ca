use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const RULES_PATH: &str = "config/rules.toml";

/// 图容器识别方式，不同站点的标记习惯不同，因此放在配置里
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContainerMatcher {
    /// 标签名完全匹配，如 `figure`
    Tag(String),
    /// class 属性包含子串（不区分大小写）
    ClassContains(String),
    /// 某个 class 名以该前缀开头（不区分大小写），如 `fig` 匹配 `figure`、`fig-wrap`，不匹配 `page-config`
    ClassPrefix(String),
    /// 存在某个属性，如 `data-fig`
    Attribute(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuleConfig {
    pub figure_containers: Vec<ContainerMatcher>,
    /// 按顺序尝试的标题选择器
    pub caption_selectors: Vec<String>,
    pub skip_url_patterns: Vec<String>,
    pub skip_alt_patterns: Vec<String>,
    /// 父元素 class/id 中出现这些词时视为界面元素
    pub interface_indicators: Vec<String>,
    /// 宽或高小于该值的图片视为图标
    pub min_image_size: u32,
}

impl RuleConfig {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from(RULES_PATH);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: RuleConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            figure_containers: vec![
                ContainerMatcher::Tag("figure".to_string()),
                ContainerMatcher::ClassPrefix("fig".to_string()),
                ContainerMatcher::Attribute("data-fig".to_string()),
            ],
            caption_selectors: strings(&[
                "figcaption",
                "caption",
                "div.caption",
                "div.fig-caption",
                "p.caption",
                "span.caption",
                "[class*=\"caption\"]",
            ]),
            skip_url_patterns: strings(&[
                "static/img/",
                "icon-",
                "logo",
                "banner",
                "header",
                "footer",
                "nav-",
                "button",
                "arrow",
                "close",
                "search",
                "menu",
                "flag",
                "dot-gov",
                "usa-icons",
                "ncbi-logos",
            ]),
            skip_alt_patterns: strings(&[
                "logo", "icon", "button", "arrow", "close", "search", "menu", "flag", "banner",
                "header", "footer", "nav",
            ]),
            interface_indicators: strings(&[
                "header", "footer", "nav", "menu", "sidebar", "toolbar", "banner", "logo", "icon",
                "button", "control",
            ]),
            min_image_size: 50,
        }
    }
}
