//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GAUSS__*` 覆盖
//! （双下划线表示嵌套，如 `GAUSS__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub solver: SolverSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：gemini / openai / mock；配置期绑定
    pub provider: String,
    pub model: String,
    /// OpenAI 兼容端点覆盖（自建代理等）
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    crate::llm::GEMINI_FLASH.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [solver] 段：轮次预算、单轮超时、复杂度信号
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolverSection {
    /// 轮次预算，至少 1
    pub max_rounds: u32,
    /// 单轮神谕调用超时（秒）
    pub round_timeout_secs: u64,
    /// 复杂度提示阈值（表达式树节点数）
    pub complexity_limit: u32,
    /// true 时复杂度超限按验证失败处理；默认只做提示信号
    pub complexity_gate: bool,
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            round_timeout_secs: 60,
            complexity_limit: 80,
            complexity_gate: false,
        }
    }
}

/// 从 config 目录加载配置，环境变量 GAUSS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GAUSS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GAUSS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.solver.max_rounds, 3);
        assert!(!cfg.solver.complexity_gate);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[llm]\nprovider = \"mock\"\n\n[solver]\nmax_rounds = 5\nround_timeout_secs = 10"
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.solver.max_rounds, 5);
        assert_eq!(cfg.solver.round_timeout_secs, 10);
        // 未覆盖的键保持默认
        assert_eq!(cfg.solver.complexity_limit, 80);
    }
}
