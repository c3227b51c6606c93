//! Run configuration loaded from `igcse-assess.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analyzer::AnalyzerConfig;
use crate::assembler::{AssemblerConfig, ShortfallPolicy};
use crate::error::AssessError;
use crate::roster::RosterSources;

/// File name searched for in the current directory.
pub const CONFIG_FILE_NAME: &str = "igcse-assess.toml";

/// Environment variable that overrides `assembly.seed`.
pub const SEED_ENV_VAR: &str = "IGCSE_ASSESS_SEED";

/// Top-level igcse-assess configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessConfig {
    /// Max students analyzed concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub analysis: AnalyzerConfig,
    #[serde(default)]
    pub assembly: AssemblySettings,
    #[serde(default)]
    pub data: DataConfig,
}

/// Practice paper settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblySettings {
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
    #[serde(default = "default_questions_per_topic")]
    pub questions_per_topic: usize,
    #[serde(default)]
    pub shortfall_policy: ShortfallPolicy,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Input file locations. An empty `assignments` or `participation` path
/// means the stream is not supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_syllabus")]
    pub syllabus: PathBuf,
    #[serde(default = "default_question_tags")]
    pub question_tags: PathBuf,
    /// A TOML file or a directory of them.
    #[serde(default = "default_question_bank")]
    pub question_bank: PathBuf,
    #[serde(default = "default_mcq_results")]
    pub mcq_results: PathBuf,
    #[serde(default = "default_assignments")]
    pub assignments: Option<PathBuf>,
    #[serde(default = "default_participation")]
    pub participation: Option<PathBuf>,
    #[serde(default = "default_usage_history")]
    pub usage_history: PathBuf,
    #[serde(default = "default_assignment_max_mark")]
    pub assignment_max_mark: f64,
    #[serde(default = "default_participation_max_mark")]
    pub participation_max_mark: f64,
}

fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_max_questions() -> usize {
    10
}
fn default_questions_per_topic() -> usize {
    1
}
fn default_syllabus() -> PathBuf {
    PathBuf::from("data/syllabus_topics.json")
}
fn default_question_tags() -> PathBuf {
    PathBuf::from("data/question_tags.csv")
}
fn default_question_bank() -> PathBuf {
    PathBuf::from("data/question_bank.toml")
}
fn default_mcq_results() -> PathBuf {
    PathBuf::from("data/sample_mcq_results.csv")
}
fn default_assignments() -> Option<PathBuf> {
    Some(PathBuf::from("data/sample_assignments.csv"))
}
fn default_participation() -> Option<PathBuf> {
    Some(PathBuf::from("data/sample_participation.csv"))
}
fn default_usage_history() -> PathBuf {
    PathBuf::from("output/usage_history.json")
}
fn default_assignment_max_mark() -> f64 {
    100.0
}
fn default_participation_max_mark() -> f64 {
    10.0
}

impl Default for AssessConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
            analysis: AnalyzerConfig::default(),
            assembly: AssemblySettings::default(),
            data: DataConfig::default(),
        }
    }
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            max_questions: default_max_questions(),
            questions_per_topic: default_questions_per_topic(),
            shortfall_policy: ShortfallPolicy::default(),
            seed: None,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            syllabus: default_syllabus(),
            question_tags: default_question_tags(),
            question_bank: default_question_bank(),
            mcq_results: default_mcq_results(),
            assignments: default_assignments(),
            participation: default_participation(),
            usage_history: default_usage_history(),
            assignment_max_mark: default_assignment_max_mark(),
            participation_max_mark: default_participation_max_mark(),
        }
    }
}

impl AssessConfig {
    /// Check every numeric setting. Called before any data is analyzed.
    pub fn validate(&self) -> Result<(), AssessError> {
        self.analysis.validate()?;
        if self.parallelism == 0 {
            return Err(AssessError::InvalidConfig(
                "parallelism must be at least 1".into(),
            ));
        }
        if self.assembly.max_questions == 0 {
            return Err(AssessError::InvalidConfig(
                "max_questions must be at least 1".into(),
            ));
        }
        if self.assembly.questions_per_topic == 0 {
            return Err(AssessError::InvalidConfig(
                "questions_per_topic must be at least 1".into(),
            ));
        }
        for (name, mark) in [
            ("assignment_max_mark", self.data.assignment_max_mark),
            ("participation_max_mark", self.data.participation_max_mark),
        ] {
            if !mark.is_finite() || mark <= 0.0 {
                return Err(AssessError::InvalidConfig(format!(
                    "{name} must be a positive number, got {mark}"
                )));
            }
        }
        Ok(())
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        self.analysis
    }

    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            questions_per_topic: self.assembly.questions_per_topic,
            seed: self.assembly.seed,
        }
    }

    pub fn roster_sources(&self) -> RosterSources {
        RosterSources {
            mcq_results: self.data.mcq_results.clone(),
            assignments: self.data.assignments.clone(),
            participation: self.data.participation.clone(),
            assignment_max_mark: self.data.assignment_max_mark,
            participation_max_mark: self.data.participation_max_mark,
        }
    }

    /// Expand `${VAR}` references and anchor relative paths at `base`.
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &Path| -> PathBuf {
            let expanded = PathBuf::from(resolve_env_vars(&p.to_string_lossy()));
            if expanded.is_relative() {
                base.join(expanded)
            } else {
                expanded
            }
        };
        let resolve_optional = |p: &Option<PathBuf>| -> Option<PathBuf> {
            p.as_deref()
                .filter(|p| !p.as_os_str().is_empty())
                .map(resolve)
        };

        self.output_dir = resolve(&self.output_dir);
        let data = &mut self.data;
        data.syllabus = resolve(&data.syllabus);
        data.question_tags = resolve(&data.question_tags);
        data.question_bank = resolve(&data.question_bank);
        data.mcq_results = resolve(&data.mcq_results);
        data.assignments = resolve_optional(&data.assignments);
        data.participation = resolve_optional(&data.participation);
        data.usage_history = resolve(&data.usage_history);
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
/// Unset variables expand to nothing.
pub fn resolve_env_vars(s: &str) -> String {
    expand_vars(s, |name| std::env::var(name).ok())
}

/// Single left-to-right pass: substituted values are never rescanned.
fn expand_vars<F>(s: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        result.push_str(&lookup(&rest[start + 2..start + 2 + len]).unwrap_or_default());
        rest = &rest[start + 3 + len..];
    }
    result.push_str(rest);
    result
}

/// Apply environment overrides using `lookup` to read variables.
fn apply_env_overrides<F>(config: &mut AssessConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(SEED_ENV_VAR) {
        let seed = raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{SEED_ENV_VAR} must be an unsigned integer, got '{raw}'"))?;
        config.assembly.seed = Some(seed);
    }
    Ok(())
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `igcse-assess.toml` in the current directory
/// 2. `~/.config/igcse-assess/config.toml`
///
/// Falls back to built-in defaults when neither exists.
pub fn load_config() -> Result<AssessConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AssessConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let (mut config, base) = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<AssessConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (config, base)
        }
        None => {
            tracing::debug!("no config file found, using defaults");
            (AssessConfig::default(), PathBuf::from("."))
        }
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.resolve_paths(&base);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("igcse-assess"))
}
