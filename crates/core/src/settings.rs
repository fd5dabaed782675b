//! Runtime settings loaded from the environment (and `.env` via the binary).
//!
//! [`Settings`] is a plain data holder: directory layout, backend selection,
//! credentials, upload limits and matching thresholds. [`Settings::validate`]
//! checks it and sorts every failed rule into exactly one of
//! [`ValidationReport::errors`] or [`ValidationReport::warnings`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_CLOUD_API_BASE_URL: &str = "https://api.canghe.ai";
pub const DEFAULT_CLOUD_IMAGE_MODEL: &str = "nano-banana";
pub const DEFAULT_CLOUD_VIDEO_MODEL: &str = "veo3.1-fast";
pub const DEFAULT_LLM_CLI_COMMAND: &str = "claude";
pub const DEFAULT_LLM_CLOUD_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_COMFYUI_HOST: &str = "127.0.0.1";
pub const DEFAULT_COMFYUI_PORT: u32 = 8188;
pub const DEFAULT_COMFYUI_MODEL: &str = "sd_xl_base_1.0.safetensors";
pub const DEFAULT_MAX_UPLOAD_SIZE_MB: u64 = 50;
pub const DEFAULT_ALLOWED_EXTENSIONS: &str =
    ".pdf,.docx,.doc,.md,.markdown,.html,.htm,.txt,.jpg,.jpeg,.png";
pub const DEFAULT_BATCH_THRESHOLD_SECS: u64 = 300;
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// Subdirectories created under the assets directory.
pub const ASSET_SUBDIRS: &[&str] = &["characters", "scenes", "props", "styles"];

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Which image backend generation requests are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageBackend {
    Cloud,
    ComfyUi,
}

impl ImageBackend {
    /// Parse a backend name. `canghe` is the historical name of the cloud backend.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloud" | "canghe" => Some(Self::Cloud),
            "comfyui" => Some(Self::ComfyUi),
            _ => None,
        }
    }
}

/// Which text provider the story analyzer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    Cli,
    Cloud,
}

impl LlmProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cli" | "claude" => Some(Self::Cli),
            "cloud" | "api" => Some(Self::Cloud),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_dir: PathBuf,
    pub image_backend: ImageBackend,
    pub cloud_api_key: String,
    pub cloud_api_base_url: String,
    pub cloud_image_model: String,
    pub cloud_video_model: String,
    pub llm_provider: LlmProviderKind,
    pub llm_cli_command: String,
    pub llm_cloud_model: String,
    pub llm_timeout_secs: u64,
    pub comfyui_enabled: bool,
    pub comfyui_host: String,
    pub comfyui_port: u32,
    pub comfyui_model: String,
    pub max_upload_size_mb: u64,
    /// Lowercase extensions without the leading dot.
    pub allowed_extensions: Vec<String>,
    pub batch_threshold_secs: u64,
    pub match_threshold: f64,
    pub strict: bool,
    /// CJK-capable TrueType font for PDF export.
    pub pdf_font_path: Option<PathBuf>,
    /// Variables that were present but could not be parsed.
    pub invalid_values: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    /// Load settings from process environment variables with defaults.
    ///
    /// | Env Var                 | Default                      |
    /// |-------------------------|------------------------------|
    /// | `STORYBOARD_BASE_DIR`   | `.`                          |
    /// | `IMAGE_BACKEND`         | `cloud`                      |
    /// | `CLOUD_API_KEY`         | empty (`CANGHE_API_KEY`)     |
    /// | `CLOUD_API_BASE_URL`    | `https://api.canghe.ai`      |
    /// | `CLOUD_IMAGE_MODEL`     | `nano-banana`                |
    /// | `CLOUD_VIDEO_MODEL`     | `veo3.1-fast`                |
    /// | `LLM_PROVIDER`          | `cli`                        |
    /// | `LLM_CLI_COMMAND`       | `claude`                     |
    /// | `LLM_CLOUD_MODEL`       | `gemini-2.0-flash`           |
    /// | `LLM_TIMEOUT_SECS`      | `120`                        |
    /// | `COMFYUI_ENABLED`       | `false`                      |
    /// | `COMFYUI_HOST`          | `127.0.0.1`                  |
    /// | `COMFYUI_PORT`          | `8188`                       |
    /// | `COMFYUI_MODEL`         | `sd_xl_base_1.0.safetensors` |
    /// | `MAX_UPLOAD_SIZE_MB`    | `50`                         |
    /// | `ALLOWED_EXTENSIONS`    | documents + jpg/png          |
    /// | `BATCH_THRESHOLD_SECS`  | `300`                        |
    /// | `MATCH_THRESHOLD`       | `0.5`                        |
    /// | `STRICT_CONFIG`         | `false`                      |
    /// | `PDF_FONT_PATH`         | first system CJK font found  |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut invalid_values = Vec::new();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let mut parse_num = |key: &str, default: u64| -> u64 {
            match get(key) {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    invalid_values.push(format!("{key}={raw}"));
                    default
                }),
                None => default,
            }
        };

        let llm_timeout_secs = parse_num("LLM_TIMEOUT_SECS", DEFAULT_LLM_TIMEOUT_SECS);
        let comfyui_port = parse_num("COMFYUI_PORT", u64::from(DEFAULT_COMFYUI_PORT));
        let max_upload_size_mb = parse_num("MAX_UPLOAD_SIZE_MB", DEFAULT_MAX_UPLOAD_SIZE_MB);
        let batch_threshold_secs = parse_num("BATCH_THRESHOLD_SECS", DEFAULT_BATCH_THRESHOLD_SECS);

        let match_threshold = match get("MATCH_THRESHOLD") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                invalid_values.push(format!("MATCH_THRESHOLD={raw}"));
                DEFAULT_MATCH_THRESHOLD
            }),
            None => DEFAULT_MATCH_THRESHOLD,
        };

        let image_backend = match get("IMAGE_BACKEND") {
            Some(raw) => ImageBackend::parse(&raw).unwrap_or_else(|| {
                invalid_values.push(format!("IMAGE_BACKEND={raw}"));
                ImageBackend::Cloud
            }),
            None => ImageBackend::Cloud,
        };

        let llm_provider = match get("LLM_PROVIDER") {
            Some(raw) => LlmProviderKind::parse(&raw).unwrap_or_else(|| {
                invalid_values.push(format!("LLM_PROVIDER={raw}"));
                LlmProviderKind::Cli
            }),
            None => LlmProviderKind::Cli,
        };

        Self {
            base_dir: PathBuf::from(get_or("STORYBOARD_BASE_DIR", ".")),
            image_backend,
            cloud_api_key: get("CLOUD_API_KEY")
                .or_else(|| get("CANGHE_API_KEY"))
                .unwrap_or_default(),
            cloud_api_base_url: get("CLOUD_API_BASE_URL")
                .or_else(|| get("CANGHE_API_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_CLOUD_API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            cloud_image_model: get_or("CLOUD_IMAGE_MODEL", DEFAULT_CLOUD_IMAGE_MODEL),
            cloud_video_model: get_or("CLOUD_VIDEO_MODEL", DEFAULT_CLOUD_VIDEO_MODEL),
            llm_provider,
            llm_cli_command: get_or("LLM_CLI_COMMAND", DEFAULT_LLM_CLI_COMMAND),
            llm_cloud_model: get_or("LLM_CLOUD_MODEL", DEFAULT_LLM_CLOUD_MODEL),
            llm_timeout_secs,
            comfyui_enabled: get("COMFYUI_ENABLED").is_some_and(|v| parse_bool(&v)),
            comfyui_host: get_or("COMFYUI_HOST", DEFAULT_COMFYUI_HOST),
            comfyui_port: u32::try_from(comfyui_port).unwrap_or(u32::MAX),
            comfyui_model: get_or("COMFYUI_MODEL", DEFAULT_COMFYUI_MODEL),
            max_upload_size_mb,
            allowed_extensions: parse_extensions(&get_or(
                "ALLOWED_EXTENSIONS",
                DEFAULT_ALLOWED_EXTENSIONS,
            )),
            batch_threshold_secs,
            match_threshold,
            strict: get("STRICT_CONFIG").is_some_and(|v| parse_bool(&v)),
            pdf_font_path: get("PDF_FONT_PATH").map(|v| PathBuf::from(v.trim())),
            invalid_values,
        }
    }

    /// Settings rooted at `base_dir` with every other value defaulted.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    // -- Directory layout --

    pub fn assets_dir(&self) -> PathBuf {
        self.base_dir.join("assets")
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.base_dir.join("projects")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.base_dir.join("outputs")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.base_dir.join("exports")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.base_dir.join("uploads")
    }

    /// Create every data directory (and asset subdirectory) if missing.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.projects_dir(),
            self.outputs_dir(),
            self.exports_dir(),
            self.uploads_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        let assets = self.assets_dir();
        for sub in ASSET_SUBDIRS {
            std::fs::create_dir_all(assets.join(sub))?;
        }
        Ok(())
    }

    /// Base URL of the local ComfyUI instance.
    pub fn comfyui_url(&self) -> String {
        format!("http://{}:{}", self.comfyui_host, self.comfyui_port)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }

    /// Whether `path` carries an extension from the upload allowlist.
    pub fn is_allowed_upload(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
    }

    // -- Validation --

    /// Check the settings. Credential and backend-availability rules are
    /// errors when `strict`, warnings otherwise; range rules are always errors.
    pub fn validate(&self, strict: bool) -> ValidationReport {
        let mut report = ValidationReport::default();

        let soft = |msg: String, report: &mut ValidationReport| {
            if strict {
                report.errors.push(msg);
            } else {
                report.warnings.push(msg);
            }
        };

        match self.image_backend {
            ImageBackend::Cloud if self.cloud_api_key.trim().is_empty() => soft(
                "CLOUD_API_KEY is not set; cloud image generation is unavailable".to_string(),
                &mut report,
            ),
            ImageBackend::ComfyUi if !self.comfyui_enabled => soft(
                "IMAGE_BACKEND=comfyui but COMFYUI_ENABLED is false".to_string(),
                &mut report,
            ),
            _ => {}
        }

        if self.llm_provider == LlmProviderKind::Cloud && self.cloud_api_key.trim().is_empty() {
            soft(
                "LLM_PROVIDER=cloud requires CLOUD_API_KEY".to_string(),
                &mut report,
            );
        }

        if !(1..=65535).contains(&self.comfyui_port) {
            report
                .errors
                .push(format!("COMFYUI_PORT must be 1-65535, got {}", self.comfyui_port));
        }
        if self.max_upload_size_mb == 0 {
            report
                .errors
                .push("MAX_UPLOAD_SIZE_MB must be greater than 0".to_string());
        }
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            report.errors.push(format!(
                "MATCH_THRESHOLD must be in (0, 1], got {}",
                self.match_threshold
            ));
        }
        if self.batch_threshold_secs == 0 {
            report
                .errors
                .push("BATCH_THRESHOLD_SECS must be greater than 0".to_string());
        }
        if let Some(font) = &self.pdf_font_path {
            if !font.is_file() {
                report.warnings.push(format!(
                    "PDF_FONT_PATH {} does not exist; PDF export will use a system font",
                    font.display()
                ));
            }
        }
        for raw in &self.invalid_values {
            report.errors.push(format!("Unparseable setting: {raw}"));
        }

        report
    }
}

// ---------------------------------------------------------------------------
// Validation report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into a result carrying the warnings on success.
    pub fn into_result(self) -> Result<Vec<String>, CoreError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(CoreError::Validation(self.errors.join("; ")))
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings_from(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = settings_from(&[]);
        assert_eq!(s.image_backend, ImageBackend::Cloud);
        assert_eq!(s.cloud_api_base_url, DEFAULT_CLOUD_API_BASE_URL);
        assert_eq!(s.comfyui_port, 8188);
        assert_eq!(s.max_upload_size_mb, 50);
        assert_eq!(s.batch_threshold_secs, 300);
        assert!(s.allowed_extensions.contains(&"docx".to_string()));
        assert!(!s.comfyui_enabled);
    }

    #[test]
    fn legacy_key_names_are_accepted() {
        let s = settings_from(&[("CANGHE_API_KEY", "sk-1"), ("IMAGE_BACKEND", "canghe")]);
        assert_eq!(s.cloud_api_key, "sk-1");
        assert_eq!(s.image_backend, ImageBackend::Cloud);
    }

    #[test]
    fn missing_key_is_warning_when_not_strict() {
        let report = settings_from(&[]).validate(false);
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn missing_key_is_error_when_strict() {
        let report = settings_from(&[]).validate(true);
        assert_eq!(report.errors.len(), 1);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn comfyui_backend_without_enable_flag_is_soft_rule() {
        let s = settings_from(&[("IMAGE_BACKEND", "comfyui")]);
        assert_eq!(s.validate(false).warnings.len(), 1);
        assert_eq!(s.validate(true).errors.len(), 1);
    }

    #[test]
    fn port_out_of_range_is_always_error() {
        let s = settings_from(&[("CLOUD_API_KEY", "k"), ("COMFYUI_PORT", "70000")]);
        let report = s.validate(false);
        assert_eq!(report.errors.len(), 1);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_pdf_font_is_a_warning() {
        let s = settings_from(&[("CLOUD_API_KEY", "k"), ("PDF_FONT_PATH", "/nonexistent/font.ttf")]);
        assert_eq!(s.pdf_font_path, Some(PathBuf::from("/nonexistent/font.ttf")));
        let report = s.validate(true);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn zero_upload_size_is_error() {
        let s = settings_from(&[("CLOUD_API_KEY", "k"), ("MAX_UPLOAD_SIZE_MB", "0")]);
        assert!(s.validate(false).into_result().is_err());
    }

    #[test]
    fn unparseable_number_is_reported() {
        let s = settings_from(&[("CLOUD_API_KEY", "k"), ("LLM_TIMEOUT_SECS", "soon")]);
        assert_eq!(s.llm_timeout_secs, DEFAULT_LLM_TIMEOUT_SECS);
        assert!(!s.validate(false).is_ok());
    }

    #[test]
    fn upload_allowlist_is_case_insensitive() {
        let s = settings_from(&[]);
        assert!(s.is_allowed_upload(Path::new("Story.PDF")));
        assert!(!s.is_allowed_upload(Path::new("payload.exe")));
        assert!(!s.is_allowed_upload(Path::new("no_extension")));
    }

    #[test]
    fn ensure_directories_creates_layout() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let s = Settings::with_base_dir(dir.path());
        s.ensure_directories().expect("create dirs");
        assert!(s.projects_dir().is_dir());
        assert!(s.assets_dir().join("props").is_dir());
    }
}
