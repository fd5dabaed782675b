use storyboard_core::settings::ValidationReport;

/// HTTP server configuration loaded from environment variables.
///
/// Domain settings (data directories, providers, thresholds) live in
/// [`storyboard_core::settings::Settings`]; this only covers the listener.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins from comma-separated `CORS_ORIGINS`. A single
    /// `*` allows any origin without credentials.
    pub cors_origins: Vec<String>,
    /// Whole-request timeout in seconds (default: `600`). Generation is
    /// awaited inside the request, so this stays generous.
    pub request_timeout_secs: u64,
    /// Grace period for in-flight requests on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// `KEY=value` pairs that failed to parse and fell back to defaults.
    pub invalid_values: Vec<String>,
}

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default   |
    /// |-------------------------|-----------|
    /// | `HOST`                  | `0.0.0.0` |
    /// | `PORT`                  | `8000`    |
    /// | `CORS_ORIGINS`          | `*`       |
    /// | `REQUEST_TIMEOUT_SECS`  | `600`     |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`      |
    ///
    /// Unparseable values fall back to their default and are reported by
    /// [`ServerConfig::validate`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut invalid_values = Vec::new();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut parse = |key: &str, default: u64| -> u64 {
            match get(key) {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    invalid_values.push(format!("{key}={raw}"));
                    default
                }),
                None => default,
            }
        };

        let port = parse("PORT", u64::from(DEFAULT_PORT));
        let request_timeout_secs = parse("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS);
        let shutdown_timeout_secs = parse("SHUTDOWN_TIMEOUT_SECS", DEFAULT_SHUTDOWN_TIMEOUT_SECS);
        let port = u16::try_from(port).unwrap_or_else(|_| {
            invalid_values.push(format!("PORT={port}"));
            DEFAULT_PORT
        });

        let cors_origins: Vec<String> = get("CORS_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            invalid_values,
        }
    }

    /// Range and parse checks. Every finding here is an error.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        if self.port == 0 {
            report.errors.push("PORT must be 1-65535, got 0".to_string());
        }
        if self.request_timeout_secs == 0 {
            report
                .errors
                .push("REQUEST_TIMEOUT_SECS must be greater than 0".to_string());
        }
        for raw in &self.invalid_values {
            report.errors.push(format!("Unparseable setting: {raw}"));
        }
        report
    }

    /// Whether CORS is open to every origin.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}
