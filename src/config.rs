//! Configuration for zapgasto.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ZAPGASTO_HOME, WHATSAPP_*, OPENAI_API_KEY, ...)
//! 2. Config file (.zapgasto/config.yaml)
//! 3. Defaults (~/.zapgasto, public API endpoints)
//!
//! Config file discovery:
//! - Searches current directory and parents for .zapgasto/config.yaml
//! - Credentials default to obvious fakes so the pipeline runs offline with
//!   the heuristic extractor and stub transcriber

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub processor: Option<ProcessorSection>,
    #[serde(default)]
    pub whatsapp: Option<WhatsAppSection>,
    #[serde(default)]
    pub openai: Option<OpenAiSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessorSection {
    pub period_seconds: Option<u64>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WhatsAppSection {
    pub verify_token: Option<String>,
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub graph_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiSection {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// WhatsApp Cloud API settings
#[derive(Debug, Clone)]
pub struct WhatsAppSettings {
    /// Token echoed back during the webhook verification handshake
    pub verify_token: String,
    /// Bearer token for the Graph API
    pub access_token: String,
    /// Business phone number id (path segment of the send endpoint)
    pub phone_number_id: String,
    /// Graph API base URL, version included
    pub graph_base_url: String,
}

/// OpenAI API settings
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl OpenAiSettings {
    /// Whether the configured key is a placeholder. With a fake key the
    /// pipeline runs fully offline: heuristic extraction, stub transcription.
    pub fn is_fake_key(&self) -> bool {
        let k = self.api_key.trim().to_uppercase();
        k.is_empty()
            || k.starts_with("FAKE")
            || k.contains("PLACEHOLDER")
            || k == "TEST"
            || k == "DUMMY"
    }
}

/// Resolved configuration with defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory (message log, expense and user stores)
    pub home: PathBuf,
    /// BCP 47 locale tag for parsing and formatting ("pt-BR")
    pub locale: String,
    /// Webhook server bind address
    pub bind: String,
    /// Fixed delay between processor batches
    pub processor_period: Duration,
    /// Max messages claimed per batch
    pub batch_size: usize,
    /// Timeout applied to every outbound HTTP call
    pub http_timeout: Duration,
    /// WhatsApp Cloud API settings
    pub whatsapp: WhatsAppSettings,
    /// OpenAI settings
    pub openai: OpenAiSettings,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Path of the append-only incoming message log
    pub fn message_log_path(&self) -> PathBuf {
        self.home.join("messages.jsonl")
    }

    /// Path of the expense store
    pub fn expenses_path(&self) -> PathBuf {
        self.home.join("expenses.json")
    }

    /// Path of the user directory
    pub fn users_path(&self) -> PathBuf {
        self.home.join("users.json")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".zapgasto").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn env_or<F>(var: &str, fallback: F) -> String
where
    F: FnOnce() -> String,
{
    std::env::var(var).unwrap_or_else(|_| fallback())
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let config_file = find_config_file();
    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".zapgasto");

    let home = std::env::var("ZAPGASTO_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| file.home.clone().map(PathBuf::from).unwrap_or(default_home));

    let locale = env_or("ZAPGASTO_LOCALE", || {
        file.locale.clone().unwrap_or_else(|| "pt-BR".to_string())
    });

    let server = file.server.clone().unwrap_or_default();
    let bind = env_or("ZAPGASTO_BIND", || {
        server.bind.unwrap_or_else(|| "0.0.0.0:8080".to_string())
    });

    let processor = file.processor.clone().unwrap_or_default();
    let processor_period = Duration::from_secs(processor.period_seconds.unwrap_or(60));
    let batch_size = processor.batch_size.unwrap_or(50);

    let wa = file.whatsapp.clone().unwrap_or_default();
    let whatsapp = WhatsAppSettings {
        verify_token: env_or("WHATSAPP_VERIFY_TOKEN", || {
            wa.verify_token
                .clone()
                .unwrap_or_else(|| "fAkE_vErIfY_tOkEn".to_string())
        }),
        access_token: env_or("WHATSAPP_ACCESS_TOKEN", || {
            wa.access_token
                .clone()
                .unwrap_or_else(|| "FAKE_ACCESS_TOKEN".to_string())
        }),
        phone_number_id: env_or("WHATSAPP_PHONE_NUMBER_ID", || {
            wa.phone_number_id
                .clone()
                .unwrap_or_else(|| "000000000000000".to_string())
        }),
        graph_base_url: env_or("WHATSAPP_GRAPH_BASE_URL", || {
            wa.graph_base_url
                .clone()
                .unwrap_or_else(|| "https://graph.facebook.com/v20.0".to_string())
        }),
    };

    let oa = file.openai.clone().unwrap_or_default();
    let openai = OpenAiSettings {
        api_key: env_or("OPENAI_API_KEY", || {
            oa.api_key.clone().unwrap_or_else(|| "FAKE_KEY".to_string())
        }),
        base_url: env_or("OPENAI_BASE_URL", || {
            oa.base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
        }),
        model: env_or("OPENAI_MODEL", || {
            oa.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string())
        }),
    };

    Ok(ResolvedConfig {
        home,
        locale,
        bind,
        processor_period,
        batch_size,
        http_timeout: Duration::from_secs(30),
        whatsapp,
        openai,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_fake_key_detection() {
        let mk = |key: &str| OpenAiSettings {
            api_key: key.to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        };

        assert!(mk("").is_fake_key());
        assert!(mk("FAKE_KEY").is_fake_key());
        assert!(mk("fake-123").is_fake_key());
        assert!(mk("my-PLACEHOLDER-key").is_fake_key());
        assert!(mk("test").is_fake_key());
        assert!(mk("dummy").is_fake_key());
        assert!(!mk("sk-proj-abc123").is_fake_key());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".zapgasto");
        std::fs::create_dir_all(&dir).unwrap();

        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
locale: pt-BR
server:
  bind: "127.0.0.1:9090"
processor:
  period_seconds: 30
  batch_size: 10
whatsapp:
  verify_token: my-secret
openai:
  model: gpt-4o
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.locale.as_deref(), Some("pt-BR"));
        assert_eq!(
            parsed.server.unwrap().bind.as_deref(),
            Some("127.0.0.1:9090")
        );
        assert_eq!(parsed.processor.as_ref().unwrap().period_seconds, Some(30));
        assert_eq!(
            parsed.whatsapp.unwrap().verify_token.as_deref(),
            Some("my-secret")
        );
        assert_eq!(parsed.openai.unwrap().model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_store_paths_derive_from_home() {
        let cfg = ResolvedConfig {
            home: PathBuf::from("/data/zapgasto"),
            locale: "pt-BR".to_string(),
            bind: "0.0.0.0:8080".to_string(),
            processor_period: Duration::from_secs(60),
            batch_size: 50,
            http_timeout: Duration::from_secs(30),
            whatsapp: WhatsAppSettings {
                verify_token: "t".to_string(),
                access_token: "a".to_string(),
                phone_number_id: "1".to_string(),
                graph_base_url: "https://graph.facebook.com/v20.0".to_string(),
            },
            openai: OpenAiSettings {
                api_key: "FAKE".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
            },
            config_file: None,
        };

        assert_eq!(
            cfg.message_log_path(),
            PathBuf::from("/data/zapgasto/messages.jsonl")
        );
        assert_eq!(
            cfg.expenses_path(),
            PathBuf::from("/data/zapgasto/expenses.json")
        );
        assert_eq!(cfg.users_path(), PathBuf::from("/data/zapgasto/users.json"));
    }
}
