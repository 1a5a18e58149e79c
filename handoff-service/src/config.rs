use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_UPSTAGE_API_BASE: &str = "https://api.upstage.ai/v1";
pub const DEFAULT_TRANSCRIPTION_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_LOG_FILTER: &str = "handoff_service=debug,handoff_flow=debug,tower_http=debug";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which workflow `/chat` runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStrategy {
    /// Fixed prompt per user turn, conversation ends at exactly four user turns
    TurnGated,
    /// Similarity search plus treatment inference, ends when the model says it has enough
    Retrieval,
}

impl ChatStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatStrategy::TurnGated => "turn_gated",
            ChatStrategy::Retrieval => "retrieval",
        }
    }
}

impl FromStr for ChatStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "turn_gated" | "turn-gated" | "turns" => Ok(ChatStrategy::TurnGated),
            "retrieval" | "rag" => Ok(ChatStrategy::Retrieval),
            other => Err(format!("unknown chat strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Read separately from [`ServiceConfig`] so logging is up before the rest is validated
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, `RUST_LOG` when set
    pub filter: String,
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Ok(Self {
            format: parse_or("LOG_FORMAT", get("LOG_FORMAT"), LogFormat::Json)?,
            filter: get("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

/// Hosted vector index (Pinecone-style REST API)
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub api_key: String,
    pub index_host: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub index: Option<VectorIndexConfig>,
    pub embedding_model: String,
    pub top_k: usize,
    pub score_threshold: f32,
    pub reference_dir: PathBuf,
    pub metadata_key: String,
}

#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub upstage_api_key: String,
    pub upstage_api_base: String,
    pub chat_model: String,
    pub chat_strategy: ChatStrategy,
    pub retrieval: RetrievalConfig,
    /// `None` when no speech-to-text key is configured
    pub transcription: Option<TranscriptionConfig>,
    /// `None` means any origin
    pub cors_allowed_origins: Option<Vec<String>>,
    pub max_upload_bytes: usize,
    pub http_timeout: Duration,
    pub port: u16,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup, so tests never touch the process env
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let upstage_api_key = get("UPSTAGE_API_KEY").ok_or(ConfigError::Missing("UPSTAGE_API_KEY"))?;
        let chat_strategy = parse_or("CHAT_STRATEGY", get("CHAT_STRATEGY"), ChatStrategy::TurnGated)?;

        let index = match (get("PINECONE_API_KEY"), get("PINECONE_INDEX_HOST")) {
            (Some(api_key), Some(host)) => Some(VectorIndexConfig {
                api_key,
                index_host: normalize_host(&host),
                namespace: get("PINECONE_NAMESPACE"),
            }),
            _ => None,
        };
        if chat_strategy == ChatStrategy::Retrieval && index.is_none() {
            return Err(ConfigError::Missing("PINECONE_API_KEY and PINECONE_INDEX_HOST"));
        }

        let top_k: usize = parse_or("RETRIEVAL_TOP_K", get("RETRIEVAL_TOP_K"), 5)?;
        if top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "RETRIEVAL_TOP_K",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let retrieval = RetrievalConfig {
            index,
            embedding_model: or("EMBEDDING_MODEL", "embedding-query"),
            top_k,
            score_threshold: parse_or(
                "RETRIEVAL_SCORE_THRESHOLD",
                get("RETRIEVAL_SCORE_THRESHOLD"),
                0.2,
            )?,
            reference_dir: PathBuf::from(or("REFERENCE_DIR", "data/references")),
            metadata_key: or("REFERENCE_METADATA_KEY", "source"),
        };

        let transcription = get("OPENAI_API_KEY").map(|api_key| TranscriptionConfig {
            api_key,
            api_base: or("TRANSCRIPTION_API_BASE", DEFAULT_TRANSCRIPTION_API_BASE),
            model: or("TRANSCRIPTION_MODEL", "whisper-1"),
            language: or("TRANSCRIPTION_LANGUAGE", "ko"),
        });

        let cors_allowed_origins =
            parse_origins(&or("CORS_ALLOWED_ORIGINS", "http://localhost:5173"));

        Ok(Self {
            upstage_api_key,
            upstage_api_base: or("UPSTAGE_API_BASE", DEFAULT_UPSTAGE_API_BASE),
            chat_model: or("CHAT_MODEL", "solar-mini"),
            chat_strategy,
            retrieval,
            transcription,
            cors_allowed_origins,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), 25 * 1024 * 1024)?,
            http_timeout: Duration::from_secs(parse_or(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                120,
            )?),
            port: parse_or("PORT", get("PORT"), 8000)?,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        },
    }
}

/// Comma-separated origins; a `*` anywhere in the list allows any origin
fn parse_origins(raw: &str) -> Option<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if origins.iter().any(|origin| origin == "*") {
        None
    } else {
        Some(origins)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn chat_api_key_is_required() {
        let err = ServiceConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("UPSTAGE_API_KEY")));

        let err = ServiceConfig::from_lookup(lookup(&[("UPSTAGE_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn defaults_follow_the_turn_gated_setup() {
        let config = ServiceConfig::from_lookup(lookup(&[("UPSTAGE_API_KEY", "key")])).unwrap();

        assert_eq!(config.chat_strategy, ChatStrategy::TurnGated);
        assert_eq!(config.chat_model, "solar-mini");
        assert_eq!(config.upstage_api_base, DEFAULT_UPSTAGE_API_BASE);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.score_threshold - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.metadata_key, "source");
        assert!(config.retrieval.index.is_none());
        assert!(config.transcription.is_none());
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec!["http://localhost:5173".to_string()])
        );
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn retrieval_strategy_needs_an_index() {
        let err = ServiceConfig::from_lookup(lookup(&[
            ("UPSTAGE_API_KEY", "key"),
            ("CHAT_STRATEGY", "retrieval"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));

        let config = ServiceConfig::from_lookup(lookup(&[
            ("UPSTAGE_API_KEY", "key"),
            ("CHAT_STRATEGY", "rag"),
            ("PINECONE_API_KEY", "pc"),
            ("PINECONE_INDEX_HOST", "protocols-abc.svc.pinecone.io/"),
            ("RETRIEVAL_TOP_K", "1"),
        ]))
        .unwrap();
        assert_eq!(config.chat_strategy, ChatStrategy::Retrieval);
        assert_eq!(config.retrieval.top_k, 1);
        let index = config.retrieval.index.unwrap();
        assert_eq!(index.index_host, "https://protocols-abc.svc.pinecone.io");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[
            ("UPSTAGE_API_KEY", "key"),
            ("RETRIEVAL_SCORE_THRESHOLD", "high"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "RETRIEVAL_SCORE_THRESHOLD",
                ..
            }
        ));

        let err = ServiceConfig::from_lookup(lookup(&[
            ("UPSTAGE_API_KEY", "key"),
            ("RETRIEVAL_TOP_K", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn transcription_and_cors_are_optional() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("UPSTAGE_API_KEY", "key"),
            ("OPENAI_API_KEY", "sk"),
            ("CORS_ALLOWED_ORIGINS", "*"),
        ]))
        .unwrap();
        let transcription = config.transcription.unwrap();
        assert_eq!(transcription.model, "whisper-1");
        assert_eq!(transcription.language, "ko");
        assert!(config.cors_allowed_origins.is_none());
    }

    #[test]
    fn logging_defaults_to_json_with_service_filter() {
        let logging = LoggingConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.filter, DEFAULT_LOG_FILTER);

        let logging = LoggingConfig::from_lookup(lookup(&[
            ("LOG_FORMAT", "Pretty"),
            ("RUST_LOG", "handoff_service=info"),
        ]))
        .unwrap();
        assert_eq!(logging.format, LogFormat::Pretty);
        assert_eq!(logging.filter, "handoff_service=info");

        let err = LoggingConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LOG_FORMAT", .. }));
    }

    #[test]
    fn wildcard_inside_an_origin_list_allows_any_origin() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("UPSTAGE_API_KEY", "key"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:5173, *"),
        ]))
        .unwrap();
        assert!(config.cors_allowed_origins.is_none());

        let config = ServiceConfig::from_lookup(lookup(&[
            ("UPSTAGE_API_KEY", "key"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:5173,, https://ems.example.org "),
        ]))
        .unwrap();
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec![
                "http://localhost:5173".to_string(),
                "https://ems.example.org".to_string()
            ])
        );
    }
}
