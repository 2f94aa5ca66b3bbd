//! Carga y gestión de configuración de la aplicación (datos, vector store y LLM).

use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;

/// Errores de configuración. Todos son fatales en el arranque.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Falta {var} en el entorno. Revisa tu fichero .env.")]
    MissingCredential { var: &'static str },
    #[error("Proveedor LLM no soportado: {0}")]
    UnsupportedProvider(String),
    #[error("Valor inválido para {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAI,
}

impl LlmProvider {
    /// Variable de entorno que contiene la credencial del proveedor.
    /// Es también la que leen los clientes de `rig` con `from_env()`.
    pub fn credential_var(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }

    pub fn default_chat_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash",
            Self::OpenAI => "gpt-4o-mini",
        }
    }

    pub fn default_embedding_model(self) -> &'static str {
        match self {
            Self::Gemini => "text-embedding-004",
            Self::OpenAI => "text-embedding-3-small",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => f.write_str("gemini"),
            Self::OpenAI => f.write_str("openai"),
        }
    }
}

pub const DEFAULT_COLLECTION_NAME: &str = "healthcare_documentations4";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub frontend_dir: PathBuf,
    pub open_browser: bool,

    pub data_dir: PathBuf,
    pub collection_name: String,
    pub vector_store_dir: Option<PathBuf>,
    pub top_k: usize,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub embed_batch_size: usize,
}

impl AppConfig {
    /// Carga la configuración a partir de una función de búsqueda de
    /// variables; en producción, `std::env::var` tras cargar el `.env`.
    ///
    /// La credencial se valida antes que cualquier otro valor: sin ella no
    /// se lee ningún fichero ni se construye ningún cliente.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm_provider = match var("LLM_PROVIDER") {
            Some(raw) => raw.parse::<LlmProvider>()?,
            None => LlmProvider::Gemini,
        };

        let credential_var = llm_provider.credential_var();
        if var(credential_var).is_none() {
            return Err(ConfigError::MissingCredential { var: credential_var });
        }

        let llm_chat_model = var("LLM_CHAT_MODEL")
            .unwrap_or_else(|| llm_provider.default_chat_model().to_string());
        let llm_embedding_model = var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|| llm_provider.default_embedding_model().to_string());
        let embed_batch_size =
            parse_positive("EMBED_BATCH_SIZE", var("EMBED_BATCH_SIZE"), DEFAULT_EMBED_BATCH_SIZE)?;

        let top_k = parse_positive("TOP_K", var("TOP_K"), DEFAULT_TOP_K)?;

        let open_browser = match var("OPEN_BROWSER") {
            None => true,
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "OPEN_BROWSER",
                        value: raw,
                    })
                }
            },
        };

        Ok(Self {
            server_addr: var("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:8501".to_string()),
            frontend_dir: var("FRONTEND_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("frontend")),
            open_browser,
            data_dir: var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            collection_name: var("COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION_NAME.to_string()),
            vector_store_dir: var("VECTOR_STORE_DIR").map(PathBuf::from),
            top_k,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            embed_batch_size,
        })
    }
}

fn parse_positive(
    var: &'static str,
    raw: Option<String>,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidValue { var, value: raw }),
    }
}
