//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! Gemini es el proveedor por defecto; OpenAI queda como alternativa.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::client::{CompletionClient as _, EmbeddingsClient as _, ProviderClient as _};
use rig::completion::Prompt as _;
use rig::embeddings::EmbeddingModel as _;
use tracing::debug;

use crate::config::{AppConfig, LlmProvider};

/// Convierte textos en vectores de dimensión fija.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeddings en bloque; devuelve un vector por texto, en el mismo orden.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        self.embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No se pudo generar embedding de la query"))
    }
}

/// Modelo generativo: un prompt de entrada, un texto de salida.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
    pub embed_batch_size: usize,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    ///
    /// La credencial ya ha sido validada por `AppConfig`, así que los
    /// clientes de Rig pueden leerla del entorno sin fallar.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider,
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            embed_batch_size: cfg.embed_batch_size.max(1),
        }
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        let embeddings = match self.provider {
            LlmProvider::Gemini => {
                use rig::providers::gemini;
                let client = gemini::Client::from_env();
                let model = client.embedding_model(&self.embedding_model);
                model.embed_texts(texts).await?
            }
            LlmProvider::OpenAI => {
                use rig::providers::openai;
                let client = openai::Client::from_env();
                let model = client.embedding_model(&self.embedding_model);
                model.embed_texts(texts).await?
            }
        };
        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    async fn complete(&self, prompt: &str) -> Result<String> {
        let answer = match self.provider {
            LlmProvider::Gemini => {
                use rig::providers::gemini;
                let client = gemini::Client::from_env();
                let agent = client.agent(&self.chat_model).build();
                agent.prompt(prompt).await?
            }
            LlmProvider::OpenAI => {
                use rig::providers::openai;
                let client = openai::Client::from_env();
                let agent = client.agent(&self.chat_model).build();
                agent.prompt(prompt).await?
            }
        };
        Ok(answer)
    }
}

#[async_trait]
impl Embedder for LlmManager {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch_size) {
            debug!(
                "Solicitando {} embeddings a {} ({})",
                batch.len(),
                self.provider,
                self.embedding_model
            );
            vectors.extend(self.embed_batch(batch.to_vec()).await?);
        }

        if vectors.len() != texts.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                vectors.len(),
                texts.len()
            ));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl AnswerModel for LlmManager {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Enviando prompt de {} caracteres a {}", prompt.len(), self.chat_model);
        self.complete(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::KeywordEmbedder;

    #[test]
    fn manager_takes_models_from_config() {
        let cfg = AppConfig::from_lookup(|key| match key {
            "GEMINI_API_KEY" => Some("secret".to_string()),
            "EMBED_BATCH_SIZE" => Some("16".to_string()),
            _ => None,
        })
        .unwrap();

        let manager = LlmManager::from_config(&cfg);
        assert_eq!(manager.provider, LlmProvider::Gemini);
        assert_eq!(manager.chat_model, "gemini-2.5-flash");
        assert_eq!(manager.embedding_model, "text-embedding-004");
        assert_eq!(manager.embed_batch_size, 16);
    }

    #[tokio::test]
    async fn default_embed_uses_the_batch_path() {
        let embedder = KeywordEmbedder::new(&["clinic", "district"]);
        let vector = embedder.embed("Clinic in a district").await.unwrap();

        assert_eq!(vector, vec![1.0, 1.0]);
        assert_eq!(embedder.embedded_texts(), 1);
    }
}
