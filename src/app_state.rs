use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::{
    config::AppConfig,
    ingest,
    llm::{AnswerModel, Embedder, LlmManager},
    rag::RagPipeline,
    vector_store::{Collection, VectorStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub collection: Arc<Collection>,
    pub pipeline: Arc<RagPipeline>,
}

/// Arranque completo: configuración, clientes LLM, carga de tablas e índice.
///
/// La configuración se valida primero; si falta la credencial no se lee
/// ningún fichero ni se llama a ningún modelo.
pub async fn initialize<F>(lookup: F) -> Result<AppState>
where
    F: Fn(&str) -> Option<String>,
{
    let config = AppConfig::from_lookup(lookup)?;
    let llm_manager = Arc::new(LlmManager::from_config(&config));
    info!(
        "Proveedor LLM: {} (chat: {}, embeddings: {})",
        config.llm_provider, config.llm_chat_model, config.llm_embedding_model
    );
    AppState::build(config, llm_manager.clone(), llm_manager).await
}

impl AppState {
    pub async fn build(
        config: AppConfig,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn AnswerModel>,
    ) -> Result<Self> {
        let documents = ingest::load_documents(&config.data_dir)?;

        let store = match &config.vector_store_dir {
            Some(dir) => VectorStore::persistent(dir, embedder.clone())?,
            None => VectorStore::in_memory(embedder.clone()),
        };
        let collection = store
            .get_or_create_collection(&config.collection_name)
            .await?;

        let summary =
            ingest::populate_collection(&collection, &documents, embedder.as_ref()).await?;
        info!("{}", summary);

        let pipeline = Arc::new(RagPipeline::new(collection.clone(), model, config.top_k));
        info!("Pipeline RAG listo (top_k = {}).", pipeline.top_k());
        Ok(Self {
            config,
            collection,
            pipeline,
        })
    }
}
