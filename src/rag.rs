//! Consulta RAG sobre la colección de filas tabulares.
//!
//! Flujo:
//!   1. Búsqueda vectorial de los `top_k` documentos más parecidos a la pregunta.
//!   2. Concatenación de sus textos en un bloque de contexto.
//!   3. Una única llamada al modelo generativo con el prompt fijo.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::{llm::AnswerModel, models::QueryMatch, vector_store::Collection};

/// Separador entre documentos dentro del contexto.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Respuesta que se pide al modelo cuando el contexto no basta. Es sólo una
/// instrucción dentro del prompt; nada en el código la garantiza.
pub const NOT_ENOUGH_DATA: &str = "I don't have enough data for that.";

pub struct RagPipeline {
    collection: Arc<Collection>,
    model: Arc<dyn AnswerModel>,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(collection: Arc<Collection>, model: Arc<dyn AnswerModel>, top_k: usize) -> Self {
        Self {
            collection,
            model,
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<QueryMatch>> {
        self.collection.query(question, k).await
    }

    /// Responde usando el `top_k` configurado.
    pub async fn answer(&self, question: &str) -> Result<String> {
        self.answer_with_k(question, self.top_k).await
    }

    /// Los errores del embedding, de la búsqueda o del modelo se propagan
    /// tal cual: no hay reintentos ni respuesta de respaldo.
    pub async fn answer_with_k(&self, question: &str, k: usize) -> Result<String> {
        let matches = self.retrieve(question, k).await?;
        debug!(
            "Documentos recuperados: {:?}",
            matches.iter().map(|m| (&m.id, m.score)).collect::<Vec<_>>()
        );

        let context = build_context(&matches);
        let prompt = build_prompt(&context, question);

        let response = self.model.generate(&prompt).await?;
        info!("Pregunta respondida con {} documentos de contexto.", matches.len());
        Ok(response.trim().to_string())
    }
}

pub fn build_context(matches: &[QueryMatch]) -> String {
    matches
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a healthcare Assistant AI.\n\
         Use the following information to answer the question accurately.\n\
         If the answer is not found, say \"{NOT_ENOUGH_DATA}\"\n\
         \n\
         Context: {context}\n\
         Question: {question}\n\
         Answer:\n"
    )
}
