//! Dobles de prueba deterministas para el embedder y el modelo generativo.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::llm::{AnswerModel, Embedder};

/// Embedder de bolsa de palabras sobre un vocabulario fijo.
///
/// Cada dimensión cuenta las apariciones de una palabra del vocabulario
/// (sin distinguir mayúsculas); las palabras desconocidas se ignoran.
pub struct KeywordEmbedder {
    vocabulary: Vec<String>,
    embedded: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect(),
            embedded: AtomicUsize::new(0),
        }
    }

    /// Número total de textos embebidos hasta ahora.
    pub fn embedded_texts(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.vocabulary.len()];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
        {
            if let Some(pos) = self.vocabulary.iter().position(|w| *w == token) {
                vector[pos] += 1.0;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

/// Modelo que registra cada prompt recibido y responde con un texto fijo.
#[derive(Clone)]
pub struct RecordingModel {
    reply: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl RecordingModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl AnswerModel for RecordingModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Modelo que siempre falla, como un proveedor remoto caído.
pub struct FailingModel;

#[async_trait]
impl AnswerModel for FailingModel {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("503 Service Unavailable"))
    }
}

/// Vocabulario suficiente para los escenarios de clínicas usados en los tests.
pub const CLINIC_VOCABULARY: &[&str] = &[
    "clinic", "district", "x", "y", "a", "b", "pune", "nagpur", "beds", "doctors",
];
