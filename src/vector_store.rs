//! Vector store en proceso con colecciones con nombre, sobre el
//! `InMemoryVectorStore` de rig.
//!
//! API pública:
//!   - `VectorStore::in_memory` / `VectorStore::persistent`
//!   - `VectorStore::get_or_create_collection(&str)`
//!   - `Collection::{count, add, query, query_embedding}`
//!
//! Sin directorio configurado las colecciones viven sólo en memoria. Con
//! directorio, cada colección se guarda como `<dir>/<name>.json` y se vuelve
//! a cargar en el siguiente arranque.
//!
//! El almacenamiento y la métrica coseno son los de rig. La ordenación es
//! propia: `InMemoryVectorIndex::top_n` exige un `EmbeddingModel` de rig,
//! no acepta un vector ya calculado y devuelve los resultados sin orden
//! estable, así que los empates se deshacen aquí por orden de inserción.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use rig::{
    embeddings::{distance::VectorDistance, Embedding},
    vector_store::in_memory_store::InMemoryVectorStore,
    OneOrMany,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{llm::Embedder, models::QueryMatch};

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("Nombre de colección no válido: '{0}'")]
    InvalidName(String),
    #[error("Longitudes distintas: {ids} ids, {texts} textos, {embeddings} embeddings")]
    LengthMismatch {
        ids: usize,
        texts: usize,
        embeddings: usize,
    },
    #[error("Id vacío en la posición {0}")]
    EmptyId(usize),
    #[error("Id duplicado en el lote: {0}")]
    DuplicateId(String),
    #[error("La colección '{collection}' tiene dimensión {expected}, recibido {found}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        found: usize,
    },
}

/// Documento guardado en el store de rig: el texto y su orden de inserción.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
struct StoredRow {
    position: usize,
    text: String,
}

type RowStore = InMemoryVectorStore<StoredRow>;

/// Forma en disco de una colección, en orden de inserción.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedCollection {
    records: Vec<Record>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    id: String,
    text: String,
    embedding: Vec<f64>,
}

/// Conjunto con nombre de tripletas (id, texto, embedding).
pub struct Collection {
    name: String,
    rows: RwLock<RowStore>,
    embedder: Arc<dyn Embedder>,
    file: Option<PathBuf>,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Dimensión de los embeddings; `None` mientras la colección esté vacía.
    pub async fn dimension(&self) -> Option<usize> {
        store_dimension(&*self.rows.read().await)
    }

    /// Añade registros a la colección y devuelve cuántos se insertaron.
    ///
    /// Los ids que ya existen se omiten con un aviso. Un lote con ids
    /// repetidos, ids vacíos o dimensiones incoherentes se rechaza entero.
    /// Con fichero, la colección en memoria sólo cambia si el guardado va bien.
    pub async fn add(
        &self,
        ids: Vec<String>,
        texts: Vec<String>,
        embeddings: Vec<Vec<f64>>,
    ) -> Result<usize> {
        if ids.len() != texts.len() || ids.len() != embeddings.len() {
            return Err(StoreError::LengthMismatch {
                ids: ids.len(),
                texts: texts.len(),
                embeddings: embeddings.len(),
            }
            .into());
        }

        validate_ids(&ids)?;

        let mut rows = self.rows.write().await;

        let expected = store_dimension(&rows).or_else(|| embeddings.first().map(Vec::len));
        if let Some(expected) = expected {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
                return Err(StoreError::DimensionMismatch {
                    collection: self.name.clone(),
                    expected,
                    found: bad.len(),
                }
                .into());
            }
        }

        let existing: HashSet<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        let mut fresh = Vec::new();
        for ((id, text), embedding) in ids.into_iter().zip(texts).zip(embeddings) {
            if existing.contains(id.as_str()) {
                warn!("Id '{}' ya existe en '{}', se omite.", id, self.name);
                continue;
            }
            let row = StoredRow {
                position: rows.len() + fresh.len(),
                text: text.clone(),
            };
            let embedding = Embedding {
                document: text,
                vec: embedding,
            };
            fresh.push((id, row, OneOrMany::one(embedding)));
        }
        if fresh.is_empty() {
            return Ok(0);
        }

        let inserted = fresh.len();
        let mut next = rows.clone();
        next.add_documents_with_ids(fresh);
        if let Some(file) = &self.file {
            save_collection(file, &next).await?;
        }
        *rows = next;

        Ok(inserted)
    }

    /// Búsqueda por texto: embebe la consulta y delega en `query_embedding`.
    pub async fn query(&self, query_text: &str, k: usize) -> Result<Vec<QueryMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed(query_text).await?;
        self.query_embedding(&query_vec, k).await
    }

    /// Devuelve como mucho `k` registros ordenados por similitud coseno
    /// descendente; a igual similitud, primero el que se insertó antes.
    pub async fn query_embedding(&self, query_vec: &[f64], k: usize) -> Result<Vec<QueryMatch>> {
        let rows = self.rows.read().await;
        let Some(dimension) = store_dimension(&rows) else {
            return Ok(Vec::new());
        };
        if query_vec.len() != dimension {
            return Err(StoreError::DimensionMismatch {
                collection: self.name.clone(),
                expected: dimension,
                found: query_vec.len(),
            }
            .into());
        }

        let query = Embedding {
            document: String::new(),
            vec: query_vec.to_vec(),
        };
        let mut ranked: Vec<(usize, QueryMatch)> = rows
            .iter()
            .map(|(id, (row, embeddings))| {
                let score = embeddings
                    .iter()
                    .map(|embedding| similarity(embedding, &query))
                    .fold(f64::NEG_INFINITY, f64::max);
                let found = QueryMatch {
                    id: id.clone(),
                    text: row.text.clone(),
                    score,
                };
                (row.position, found)
            })
            .collect();
        ranked.sort_by(|(pos_a, a), (pos_b, b)| b.score.total_cmp(&a.score).then(pos_a.cmp(pos_b)));
        ranked.truncate(k);
        Ok(ranked.into_iter().map(|(_, found)| found).collect())
    }
}

/// Cliente del vector store: gestiona las colecciones por nombre.
pub struct VectorStore {
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    embedder: Arc<dyn Embedder>,
    dir: Option<PathBuf>,
}

impl VectorStore {
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            embedder,
            dir: None,
        }
    }

    pub fn persistent(dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("No se pudo crear el directorio {}", dir.display()))?;
        Ok(Self {
            collections: RwLock::new(HashMap::new()),
            embedder,
            dir: Some(dir),
        })
    }

    pub async fn get_or_create_collection(&self, name: &str) -> Result<Arc<Collection>> {
        if !is_valid_collection_name(name) {
            return Err(StoreError::InvalidName(name.to_string()).into());
        }

        let mut collections = self.collections.write().await;
        if let Some(collection) = collections.get(name) {
            return Ok(collection.clone());
        }

        let file = self.dir.as_ref().map(|dir| dir.join(format!("{name}.json")));
        let rows = match &file {
            Some(path) if path.exists() => {
                let rows = load_collection(path).await?;
                info!(
                    "Colección '{}' cargada desde {} ({} documentos).",
                    name,
                    path.display(),
                    rows.len()
                );
                rows
            }
            _ => {
                info!("Colección '{}' creada.", name);
                RowStore::default()
            }
        };

        let collection = Arc::new(Collection {
            name: name.to_string(),
            rows: RwLock::new(rows),
            embedder: self.embedder.clone(),
            file,
        });
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }
}

fn validate_ids(ids: &[String]) -> Result<(), StoreError> {
    let mut seen = HashSet::with_capacity(ids.len());
    for (pos, id) in ids.iter().enumerate() {
        if id.is_empty() {
            return Err(StoreError::EmptyId(pos));
        }
        if !seen.insert(id.as_str()) {
            return Err(StoreError::DuplicateId(id.clone()));
        }
    }
    Ok(())
}

fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn store_dimension(rows: &RowStore) -> Option<usize> {
    rows.iter()
        .next()
        .and_then(|(_, (_, embeddings))| embeddings.iter().next().map(|e| e.vec.len()))
}

/// Similitud coseno de rig; con un vector nulo rig da NaN, que aquí cuenta como 0.0.
fn similarity(a: &Embedding, b: &Embedding) -> f64 {
    let score = a.cosine_similarity(b, false);
    if score.is_nan() {
        0.0
    } else {
        score
    }
}

async fn load_collection(path: &Path) -> Result<RowStore> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("No se pudo leer {}", path.display()))?;
    let persisted: PersistedCollection = serde_json::from_str(&raw)
        .with_context(|| format!("Colección corrupta en {}", path.display()))?;

    let documents = persisted
        .records
        .into_iter()
        .enumerate()
        .map(|(position, record)| {
            let row = StoredRow {
                position,
                text: record.text.clone(),
            };
            let embedding = Embedding {
                document: record.text,
                vec: record.embedding,
            };
            (record.id, row, OneOrMany::one(embedding))
        });
    Ok(RowStore::from_documents_with_ids(documents))
}

/// Escribe en un fichero temporal y lo renombra para no dejar una colección a medias.
async fn save_collection(path: &Path, rows: &RowStore) -> Result<()> {
    let mut ordered: Vec<_> = rows.iter().collect();
    ordered.sort_by_key(|(_, (row, _))| row.position);
    let persisted = PersistedCollection {
        records: ordered
            .into_iter()
            .map(|(id, (row, embeddings))| Record {
                id: id.clone(),
                text: row.text.clone(),
                embedding: embeddings.first().vec,
            })
            .collect(),
    };

    let tmp = path.with_extension("json.tmp");
    let raw = serde_json::to_vec(&persisted)?;
    tokio::fs::write(&tmp, raw)
        .await
        .with_context(|| format!("No se pudo escribir {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("No se pudo renombrar {}", tmp.display()))?;
    Ok(())
}
