//! Ingesta de un directorio de tablas CSV en el vector store: cada fila se
//! convierte en un `Document` etiquetado con su fichero de origen.

use std::{collections::HashMap, fmt, path::Path};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{llm::Embedder, models::Document, vector_store::Collection};

/// Extensión de los ficheros tabulares que se ingieren.
pub const TABULAR_EXTENSION: &str = ".csv";

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub documents_loaded: usize,
    pub documents_added: usize,
    pub existing_count: usize,
}

impl IngestionSummary {
    /// La colección ya tenía datos y no se tocó.
    pub fn reused_existing(&self) -> bool {
        self.existing_count > 0
    }
}

/// Implementa cómo se mostrará el resumen como texto.
impl fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reused_existing() {
            write!(
                f,
                "Resumen: {} filas leídas; la colección ya tenía {} documentos \
                 y no se ha modificado.",
                self.documents_loaded, self.existing_count
            )
        } else {
            write!(
                f,
                "Resumen: {} filas leídas, {} documentos indexados.",
                self.documents_loaded, self.documents_added
            )
        }
    }
}

/// Lee todos los CSV de `dir` (sin recursión, por orden de nombre) y
/// devuelve un `Document` por fila. Cualquier fichero ilegible o mal
/// formado aborta la carga completa.
pub fn load_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", dir.display()));
    }

    let mut documents = Vec::new();
    let mut tables = 0;

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("No se pudo recorrer el directorio {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !file_name.ends_with(TABULAR_EXTENSION) {
            continue;
        }

        let rows = load_table(entry.path(), &file_name)?;
        info!("Cargado {} con {} filas.", file_name, rows.len());
        documents.extend(rows);
        tables += 1;
    }

    if tables == 0 {
        warn!("No se encontraron ficheros {} en {}", TABULAR_EXTENSION, dir.display());
    }

    Ok(documents)
}

fn load_table(path: &Path, file_name: &str) -> Result<Vec<Document>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Cabecera ilegible en {}", path.display()))?;
    let columns = dedupe_columns(headers);

    let mut documents = Vec::new();
    for (row_index, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("Fila {} mal formada en {}", row_index, path.display()))?;
        // Las filas cortas se completan con celdas vacías; las largas no tienen cabecera.
        if record.len() > columns.len() {
            return Err(anyhow!(
                "Fila {} mal formada en {}: {} campos para {} columnas",
                row_index,
                path.display(),
                record.len(),
                columns.len()
            ));
        }
        documents.push(Document {
            file_name: file_name.to_string(),
            row_index,
            text: render_row(file_name, &columns, &record),
        });
    }
    Ok(documents)
}

/// Renombra las cabeceras repetidas como `Name`, `Name.1`, `Name.2`... Si el
/// nombre con sufijo ya está ocupado se le añade otro (`Name.1.1`).
fn dedupe_columns(headers: &csv::StringRecord) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::with_capacity(headers.len());
    for header in headers {
        let mut column = header.to_string();
        let mut count = counts.get(&column).copied().unwrap_or(0);
        while count > 0 {
            counts.insert(column.clone(), count + 1);
            column = format!("{column}.{count}");
            count = counts.get(&column).copied().unwrap_or(0);
        }
        counts.insert(column.clone(), 1);
        columns.push(column);
    }
    columns
}

/// Serializa una fila como `"File: <name>\n<col>: <value>..."`, respetando
/// el orden de columnas de la tabla. Las columnas sin valor quedan vacías.
pub fn render_row(file_name: &str, columns: &[String], record: &csv::StringRecord) -> String {
    let mut text = format!("File: {file_name}");
    for (index, column) in columns.iter().enumerate() {
        text.push('\n');
        text.push_str(column);
        text.push_str(": ");
        text.push_str(record.get(index).unwrap_or_default());
    }
    text
}

/// Añade los documentos a la colección sólo si está vacía.
///
/// El criterio es el número de documentos, no su contenido: si la colección
/// ya tiene datos no se embebe nada aunque las tablas hayan cambiado.
pub async fn populate_collection(
    collection: &Collection,
    documents: &[Document],
    embedder: &dyn Embedder,
) -> Result<IngestionSummary> {
    let mut summary = IngestionSummary {
        documents_loaded: documents.len(),
        ..Default::default()
    };

    let existing = collection.count().await;
    if existing > 0 {
        summary.existing_count = existing;
        if existing != documents.len() {
            warn!(
                "La colección '{}' tiene {} documentos pero se han leído {} filas; \
                 se usan los datos existentes.",
                collection.name(),
                existing,
                documents.len()
            );
        }
        return Ok(summary);
    }

    if documents.is_empty() {
        return Ok(summary);
    }

    let ids: Vec<String> = documents.iter().map(Document::id).collect();
    let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();

    info!("Generando {} embeddings...", texts.len());
    let embeddings = embedder.embed_texts(&texts).await?;

    summary.documents_added = collection.add(ids, texts, embeddings).await?;
    Ok(summary)
}
