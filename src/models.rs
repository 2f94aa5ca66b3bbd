//! Modelos de dominio (filas de las tablas fuente y resultados de búsqueda).

/// Una fila de una tabla fuente, ya serializada como texto.
///
/// El texto tiene la forma `"File: <name>\n<col>: <value>\n..."` y es lo
/// que se embebe y se inyecta como contexto en el prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub row_index: usize,
    pub text: String,
}

impl Document {
    /// Identificador estable `"<file_name>_<row_index>"`, clave primaria en el vector store.
    pub fn id(&self) -> String {
        format!("{}_{}", self.file_name, self.row_index)
    }
}

/// Resultado de una consulta de vecinos más cercanos.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub text: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_joins_file_name_and_row_index() {
        let doc = Document {
            file_name: "phc_facilities.csv".to_string(),
            row_index: 12,
            text: String::new(),
        };
        assert_eq!(doc.id(), "phc_facilities.csv_12");
    }
}
