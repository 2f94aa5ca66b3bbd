use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::app_state::AppState;

/// Aviso que se muestra cuando la pregunta está vacía.
pub const EMPTY_QUESTION_WARNING: &str = "Please enter a valid question";

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct AskPayload {
    question: String,
}

#[derive(Serialize)]
pub struct AskResponse {
    answer: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    collection: String,
    documents: usize,
    dimension: Option<usize>,
    provider: String,
    chat_model: String,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/ask", post(ask_handler))
        .route("/api/status", get(status_handler))
        .with_state(app_state)
}

// --- Handlers ---

/// Una pregunta vacía se rechaza sin llamar al pipeline; cualquier otra
/// se responde con exactamente una llamada a `RagPipeline::answer`.
#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    Json(payload): Json<AskPayload>,
) -> Result<Json<AskResponse>, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "warning": EMPTY_QUESTION_WARNING })),
        ));
    }

    info!("Pregunta recibida: {}", question);
    match state.pipeline.answer(question).await {
        Ok(answer) => Ok(Json(AskResponse { answer })),
        Err(e) => {
            error!("Error al procesar la consulta RAG: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Error al procesar la consulta RAG: {}", e) })),
            ))
        }
    }
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        collection: state.collection.name().to_string(),
        documents: state.collection.count().await,
        dimension: state.collection.dimension().await,
        provider: state.config.llm_provider.to_string(),
        chat_model: state.config.llm_chat_model.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::AnswerModel;
    use crate::testing::{FailingModel, KeywordEmbedder, RecordingModel, CLINIC_VOCABULARY};
    use std::{fs, sync::Arc};
    use tempfile::TempDir;

    async fn state_with(model: Arc<dyn AnswerModel>) -> (TempDir, AppState) {
        let temp_dir = TempDir::new().expect("should create temp dir");
        fs::write(
            temp_dir.path().join("a.csv"),
            "Name,District\nClinic A,X\nClinic B,Y\n",
        )
        .unwrap();
        let data_dir = temp_dir.path().display().to_string();
        let config = AppConfig::from_lookup(move |key| match key {
            "GEMINI_API_KEY" => Some("test-key".to_string()),
            "DATA_DIR" => Some(data_dir.clone()),
            _ => None,
        })
        .unwrap();

        let state = AppState::build(
            config,
            Arc::new(KeywordEmbedder::new(CLINIC_VOCABULARY)),
            model,
        )
        .await
        .unwrap();
        (temp_dir, state)
    }

    fn ask(question: &str) -> Json<AskPayload> {
        Json(AskPayload {
            question: question.to_string(),
        })
    }

    #[tokio::test]
    async fn blank_questions_never_reach_the_pipeline() {
        let model = RecordingModel::replying("unused");
        let (_dir, state) = state_with(Arc::new(model.clone())).await;

        for question in ["", "   ", "\n\t "] {
            let (status, Json(body)) = ask_handler(State(state.clone()), ask(question))
                .await
                .err()
                .expect("blank question should be rejected");
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["warning"], EMPTY_QUESTION_WARNING);
        }
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn each_question_runs_the_pipeline_once() {
        let model = RecordingModel::replying(" Clinic A. ");
        let (_dir, state) = state_with(Arc::new(model.clone())).await;

        let question = ask("  Which clinic is in District X? ");
        let Json(response) = ask_handler(State(state.clone()), question)
            .await
            .ok()
            .expect("question should be answered");

        assert_eq!(response.answer, "Clinic A.");
        assert_eq!(model.calls(), 1);
        assert!(model.prompts()[0].contains("Question: Which clinic is in District X?\n"));

        ask_handler(State(state), ask("And District Y?"))
            .await
            .ok()
            .expect("question should be answered");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn pipeline_failures_become_server_errors() {
        let (_dir, state) = state_with(Arc::new(FailingModel)).await;

        let (status, Json(body)) = ask_handler(State(state), ask("Which clinic?"))
            .await
            .err()
            .expect("failing model should surface an error");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn status_reports_the_collection() {
        let (_dir, state) = state_with(Arc::new(RecordingModel::replying("ok"))).await;

        let Json(status) = status_handler(State(state)).await;
        assert_eq!(status.collection, "healthcare_documentations4");
        assert_eq!(status.documents, 2);
        assert_eq!(status.dimension, Some(CLINIC_VOCABULARY.len()));
        assert_eq!(status.provider, "gemini");
        assert_eq!(status.chat_model, "gemini-2.5-flash");
    }
}
