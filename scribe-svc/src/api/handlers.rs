//! HTTP request handlers
//!
//! Mutating and model-bound endpoints submit to the scheduler and wait for
//! their result; point reads go straight to the stores. The document-query
//! endpoint is the one streaming response in the service.

use crate::queue::{OpOutput, Operation};
use crate::state::AppContext;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use scribe_common::api::types::*;
use scribe_common::db::models::{ChatChannel, ChatExchange, MeetingDetails};
use scribe_common::Error;
use serde_json::json;
use tracing::error;

/// Error wrapper mapping service errors onto HTTP statuses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Gateway(_) | Error::StreamAborted(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(StatusResponse::error(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn unexpected(output: OpOutput) -> ApiError {
    ApiError(Error::Internal(format!("unexpected queue output: {:?}", output)))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "scribe-svc",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /create - allocate a fresh minutes + chat-history document pair
pub async fn create(State(ctx): State<AppContext>) -> ApiResult<Json<CreateResponse>> {
    let minutes_id = ctx.transcript.create().await?;
    let chat_history_id = ctx.history.create().await?;
    Ok(Json(CreateResponse { minutes_id, chat_history_id }))
}

/// GET /agenda/:minutes_id
pub async fn get_agenda(
    State(ctx): State<AppContext>,
    Path(minutes_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let agenda = ctx.transcript.read_agenda(&minutes_id).await?;
    Ok(Json(json!({ "agenda": agenda })))
}

/// POST /agenda (queued)
pub async fn update_agenda(
    State(ctx): State<AppContext>,
    Json(req): Json<AgendaUpdateRequest>,
) -> ApiResult<Json<StatusResponse>> {
    match ctx
        .scheduler
        .submit(Operation::UpdateAgenda { minutes_id: req.minutes_id, agenda: req.agenda })
        .await?
    {
        OpOutput::Done => Ok(Json(StatusResponse::ok())),
        other => Err(unexpected(other)),
    }
}

/// GET /meeting/:minutes_id
pub async fn get_meeting(
    State(ctx): State<AppContext>,
    Path(minutes_id): Path<String>,
) -> ApiResult<Json<MeetingDetails>> {
    Ok(Json(ctx.transcript.read_meeting_details(&minutes_id).await?))
}

/// POST /meeting (queued)
pub async fn update_meeting(
    State(ctx): State<AppContext>,
    Json(req): Json<MeetingUpdateRequest>,
) -> ApiResult<Json<StatusResponse>> {
    match ctx
        .scheduler
        .submit(Operation::UpdateMeeting { minutes_id: req.minutes_id, details: req.data })
        .await?
    {
        OpOutput::Done => Ok(Json(StatusResponse::ok())),
        other => Err(unexpected(other)),
    }
}

/// GET /glossary/:minutes_id
pub async fn get_glossary(
    State(ctx): State<AppContext>,
    Path(minutes_id): Path<String>,
) -> ApiResult<Json<GlossaryResponse>> {
    let glossary = ctx.transcript.read_glossary(&minutes_id).await?;
    Ok(Json(GlossaryResponse { glossary }))
}

/// POST /glossary (queued)
pub async fn update_glossary(
    State(ctx): State<AppContext>,
    Json(req): Json<GlossaryUpdateRequest>,
) -> ApiResult<Json<StatusResponse>> {
    match ctx
        .scheduler
        .submit(Operation::UpdateGlossary {
            minutes_id: req.minutes_id,
            abbreviation: req.abbreviation,
            meaning: req.meaning,
            action: req.action,
        })
        .await?
    {
        OpOutput::Done => Ok(Json(StatusResponse::ok())),
        other => Err(unexpected(other)),
    }
}

/// POST /track_minutes (queued) - synchronize one edited topic block
pub async fn track_minutes(
    State(ctx): State<AppContext>,
    Json(req): Json<TrackMinutesRequest>,
) -> ApiResult<Json<TrackMinutesResponse>> {
    match ctx
        .scheduler
        .submit(Operation::TrackMinutes {
            minutes_id: req.minutes_id,
            topic_id: req.topic_id,
            topic_title: req.topic_title,
            minutes: req.minutes,
            abbreviation: req.abbreviation,
        })
        .await?
    {
        OpOutput::Verdict(verdict) => Ok(Json(TrackMinutesResponse {
            topic: verdict.topic_coherent,
            agenda: verdict.agenda_relevant,
            abbreviation: verdict.abbreviation_expansion,
        })),
        other => Err(unexpected(other)),
    }
}

/// DELETE /topic (queued)
pub async fn delete_topic(
    State(ctx): State<AppContext>,
    Json(req): Json<TopicDeleteRequest>,
) -> ApiResult<Json<StatusResponse>> {
    match ctx
        .scheduler
        .submit(Operation::DeleteTopic {
            minutes_id: req.minutes_id.clone(),
            topic_id: req.topic_id.clone(),
        })
        .await?
    {
        OpOutput::Done => {
            if let Some(vector) = &ctx.vector {
                let sentences = vector.fetch_topic(&req.minutes_id, &req.topic_id).await?;
                let ids: Vec<String> = sentences.into_iter().map(|s| s.sentence_id).collect();
                vector.delete(&req.minutes_id, &ids).await?;
            }
            Ok(Json(StatusResponse::ok()))
        }
        other => Err(unexpected(other)),
    }
}

fn pairs(log: Vec<ChatExchange>) -> Vec<[String; 2]> {
    log.into_iter().map(|e| [e.user, e.assistant]).collect()
}

/// GET /chat/:chat_history_id - both channels as user/assistant pairs
pub async fn get_chat_history(
    State(ctx): State<AppContext>,
    Path(chat_history_id): Path<String>,
) -> ApiResult<Json<ChatHistoryResponse>> {
    let document = ctx.history.read(&chat_history_id, ChatChannel::Document).await?;
    let web = ctx.history.read(&chat_history_id, ChatChannel::Web).await?;
    Ok(Json(ChatHistoryResponse { document: pairs(document), web: pairs(web) }))
}

/// POST /chat/clear (queued)
pub async fn clear_chat(
    State(ctx): State<AppContext>,
    Json(req): Json<ChatClearRequest>,
) -> ApiResult<Json<StatusResponse>> {
    match ctx
        .scheduler
        .submit(Operation::ClearChat {
            chat_history_id: req.chat_history_id,
            channel: req.channel,
        })
        .await?
    {
        OpOutput::Done => Ok(Json(StatusResponse::ok())),
        other => Err(unexpected(other)),
    }
}

/// POST /query/document - streamed grounded answer
///
/// The grounding source topic ids are known before the first token, so
/// they travel in a response header; the body is the raw answer text.
pub async fn query_document(
    State(ctx): State<AppContext>,
    Json(req): Json<DocumentQueryRequest>,
) -> ApiResult<Response> {
    let (topic_ids, stream) = ctx
        .qna
        .answer_document(&req.minutes_id, &req.chat_history_id, &req.question, req.k)
        .await?;

    let sources = HeaderValue::from_str(&topic_ids.join(","))
        .map_err(|e| Error::Internal(format!("unrepresentable topic ids: {}", e)))?;

    let mut response = Response::new(Body::from_stream(stream));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response.headers_mut().insert(SOURCE_TOPICS_HEADER, sources);
    Ok(response)
}

/// POST /query/web (queued) - non-streamed general answer
pub async fn query_web(
    State(ctx): State<AppContext>,
    Json(req): Json<WebQueryRequest>,
) -> ApiResult<Json<WebQueryResponse>> {
    match ctx
        .scheduler
        .submit(Operation::WebQuery {
            chat_history_id: req.chat_history_id,
            question: req.question,
        })
        .await?
    {
        OpOutput::Answer(response) => Ok(Json(WebQueryResponse { response })),
        other => Err(unexpected(other)),
    }
}

/// POST /summarise (queued)
pub async fn summarise(
    State(ctx): State<AppContext>,
    Json(req): Json<SummariseRequest>,
) -> ApiResult<Json<SummariseResponse>> {
    match ctx
        .scheduler
        .submit(Operation::Summarise { minutes_id: req.minutes_id, topic_id: req.topic_id })
        .await?
    {
        OpOutput::Summary(summary) => Ok(Json(SummariseResponse { summary })),
        other => Err(unexpected(other)),
    }
}

/// DELETE /document - drop the whole minutes + chat-history pair
pub async fn delete_document(
    State(ctx): State<AppContext>,
    Json(req): Json<DocumentDeleteRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.transcript.delete_document(&req.minutes_id).await?;
    ctx.history.delete_document(&req.chat_history_id).await?;
    if let Some(vector) = &ctx.vector {
        vector.drop_collection(&req.minutes_id).await?;
    }
    Ok(Json(StatusResponse::ok()))
}
