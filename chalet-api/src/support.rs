use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use chalet_core::Actor;
use chalet_support::{ConversationSummary, Message};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{AppJson, AppPath},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/support/inbox", get(team_inbox))
        .route("/v1/support/conversations", get(my_conversations))
        .route("/v1/support/conversations/{id}", get(get_conversation))
        .route("/v1/support/conversations/{id}/messages", post(post_message))
        .route("/v1/support/conversations/{id}/read", post(mark_conversation_read))
        .route("/v1/support/conversations/{id}/stream", get(stream_conversation))
        .route("/v1/support/messages/{id}/read", post(mark_message_read))
}

async fn team_inbox(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    Ok(Json(state.support.inbox(&actor).await?))
}

async fn my_conversations(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    Ok(Json(state.support.customer_conversations(&actor).await?))
}

async fn get_conversation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(state.support.conversation(&actor, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    pub body: String,
}

async fn post_message(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<PostMessageBody>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let message = state.support.post_message(&actor, id, &payload.body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Serialize)]
pub struct ReadReceipt {
    pub conversation_id: Uuid,
    pub marked: u64,
}

async fn mark_conversation_read(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ReadReceipt>, AppError> {
    let marked = state.support.mark_conversation_read(&actor, id).await?;
    Ok(Json(ReadReceipt {
        conversation_id: id,
        marked,
    }))
}

async fn mark_message_read(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Message>, AppError> {
    Ok(Json(state.support.mark_read(&actor, id).await?))
}

/// New messages as `message` events, oldest first.
async fn stream_conversation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let receiver = state.support.watch(&actor, id).await?;
    tracing::debug!(conversation_id = %id, user_id = %actor.user_id, "conversation stream opened");

    let stream = ReceiverStream::new(receiver).map(|message| {
        Event::default()
            .event("message")
            .id(message.id.to_string())
            .json_data(&message)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
