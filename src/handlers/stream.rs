// src/handlers/stream.rs

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::{
    config::AppState,
    models::auth::CallerContext,
    services::stream_hub::{broadcast_topic, user_topic},
};

// Converte a mensagem do hub ({"type", "payload"}) num evento SSE
fn to_event(result: Result<Value, BroadcastStreamRecvError>) -> Option<Event> {
    match result {
        Ok(value) => {
            let name = value
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("message")
                .to_string();
            let payload = value.get("payload").cloned().unwrap_or(Value::Null);
            Event::default().event(name).json_data(&payload).ok()
        }
        // O cliente perdeu mensagens: pede para recarregar tudo
        Err(BroadcastStreamRecvError::Lagged(missed)) => Event::default()
            .event("lagged")
            .json_data(json!({ "missed": missed }))
            .ok(),
    }
}

// GET /api/stream
#[utoipa::path(
    get,
    path = "/api/stream",
    tag = "Notifications",
    responses(
        (status = 200, description = "Eventos `requests-changed` e `notifications-changed` (text/event-stream)")
    ),
    security(("api_jwt" = []))
)]
pub async fn stream_events(
    State(app_state): State<AppState>,
    caller: CallerContext,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let own = app_state.stream_hub.subscribe(&user_topic(caller.user_id)).await;
    let everyone = app_state.stream_hub.subscribe(&broadcast_topic(caller.tenant_id)).await;

    tracing::debug!(user_id = caller.user_id, tenant_id = %caller.tenant_id, "stream aberto");

    let connected = stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });
    let events = stream::select(BroadcastStream::new(own), BroadcastStream::new(everyone))
        .filter_map(|result| async move { to_event(result).map(Ok) });

    Sse::new(connected.chain(events)).keep_alive(KeepAlive::default())
}
