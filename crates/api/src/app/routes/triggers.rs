//! Trigger endpoints.
//!
//! The caller is the trigger infrastructure, not a user. `200` means the
//! trigger was handled and must not be sent again; `503` asks for redelivery.
//! Either way the body is the [`SyncReport`]. Callers that redeliver should
//! send the same `x-event-id` (a UUIDv7 minted when the event happened) each
//! time.
//!
//! With `Prefer: respond-async` the trigger is queued instead and answered
//! with `202`; the background worker then owns redelivery.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};

use claimsync_core::{EventId, PrincipalId};
use claimsync_events::{PrincipalCreated, ProfileUpdated, SyncTrigger};
use claimsync_infra::{Disposition, SyncReport};

use crate::app::errors::json_error;
use crate::app::services::AppServices;

pub const EVENT_ID_HEADER: &str = "x-event-id";
const PREFER_HEADER: &str = "prefer";
const PREFERENCE_APPLIED_HEADER: &str = "preference-applied";
const RESPOND_ASYNC: &str = "respond-async";

pub fn router() -> Router {
    Router::new()
        .route("/principal-created", post(principal_created))
        .route("/profile-updated", post(profile_updated))
        .route("/queue", get(queue_stats))
}

async fn principal_created(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> Response {
    dispatch::<PrincipalCreated>(&services, &headers, PrincipalCreated::EVENT_TYPE, body).await
}

async fn profile_updated(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> Response {
    dispatch::<ProfileUpdated>(&services, &headers, ProfileUpdated::EVENT_TYPE, body).await
}

async fn queue_stats(Extension(services): Extension<Arc<AppServices>>) -> Response {
    Json(json!({
        "stats": services.queue_stats(),
        "deadLettered": services.dead_lettered(),
    }))
    .into_response()
}

async fn dispatch<T>(
    services: &AppServices,
    headers: &HeaderMap,
    event_type: &'static str,
    body: JsonValue,
) -> Response
where
    T: DeserializeOwned + Into<SyncTrigger>,
{
    let event_id = match event_id(headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    // Without an addressable principal there is nobody to report the trigger against.
    let addressee = body
        .get("principalId")
        .and_then(JsonValue::as_str)
        .and_then(|raw| PrincipalId::new(raw).ok());

    let trigger: SyncTrigger = match serde_json::from_value::<T>(body) {
        Ok(event) => event.into(),
        Err(err) => {
            let detail = err.to_string();
            return match addressee {
                Some(principal_id) => {
                    let event_id = event_id.unwrap_or_default();
                    let report =
                        services.handler().undecodable(event_id, principal_id, event_type, &detail);
                    report_response(report)
                }
                None => json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_trigger", detail),
            };
        }
    };

    let envelope = match services.receive(event_id, trigger) {
        Ok(envelope) => envelope,
        Err(err) => return json_error(StatusCode::BAD_REQUEST, "invalid_event_id", err.to_string()),
    };

    if prefers_async(headers) {
        let event_id = envelope.event_id();
        return match services.enqueue(envelope) {
            Ok(()) => {
                let mut resp = (
                    StatusCode::ACCEPTED,
                    Json(json!({ "eventId": event_id, "eventType": event_type })),
                )
                    .into_response();
                resp.headers_mut()
                    .insert(PREFERENCE_APPLIED_HEADER, HeaderValue::from_static(RESPOND_ASYNC));
                resp
            }
            Err(err) => {
                json_error(StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable", err.to_string())
            }
        };
    }

    report_response(services.handler().handle(&envelope).await)
}

fn event_id(headers: &HeaderMap) -> Result<Option<EventId>, Response> {
    let Some(raw) = headers.get(EVENT_ID_HEADER) else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(|s| s.trim().parse::<EventId>().ok())
        .filter(|id| id.minted().is_some())
        .map(Some)
        .ok_or_else(|| {
            json_error(StatusCode::BAD_REQUEST, "invalid_event_id", "x-event-id must be a UUIDv7")
        })
}

fn prefers_async(headers: &HeaderMap) -> bool {
    headers
        .get_all(PREFER_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|pref| pref.trim().eq_ignore_ascii_case(RESPOND_ASYNC))
}

fn report_response(report: SyncReport) -> Response {
    let status = match report.disposition {
        Disposition::Ack => StatusCode::OK,
        Disposition::Redeliver => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report)).into_response()
}
