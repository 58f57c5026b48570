use claimsync_api::app::build_app;
use claimsync_api::app::services::{InMemoryBackends, in_memory_services};
use claimsync_auth::{ClaimsSet, Role};
use claimsync_core::{EventId, PrincipalId};
use std::time::{Duration, Instant};

use claimsync_infra::{Decision, InMemoryIdentityStore, OutcomeReason, RetryPolicy, SyncConfig};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    backends: InMemoryBackends,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory stores, ephemeral port.
        let identity = InMemoryIdentityStore::new();
        identity.register(pid());
        let config = SyncConfig {
            redelivery: RetryPolicy::fixed(3, Duration::from_millis(10)),
            ..SyncConfig::default()
        };
        let (services, backends) = in_memory_services(&config, identity).expect("services start");
        let app = build_app(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            backends,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn pid() -> PrincipalId {
    PrincipalId::new("uid-1").unwrap()
}

fn profile_json(role: &str, revision: u64) -> serde_json::Value {
    json!({
        "principalId": "uid-1",
        "role": role,
        "displayName": "A",
        "email": "a@x.com",
        "revision": revision,
        "updatedAt": format!("2024-01-01T00:00:0{revision}Z"),
    })
}

/// A profile without store metadata: only the trigger's arrival can version it.
fn bare_profile_json(role: &str) -> serde_json::Value {
    json!({
        "principalId": "uid-1",
        "role": role,
        "displayName": "A",
        "email": "a@x.com",
    })
}

/// UUIDv7 event ids minted `ms` milliseconds apart.
fn minted_event_id(ms: u64) -> String {
    format!("018f0000-{:04x}-7000-8000-000000000001", ms)
}

async fn post_updated(
    client: &reqwest::Client,
    srv: &TestServer,
    event_id: &str,
    after: serde_json::Value,
) -> reqwest::Response {
    client
        .post(srv.url("/v1/triggers/profile-updated"))
        .header("x-event-id", event_id)
        .json(&json!({ "principalId": "uid-1", "after": after }))
        .send()
        .await
        .unwrap()
}

fn seed_profile(srv: &TestServer, body: serde_json::Value) {
    srv.backends
        .profiles
        .put(serde_json::from_value(body).expect("valid profile"));
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn created_then_updated_syncs_admin_once() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    seed_profile(&srv, profile_json("admin", 2));

    let res = client
        .post(srv.url("/v1/triggers/principal-created"))
        .json(&json!({ "principalId": "uid-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["disposition"], "ack");
    assert_eq!(body["outcome"]["decision"], "accepted");
    assert_eq!(body["outcome"]["reason"], "applied");

    let res = client
        .post(srv.url("/v1/triggers/profile-updated"))
        .json(&json!({
            "principalId": "uid-1",
            "before": profile_json("teacher", 1),
            "after": profile_json("admin", 2),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["outcome"]["decision"], "rejected");
    assert_eq!(body["outcome"]["reason"], "stale");

    assert_eq!(
        srv.backends.identity.claims(&pid()),
        Some(ClaimsSet {
            role: Role::Admin,
            email: "a@x.com".to_string(),
            name: "A".to_string(),
        })
    );
    assert_eq!(srv.backends.outcomes.count(Decision::Accepted), 1);
    assert_eq!(srv.backends.outcomes.count(Decision::Rejected), 1);
}

#[tokio::test]
async fn created_without_profile_is_acknowledged_as_not_found() {
    let srv = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .post(srv.url("/v1/triggers/principal-created"))
        .json(&json!({ "principalId": "uid-1" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["outcome"]["reason"], "not_found");
    assert_eq!(srv.backends.identity.write_count(&pid()), 0);
}

#[tokio::test]
async fn transient_failure_asks_for_redelivery() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    srv.backends.identity.faults().fail_next(1);
    let event_id = EventId::new().to_string();
    let event = json!({
        "principalId": "uid-1",
        "before": null,
        "after": profile_json("teacher", 1),
    });

    let res = client
        .post(srv.url("/v1/triggers/profile-updated"))
        .header("x-event-id", &event_id)
        .json(&event)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["disposition"], "redeliver");
    assert_eq!(body["outcome"]["reason"], "transient");
    assert_eq!(body["outcome"]["eventId"], event_id.as_str());

    // The trigger source retries the same event.
    let res = client
        .post(srv.url("/v1/triggers/profile-updated"))
        .header("x-event-id", &event_id)
        .json(&event)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(srv.backends.identity.claims(&pid()).unwrap().role, Role::Teacher);
}

#[tokio::test]
async fn unrecognized_role_syncs_as_student() {
    let srv = TestServer::spawn().await;
    let mut after = profile_json("superuser", 1);
    after["displayName"] = json!("");

    let res = reqwest::Client::new()
        .post(srv.url("/v1/triggers/profile-updated"))
        .json(&json!({ "principalId": "uid-1", "after": after }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let claims = srv.backends.identity.claims(&pid()).unwrap();
    assert_eq!(claims.role, Role::Student);
    assert_eq!(claims.name, "");
}

#[tokio::test]
async fn mismatched_principal_is_permanent() {
    let srv = TestServer::spawn().await;
    let mut after = profile_json("admin", 1);
    after["principalId"] = json!("uid-2");

    let res = reqwest::Client::new()
        .post(srv.url("/v1/triggers/profile-updated"))
        .json(&json!({ "principalId": "uid-1", "after": after }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["outcome"]["decision"], "failed");
    assert_eq!(body["outcome"]["reason"], "permanent");
    assert_eq!(srv.backends.identity.claims(&pid()), None);
}

#[tokio::test]
async fn bad_requests_are_rejected_before_the_pipeline() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/v1/triggers/principal-created"))
        .json(&json!({ "principalId": "   " }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_client_error());

    for bad_id in ["not-a-uuid", "3f1c9a52-1f2b-4c5d-8e9f-0a1b2c3d4e5f"] {
        let res = client
            .post(srv.url("/v1/triggers/principal-created"))
            .header("x-event-id", bad_id)
            .json(&json!({ "principalId": "uid-1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "invalid_event_id");
    }

    assert!(srv.backends.outcomes.outcomes().is_empty());
}

#[tokio::test]
async fn redelivered_event_keeps_its_version_without_profile_metadata() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let teacher_event = minted_event_id(0);
    let admin_event = minted_event_id(1);

    srv.backends.identity.faults().fail_next(1);
    let res = post_updated(&client, &srv, &teacher_event, bare_profile_json("teacher")).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let res = post_updated(&client, &srv, &admin_event, bare_profile_json("admin")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["outcome"]["reason"], "applied");

    // The older event comes back after the newer one was applied.
    let res = post_updated(&client, &srv, &teacher_event, bare_profile_json("teacher")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["outcome"]["decision"], "rejected");
    assert_eq!(body["outcome"]["reason"], "stale");

    assert_eq!(srv.backends.identity.claims(&pid()).unwrap().role, Role::Admin);
}

#[tokio::test]
async fn duplicate_event_id_is_applied_once() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let event_id = minted_event_id(0);

    for _ in 0..2 {
        let res = post_updated(&client, &srv, &event_id, bare_profile_json("teacher")).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    assert_eq!(srv.backends.outcomes.count(Decision::Accepted), 1);
    assert_eq!(srv.backends.outcomes.count(Decision::Rejected), 1);
    assert_eq!(srv.backends.identity.write_count(&pid()), 1);
}

#[tokio::test]
async fn non_string_contact_fields_sync_as_empty() {
    let srv = TestServer::spawn().await;
    let mut after = profile_json("admin", 1);
    after["email"] = json!(null);
    after["displayName"] = json!(42);

    let res = post_updated(&reqwest::Client::new(), &srv, &minted_event_id(0), after).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        srv.backends.identity.claims(&pid()),
        Some(ClaimsSet {
            role: Role::Admin,
            email: String::new(),
            name: String::new(),
        })
    );
}

#[tokio::test]
async fn undecodable_snapshot_is_reported_as_permanent() {
    let srv = TestServer::spawn().await;
    let event_id = minted_event_id(0);

    let res = post_updated(&reqwest::Client::new(), &srv, &event_id, json!("not a profile")).await;

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["disposition"], "ack");
    assert_eq!(body["outcome"]["decision"], "failed");
    assert_eq!(body["outcome"]["reason"], "permanent");
    assert_eq!(body["outcome"]["eventId"], event_id.as_str());
    assert_eq!(body["outcome"]["eventType"], "profile.updated");

    let outcomes = srv.backends.outcomes.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].reason, OutcomeReason::Permanent);
    assert_eq!(srv.backends.identity.claims(&pid()), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queued_trigger_is_redelivered_by_the_worker() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    srv.backends.identity.faults().fail_next(1);

    let res = client
        .post(srv.url("/v1/triggers/profile-updated"))
        .header("prefer", "respond-async")
        .json(&json!({ "principalId": "uid-1", "after": profile_json("teacher", 1) }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(res.headers()["preference-applied"], "respond-async");

    let deadline = Instant::now() + Duration::from_secs(5);
    let queue = loop {
        let queue: serde_json::Value = client
            .get(srv.url("/v1/triggers/queue"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if queue["stats"]["accepted"] == 1 || Instant::now() > deadline {
            break queue;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    assert_eq!(queue["stats"]["accepted"], 1);
    assert_eq!(queue["stats"]["failed"], 1);
    assert_eq!(queue["stats"]["redelivered"], 1);
    assert_eq!(queue["deadLettered"], 0);
    assert_eq!(srv.backends.identity.claims(&pid()).unwrap().role, Role::Teacher);
}
