//! Requests through the assembled router: sessions, the gate and the error body.
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use buddyhub::{
    AppState, Config, app_with_store, db, events, projects,
    models::ProjectStatus,
    roles::RoleResolver,
    testing,
};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use tower_sessions::MemoryStore;
use uuid::Uuid;

struct Harness {
    db_pool: SqlitePool,
    store: MemoryStore,
    app: Router,
}

impl Harness {
    async fn new() -> Self {
        let db_pool = db::temporary().await;
        let config = Config::default();
        let store = MemoryStore::default();
        let app = app_with_store(AppState::new(db_pool.clone(), &config), &config, store.clone());
        Self { db_pool, store, app }
    }

    async fn cookie(&self, user_id: Uuid) -> String {
        testing::session_cookie(&self.store, user_id).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

fn assert_error(body: &Value, kind: &str) {
    assert_eq!(body["error"], kind);
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    assert_eq!(body["retryable"], false);
}

fn draft() -> projects::NewProject {
    projects::NewProject {
        title: "search engine".to_owned(),
        summary: String::new(),
        status: ProjectStatus::Incubation,
        community_slug: None,
        tech_stack: vec![],
        looking_for: None,
    }
}

#[tokio::test]
async fn no_session_is_unauthenticated() {
    let h = Harness::new().await;

    let (status, body) = h.send(Method::GET, "/buddies", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "unauthenticated");

    let (status, body) = h.send(Method::DELETE, &format!("/admin/projects/{}", Uuid::now_v7()), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "unauthenticated");

    let (status, body) = h.send(Method::GET, "/me/access", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "has_identity": false, "is_approved": false, "is_admin": false }));
}

#[tokio::test]
async fn pending_session_is_held_at_the_gate() {
    let h = Harness::new().await;
    let pending = testing::pending(&h.db_pool).await;
    let cookie = h.cookie(pending.user_id).await;

    let (status, body) = h.send(Method::GET, "/buddies", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_error(&body, "pending_approval");

    let (status, body) = h.send(Method::GET, "/me/access", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "has_identity": true, "is_approved": false, "is_admin": false }));

    // Pending users may still see their own profile.
    let (status, body) = h.send(Method::GET, "/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
}

#[tokio::test]
async fn admin_routes_refuse_members() {
    let h = Harness::new().await;
    let member = testing::member(&h.db_pool).await;
    let admin = testing::admin(&h.db_pool).await;
    let project = projects::create(&h.db_pool, &member, draft()).await.unwrap();
    let uri = format!("/admin/projects/{}", project.id);

    let member_cookie = h.cookie(member.user_id).await;
    let (status, body) = h.send(Method::DELETE, &uri, Some(&member_cookie), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_error(&body, "forbidden");
    assert!(projects::get(&h.db_pool, project.id).await.unwrap().is_some());

    let bulk = json!({ "ids": [project.id], "action": "feature", "on": true });
    let (status, body) = h.send(Method::POST, "/admin/projects/bulk", Some(&member_cookie), Some(bulk.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_error(&body, "forbidden");

    let admin_cookie = h.cookie(admin.user_id).await;
    let (status, body) = h.send(Method::POST, "/admin/projects/bulk", Some(&admin_cookie), Some(bulk)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "touched": 1 }));

    let (status, _) = h.send(Method::DELETE, &uri, Some(&admin_cookie), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(projects::get(&h.db_pool, project.id).await.unwrap().is_none());

    let (status, body) = h.send(Method::DELETE, &uri, Some(&admin_cookie), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "not_found");
}

#[tokio::test]
async fn blank_flag_note_is_invalid() {
    let h = Harness::new().await;
    let member = testing::member(&h.db_pool).await;
    let admin = testing::admin(&h.db_pool).await;
    let project = projects::create(&h.db_pool, &member, draft()).await.unwrap();
    let cookie = h.cookie(admin.user_id).await;

    let uri = format!("/admin/projects/{}/flag", project.id);
    let (status, body) = h
        .send(Method::PUT, &uri, Some(&cookie), Some(json!({ "flagged": true, "note": "" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_error(&body, "invalid");
}

#[tokio::test]
async fn buddy_request_over_http() {
    let h = Harness::new().await;
    let alice = testing::member(&h.db_pool).await;
    let bob = testing::member(&h.db_pool).await;
    let alice_cookie = h.cookie(alice.user_id).await;
    let bob_cookie = h.cookie(bob.user_id).await;

    let uri = format!("/buddies/with/{}", bob.user_id);
    let (status, relation) = h.send(Method::POST, &uri, Some(&alice_cookie), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(relation["status"], "PENDING");

    let (status, body) = h.send(Method::POST, &uri, Some(&alice_cookie), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_error(&body, "conflict");

    let (_, count) = h.send(Method::GET, "/buddies/count", Some(&bob_cookie), None).await;
    assert_eq!(count, json!({ "count": 1 }));

    let accept = format!("/buddies/{}/accept", relation["id"].as_str().unwrap());
    let (status, relation) = h.send(Method::POST, &accept, Some(&bob_cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(relation["status"], "ACCEPTED");

    let (_, card) = h.send(Method::GET, &format!("/p/{}", bob.user_id), Some(&alice_cookie), None).await;
    assert_eq!(card["buddies"], 1);
    assert_eq!(card["relation"], "ACCEPTED");
}

#[tokio::test]
async fn attendees_report_own_rsvp() {
    let h = Harness::new().await;
    let host = testing::host(&h.db_pool).await;
    let member = testing::member(&h.db_pool).await;
    let event = events::create(
        &h.db_pool,
        &RoleResolver::default(),
        &host,
        events::NewEvent {
            title: "workshop".to_owned(),
            start_at: OffsetDateTime::now_utc() + Duration::days(1),
            end_at: None,
            allow_rsvp: true,
            community_slug: None,
        },
    )
    .await
    .unwrap();
    let cookie = h.cookie(member.user_id).await;

    let rsvp = format!("/events/{}/rsvp", event.id);
    let (status, _) = h.send(Method::POST, &rsvp, Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let attendees = format!("/events/{}/attendees", event.id);
    let (status, body) = h.send(Method::GET, &attendees, Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "rsvps": 1, "participants": 0, "attendees": 1, "going": true }));
}
