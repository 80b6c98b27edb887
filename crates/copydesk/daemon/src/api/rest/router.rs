//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::config::ServerConfig;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Compliance
        .route("/compliance/check", post(handlers::check_compliance))
        .route("/compliance/checks", get(handlers::list_compliance_checks))
        // Policy rules
        .route("/policy-rules", get(handlers::list_rules))
        .route("/policy-rules", post(handlers::create_rule))
        .route("/policy-rules/:id", put(handlers::update_rule))
        .route("/policy-rules/:id/deactivate", post(handlers::deactivate_rule))
        // Policy documents
        .route("/policy-documents", post(handlers::index_document))
        .route("/policy-documents/:id", delete(handlers::delete_document))
        // Users
        .route("/users", get(handlers::list_users))
        .route("/users", post(handlers::create_user))
        .route("/users/:id", get(handlers::get_user))
        // Content
        .route("/content", get(handlers::list_content))
        .route("/content", post(handlers::create_content))
        .route("/content/:id", get(handlers::get_content))
        .route("/content/:id", put(handlers::edit_content))
        .route("/content/:id/submit", post(handlers::submit_content))
        .route("/content/:id/publish", post(handlers::publish_content))
        .route("/content/:id/compliance", post(handlers::recheck_compliance))
        .route("/content/:id/workflow", get(handlers::get_current_workflow))
        .route("/content/:id/workflows", get(handlers::list_workflows))
        // Steps
        .route("/steps/:id", get(handlers::get_step))
        .route("/steps/:id/approve", post(handlers::approve_step))
        .route("/steps/:id/reject", post(handlers::reject_step))
        .route("/steps/:id/comments", get(handlers::list_comments))
        .route("/steps/:id/comments", post(handlers::add_comment))
        .route("/approvals/pending", get(handlers::pending_approvals))
        // Events
        .route("/events/stream", get(handlers::stream_events));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http());

    let router = if server.enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::server::bootstrap;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> Router {
        let config = DaemonConfig::default();
        let state = bootstrap(&config).await.unwrap();
        create_router(state, &config.server)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_user(app: &Router, name: &str, role: &str) -> String {
        let (status, user) = send(
            app,
            "POST",
            "/api/v1/users",
            Some(json!({
                "name": name,
                "email": format!("{}@example.com", name.to_lowercase()),
                "role": role,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        user["id"].as_str().unwrap().to_string()
    }

    async fn create_content(app: &Router, creator: &str, text: &str) -> String {
        let (status, content) = send(
            app,
            "POST",
            "/api/v1/content",
            Some(json!({ "title": "Launch", "text": text, "creator_id": creator })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(content["status"], "DRAFT");
        content["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["storage"], "memory");
    }

    #[tokio::test]
    async fn check_endpoint_returns_verdict() {
        let app = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/compliance/check",
            Some(json!({
                "text": "Our phone is 100% waterproof and guaranteed to never fail."
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_compliant"], false);
        assert_eq!(body["issues"].as_array().unwrap().len(), 3);
        assert_eq!(body["issues"][0]["severity"], "high");

        let (status, checks) = send(&app, "GET", "/api/v1/compliance/checks?limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(checks.as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/compliance/check",
            Some(json!({ "text": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn blocked_submission_returns_issues() {
        let app = app().await;
        let creator = create_user(&app, "Casey", "CREATOR").await;
        let content = create_content(
            &app,
            &creator,
            "Our phone is 100% waterproof and guaranteed to never fail.",
        )
        .await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/content/{content}/submit"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "COMPLIANCE_BLOCKED");
        assert_eq!(body["details"]["issues"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            &app,
            "GET",
            &format!("/api/v1/content/{content}/workflow"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn approval_chain_over_http() {
        let app = app().await;
        let creator = create_user(&app, "Casey", "CREATOR").await;
        let manager = create_user(&app, "Morgan", "MANAGER").await;
        let legal = create_user(&app, "Lee", "LEGAL").await;
        let content = create_content(&app, &creator, "Meet the phone that keeps up.").await;

        let (status, outcome) = send(
            &app,
            "POST",
            &format!("/api/v1/content/{content}/submit"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["content"]["status"], "PENDING_REVIEW");
        let step1 = outcome["workflow"]["steps"][0]["id"].as_str().unwrap().to_string();
        let step2 = outcome["workflow"]["steps"][1]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/steps/{step1}/approve"),
            Some(json!({ "acting_user_id": legal })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "ROLE_MISMATCH");
        assert_eq!(body["details"]["required_role"], "MANAGER");
        assert_eq!(body["details"]["actual_role"], "LEGAL");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/steps/{step1}/approve"),
            Some(json!({ "acting_user": manager })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        let (_, step) = send(&app, "GET", &format!("/api/v1/steps/{step1}"), None).await;
        assert_eq!(step["status"], "IN_PROGRESS");

        let (status, outcome) = send(
            &app,
            "POST",
            &format!("/api/v1/steps/{step1}/approve"),
            Some(json!({ "acting_user_id": manager })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["content"]["status"], "IN_REVIEW");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/steps/{step1}/approve"),
            Some(json!({ "acting_user_id": manager })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "STATE_CONFLICT");

        let (status, pending) = send(&app, "GET", "/api/v1/approvals/pending?role=legal", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending.as_array().unwrap().len(), 1);
        assert_eq!(pending[0]["step"]["id"], step2.as_str());

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/steps/{step2}/reject"),
            Some(json!({ "acting_user_id": legal })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_FEEDBACK");

        let (status, outcome) = send(
            &app,
            "POST",
            &format!("/api/v1/steps/{step2}/reject"),
            Some(json!({ "acting_user_id": legal, "feedback": "cite the source" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["content"]["status"], "CHANGES_REQUESTED");
        assert_eq!(outcome["workflow"]["status"], "CANCELLED");

        let (status, comments) = send(
            &app,
            "GET",
            &format!("/api/v1/steps/{step2}/comments"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(comments[0]["text"], "cite the source");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/content/{content}/publish"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "NOT_APPROVED");
    }

    #[tokio::test]
    async fn unknown_resources_are_not_found() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/api/v1/content/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = send(&app, "POST", "/api/v1/steps/missing/approve", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/api/v1/approvals/pending?role=intern", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn policy_rules_can_be_managed() {
        let app = app().await;
        let rule = json!({
            "pattern": "miracle cure",
            "reason": "Medical claims need evidence",
            "suggestion": "supportive remedy",
            "category": "health",
            "severity": "high"
        });

        let (status, created) = send(&app, "POST", "/api/v1/policy-rules", Some(rule.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "POST", "/api/v1/policy-rules", Some(rule)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "STATE_CONFLICT");

        let (_, verdict) = send(
            &app,
            "POST",
            "/api/v1/compliance/check",
            Some(json!({ "text": "A Miracle Cure for tired eyes" })),
        )
        .await;
        assert_eq!(verdict["is_compliant"], false);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/policy-rules/{id}/deactivate"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, verdict) = send(
            &app,
            "POST",
            "/api/v1/compliance/check",
            Some(json!({ "text": "A Miracle Cure for tired eyes" })),
        )
        .await;
        assert_eq!(verdict["is_compliant"], true);

        let (_, active) = send(&app, "GET", "/api/v1/policy-rules", None).await;
        let (_, all) = send(&app, "GET", "/api/v1/policy-rules?include_inactive=true", None).await;
        assert_eq!(
            all.as_array().unwrap().len(),
            active.as_array().unwrap().len() + 1
        );
    }

    #[tokio::test]
    async fn policy_documents_round_trip() {
        let app = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/policy-documents",
            Some(json!({
                "document_id": "brand-guide",
                "text": "Never promise outcomes.\n\nAvoid absolute durability claims."
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["document_id"], "brand-guide");

        let (status, _) = send(&app, "DELETE", "/api/v1/policy-documents/brand-guide", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "DELETE", "/api/v1/policy-documents/brand-guide", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
