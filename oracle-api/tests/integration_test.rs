/// Integration tests for the Oracle API
///
/// These tests drive the full router over in-memory backends:
/// - Registration, login, logout and the session gate
/// - Artifact view, download, delete and ownership isolation
/// - Mock billing and settings
/// - Security headers and health

mod common;

use axum::http::{header, StatusCode};
use common::{body_json, body_text, location, session_cookie, TestContext, PASSWORD};
use oracle_shared::auth::session::SESSION_COOKIE_NAME;
use oracle_shared::models::artifact::CreateArtifact;
use oracle_shared::store::ArtifactStore;

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new();

    let response = ctx.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], "memory");
    assert_eq!(json["redis"], "memory");
    assert!(json["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_unauthenticated_requests_are_turned_away() {
    let ctx = TestContext::new();

    let response = ctx.get("/", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = ctx
        .post_json("/api/chat/stream", None, serde_json::json!({ "prompt": "x" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_logout() {
    let ctx = TestContext::new();
    let cookie = ctx.register("merlin").await;

    let response = ctx.get("/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["account"]["username"], "merlin");
    assert_eq!(json["account"]["tier"], "Free");
    assert_eq!(json["account"]["generation_count"], 0);
    assert_eq!(json["account"]["generation_limit"], 10);
    assert_eq!(json["history"], serde_json::json!([]));
    assert_eq!(json["upgraded"], false);

    // Logout destroys the server-side session
    let response = ctx.get("/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(session_cookie(&response)
        .unwrap()
        .starts_with(&format!("{}=", SESSION_COOKIE_NAME)));

    let response = ctx.get("/", Some(&cookie)).await;
    assert_eq!(location(&response), "/login");

    // Login starts a new one
    let response = ctx
        .post_form(
            "/login",
            None,
            &format!("username=merlin&password={}", PASSWORD),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookie = session_cookie(&response).unwrap();

    let response = ctx.get("/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_rejects_duplicate_username() {
    let ctx = TestContext::new();
    ctx.register("merlin").await;

    let response = ctx
        .post_form(
            "/register",
            None,
            &format!("username=merlin&password={}", PASSWORD),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["message"], "Username already taken.");
}

#[tokio::test]
async fn test_register_validates_input() {
    let ctx = TestContext::new();

    let response = ctx
        .post_form("/register", None, "username=ab&password=short")
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let ctx = TestContext::new();
    ctx.register("merlin").await;

    for form in [
        "username=merlin&password=wrong-password",
        "username=nobody&password=whatever-else",
    ] {
        let response = ctx.post_form("/login", None, form).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Invalid credentials.");
    }
}

#[tokio::test]
async fn test_tampered_cookie_is_ignored() {
    let ctx = TestContext::new();
    let cookie = ctx.register("merlin").await;

    let (name_and_id, _mac) = cookie.rsplit_once('.').unwrap();
    let forged = format!("{}.{}", name_and_id, "0".repeat(64));

    let response = ctx.get("/", Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_view_and_download_post() {
    let ctx = TestContext::new();
    let cookie = ctx.register("merlin").await;

    let response = ctx
        .post_form("/consult-oracle", Some(&cookie), "prompt=speak")
        .await;
    let target = location(&response).to_string();
    assert!(target.starts_with("/post/"));
    let slug = target.trim_start_matches("/post/").to_string();

    let response = ctx.get(&target, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["post"]["title"], "The Oracle Speaks");
    assert_eq!(json["post"]["prompt"], "speak");
    assert!(json["post"]["content"]
        .as_str()
        .unwrap()
        .contains("<h1>The Oracle Speaks</h1>"));
    assert_eq!(json["history"][0]["slug"], slug);

    let response = ctx
        .get(&format!("/post/{}/download", slug), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        &format!("attachment; filename=\"{}.md\"", slug)
    );
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/markdown"
    );
    let markdown = body_text(response).await;
    assert!(markdown.starts_with("# The Oracle Speaks"));
    assert!(markdown.contains("> *[Image of Pythia not found]*"));
}

#[tokio::test]
async fn test_download_falls_back_to_html_without_markdown() {
    let ctx = TestContext::new();
    let cookie = ctx.register("merlin").await;
    let account = ctx.account("merlin").await;

    for (slug, raw_content) in [("0000000000aa", None), ("0000000000bb", Some(String::new()))] {
        ctx.store
            .create_artifact(CreateArtifact {
                account_id: account.id,
                slug: slug.to_string(),
                prompt: "legacy".to_string(),
                title: "Legacy".to_string(),
                content: ctx.config.cipher.encrypt(Some("<p>legacy</p>")).unwrap(),
                raw_content,
            })
            .await
            .unwrap();

        let response = ctx
            .get(&format!("/post/{}/download", slug), Some(&cookie))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<p>legacy</p>");
    }
}

#[tokio::test]
async fn test_missing_post() {
    let ctx = TestContext::new();
    let cookie = ctx.register("merlin").await;

    let response = ctx.get("/post/ffffffffffff", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = ctx.get("/post/ffffffffffff/download", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Post not found");
}

#[tokio::test]
async fn test_artifacts_are_isolated_between_accounts() {
    let ctx = TestContext::new();
    let owner = ctx.register("merlin").await;
    let other = ctx.register("morgana").await;

    let response = ctx
        .post_form("/consult-oracle", Some(&owner), "prompt=secret")
        .await;
    let target = location(&response).to_string();
    let slug = target.trim_start_matches("/post/").to_string();

    let response = ctx.get(&target, Some(&other)).await;
    assert_eq!(location(&response), "/");

    let response = ctx
        .get(&format!("/post/{}/download", slug), Some(&other))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = ctx
        .post_form(&format!("/post/{}/delete", slug), Some(&other), "")
        .await;
    assert_eq!(location(&response), "/");
    assert_eq!(ctx.store.artifact_count().await, 1);

    let json = body_json(ctx.get("/", Some(&other)).await).await;
    assert_eq!(json["history"], serde_json::json!([]));

    // The owner can delete it
    ctx.post_form(&format!("/post/{}/delete", slug), Some(&owner), "")
        .await;
    assert_eq!(ctx.store.artifact_count().await, 0);
}

#[tokio::test]
async fn test_mock_payment_upgrades_and_resets_usage() {
    let ctx = TestContext::new();
    let cookie = ctx.register("merlin").await;
    ctx.set_generation_count("merlin", 10).await;

    let response = ctx.get("/pricing?reason=limit_reached", Some(&cookie)).await;
    let json = body_json(response).await;
    assert_eq!(json["reason"], "limit_reached");
    assert_eq!(json["current_tier"], "Free");
    assert_eq!(json["tiers"].as_array().unwrap().len(), 3);

    let response = ctx.get("/checkout/premium", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = ctx.get("/checkout/platinum", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = ctx
        .post_form("/process-payment", Some(&cookie), "plan=premium")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/?upgraded=true");

    let json = body_json(ctx.get("/?upgraded=true", Some(&cookie)).await).await;
    assert_eq!(json["upgraded"], true);
    assert_eq!(json["account"]["tier"], "Premium");
    assert_eq!(json["account"]["generation_count"], 0);
    assert!(json["account"]["generation_limit"].is_null());

    let response = ctx
        .post_form("/process-payment", Some(&cookie), "plan=gold")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_change_password() {
    let ctx = TestContext::new();
    let cookie = ctx.register("merlin").await;

    let response = ctx
        .post_form(
            "/settings",
            Some(&cookie),
            "current_password=not-my-password&new_password=new-password-1",
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Incorrect current password."
    );

    let response = ctx
        .post_form(
            "/settings",
            Some(&cookie),
            &format!(
                "current_password={}&new_password=new-password-1",
                PASSWORD
            ),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["message"],
        "Password updated successfully."
    );

    let response = ctx
        .post_form(
            "/login",
            None,
            "username=merlin&password=new-password-1",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let ctx = TestContext::new();

    let response = ctx.get("/health", None).await;
    let headers = response.headers();
    assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    assert!(headers.get("Content-Security-Policy").is_some());
    // Not production
    assert!(headers.get("Strict-Transport-Security").is_none());

    let response = ctx.get("/", None).await;
    assert!(response.headers().get("Content-Security-Policy").is_some());
}
