/// End-to-end tests against the assembled router
///
/// Each test gets its own data directory and SQLite file; requests go through
/// the full middleware stack via `oneshot`.
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use cloudpocket::{
    config::{EmailConfig, ServerConfig},
    context::AppContext,
    metrics,
    otp::OtpPurpose,
    server::build_router,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tower::ServiceExt;

const PASSWORD: &str = "correct horse";
const BOUNDARY: &str = "cloudpocket-test-boundary";

struct TestServer {
    _dir: TempDir,
    ctx: AppContext,
    app: Router,
}

impl TestServer {
    async fn new() -> Self {
        Self::with_email(EmailConfig::Disabled).await
    }

    async fn with_email(email: EmailConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::for_tests(dir.path().to_path_buf());
        config.email = email;
        let ctx = AppContext::new(config).await.unwrap();
        let app = build_router(ctx.clone());
        Self {
            _dir: dir,
            ctx,
            app,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Verify an email through the passcode endpoints and register with it
    async fn register(&self, phone: &str, email: &str, name: &str) -> String {
        let issued = self
            .ctx
            .otp_manager
            .issue(email, OtpPurpose::VerifyEmail)
            .await
            .unwrap();

        let (status, body) = self
            .post_json(
                "/api/verify-otp",
                json!({
                    "otp": issued.code,
                    "otpHash": issued.otp_hash,
                    "expiresAt": issued.expires_at_millis(),
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["valid"], true);

        let (status, body) = self
            .post_json(
                "/api/users/register",
                json!({
                    "phone": phone,
                    "email": email,
                    "name": name,
                    "password": PASSWORD,
                    "otpHash": issued.otp_hash,
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["accessJwt"].as_str().unwrap().to_string()
    }

    async fn login(&self, phone: &str) -> String {
        let (status, body) = self
            .post_json(
                "/api/session",
                json!({ "phone": phone, "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["accessJwt"].as_str().unwrap().to_string()
    }

    async fn upload(&self, token: &str, filename: &str, data: &[u8], category: &str) -> Value {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"category\"\r\n\r\n{c}\r\n\
                 --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
                 Content-Type: application/pdf\r\n\r\n",
                b = BOUNDARY,
                c = category,
                f = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/documents")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap();

        let (status, body) = self.send(request).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

#[tokio::test]
async fn test_hash_and_verify_password_endpoints() {
    let server = TestServer::new().await;

    let (status, body) = server
        .post_json("/api/hash-password", json!({}), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Password is required" }));

    let (status, body) = server
        .post_json("/api/hash-password", json!({ "password": "short" }), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("8 characters"));

    let (status, body) = server
        .post_json("/api/hash-password", json!({ "password": PASSWORD }), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let hash = body["hash"].as_str().unwrap().to_string();
    assert!(hash.starts_with("$2"));

    let (status, body) = server
        .post_json(
            "/api/verify-password",
            json!({ "password": PASSWORD, "hash": hash }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": true }));

    let (_, body) = server
        .post_json(
            "/api/verify-password",
            json!({ "password": "wrong password", "hash": hash }),
            None,
        )
        .await;
    assert_eq!(body, json!({ "valid": false }));

    let (status, body) = server
        .post_json("/api/verify-password", json!({ "password": PASSWORD }), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Hash is required" }));
}

#[tokio::test]
async fn test_verification_endpoints_reject_other_methods() {
    let server = TestServer::new().await;

    for path in [
        "/api/hash-password",
        "/api/verify-password",
        "/api/send-otp",
        "/api/verify-otp",
    ] {
        let (status, body) = server.get(path, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{}", path);
        assert_eq!(body, json!({ "error": "Method not allowed" }));
    }
}

#[tokio::test]
async fn test_send_and_verify_otp_endpoints() {
    let server = TestServer::new().await;

    let (status, body) = server
        .post_json("/api/send-otp", json!({ "email": "not-an-email" }), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid email format" }));

    let (status, body) = server
        .post_json("/api/send-otp", json!({ "email": " asha@example.com" }), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid email format" }));

    let (status, body) = server
        .post_json("/api/send-otp", json!({ "email": "asha@example.com" }), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let otp_hash = body["otpHash"].as_str().unwrap().to_string();
    let expires_at = body["expiresAt"].as_i64().unwrap();
    assert_eq!(otp_hash.len(), 64);

    // No six-digit code hashes to this value except the one that was mailed;
    // 000000 is outside the generated range
    let (status, body) = server
        .post_json(
            "/api/verify-otp",
            json!({ "otp": "000000", "otpHash": otp_hash, "expiresAt": expires_at }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["valid"], false);

    let (status, body) = server
        .post_json(
            "/api/verify-otp",
            json!({ "otp": "123456", "otpHash": otp_hash, "expiresAt": 1000 }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["expired"], true);

    let (status, body) = server
        .post_json("/api/verify-otp", json!({ "otp": "123456" }), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "OTP hash is required" }));
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[tokio::test]
async fn test_passcode_hash_cannot_be_forged() {
    let server = TestServer::new().await;
    let issued = server
        .ctx
        .otp_manager
        .issue("asha@example.com", OtpPurpose::VerifyEmail)
        .await
        .unwrap();
    assert_ne!(issued.otp_hash, sha256_hex(&issued.code));

    // A hash computed by the caller for a code of its choosing
    let forged = sha256_hex("123456");
    let (status, body) = server
        .post_json(
            "/api/verify-otp",
            json!({
                "otp": "123456",
                "otpHash": forged,
                "expiresAt": issued.expires_at_millis(),
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["valid"], false);

    for otp_hash in [forged, issued.otp_hash] {
        let (status, _) = server
            .post_json(
                "/api/users/register",
                json!({
                    "phone": "9876543210",
                    "email": "asha@example.com",
                    "name": "Asha",
                    "password": PASSWORD,
                    "otpHash": otp_hash,
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_wrong_passcodes_exhaust_the_challenge() {
    let server = TestServer::new().await;
    let issued = server
        .ctx
        .otp_manager
        .issue("asha@example.com", OtpPurpose::VerifyEmail)
        .await
        .unwrap();
    let wrong = if issued.code == "111111" { "222222" } else { "111111" };
    let attempt = |otp: &str| {
        json!({
            "otp": otp,
            "otpHash": issued.otp_hash,
            "expiresAt": issued.expires_at_millis(),
        })
    };

    for _ in 0..server.ctx.config.otp.max_attempts {
        let (status, body) = server
            .post_json("/api/verify-otp", attempt(wrong), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid OTP", "valid": false }));
    }

    // Even the right code is refused now
    let (status, body) = server
        .post_json("/api/verify-otp", attempt(&issued.code), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "error": "Too many incorrect attempts. Please request a new code.",
            "valid": false
        })
    );
}

/// Serve an EmailJS stand-in that fails every send
async fn failing_emailjs() -> EmailConfig {
    let app = Router::new().route(
        "/api/v1.0/email/send",
        axum::routing::post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "Service down") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    EmailConfig::EmailJs {
        service_id: "service_pocket".to_string(),
        template_id: "template_otp".to_string(),
        public_key: "public-key".to_string(),
        endpoint: format!("http://{}/api/v1.0/email/send", addr),
    }
}

#[tokio::test]
async fn test_send_otp_reports_mail_failure() {
    let server = TestServer::with_email(failing_emailjs().await).await;
    let sent = || {
        metrics::OTP_SENT_TOTAL
            .with_label_values(&["reset_password"])
            .get()
    };
    let before = sent();

    let (status, body) = server
        .post_json(
            "/api/send-otp",
            json!({ "email": "asha@example.com", "action": "reset" }),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to send OTP email" }));
    assert_eq!(sent(), before);
}

#[tokio::test]
async fn test_malformed_json_is_an_api_error() {
    let server = TestServer::new().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/session")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"phone\": "))
        .unwrap();
    let (status, body) = server.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidRequest");
    assert!(body["message"].is_string());

    let (status, body) = server
        .post_json("/api/users/check", json!({ "email": 42 }), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidRequest");
}

#[tokio::test]
async fn test_registration_requires_verified_email() {
    let server = TestServer::new().await;

    let issued = server
        .ctx
        .otp_manager
        .issue("asha@example.com", OtpPurpose::VerifyEmail)
        .await
        .unwrap();

    // Issued but never verified
    let (status, _) = server
        .post_json(
            "/api/users/register",
            json!({
                "phone": "9876543210",
                "email": "asha@example.com",
                "name": "Asha",
                "password": PASSWORD,
                "otpHash": issued.otp_hash,
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let token = server
        .register("9876543210", "asha@example.com", "Asha")
        .await;

    let (status, body) = server.get("/api/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phone"], "+919876543210");
    assert_eq!(body["name"], "Asha");

    let (_, body) = server
        .post_json(
            "/api/users/check",
            json!({ "phone": "9876543210", "email": "other@example.com" }),
            None,
        )
        .await;
    assert_eq!(body["exists"], true);
    assert_eq!(body["emailMismatch"], true);
}

#[tokio::test]
async fn test_second_login_supersedes_first_session() {
    let server = TestServer::new().await;
    let first = server
        .register("9876543210", "asha@example.com", "Asha")
        .await;

    let (_, body) = server.get("/api/session/check", Some(&first)).await;
    assert_eq!(body, json!({ "valid": true }));

    let second = server.login("9876543210").await;

    let (status, body) = server.get("/api/me", Some(&first)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "SessionSuperseded");

    let (_, body) = server.get("/api/session/check", Some(&first)).await;
    assert_eq!(body, json!({ "valid": false }));

    let (status, _) = server.get("/api/me", Some(&second)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = server.get("/api/session/check", None).await;
    assert_eq!(body, json!({ "valid": false }));
}

#[tokio::test]
async fn test_wrong_passwords_lock_the_account() {
    let server = TestServer::new().await;
    server
        .register("9876543210", "asha@example.com", "Asha")
        .await;

    for remaining in (1..=4).rev() {
        let (status, body) = server
            .post_json(
                "/api/session",
                json!({ "phone": "9876543210", "password": "not it at all" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains(&format!("{} attempt", remaining)));
    }

    let (status, _) = server
        .post_json(
            "/api/session",
            json!({ "phone": "9876543210", "password": "not it at all" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // The right password does not help while locked
    let (status, body) = server
        .post_json(
            "/api/session",
            json!({ "phone": "9876543210", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "LockedOut");
}

#[tokio::test]
async fn test_linked_account_can_read_documents() {
    let server = TestServer::new().await;
    let asha = server
        .register("9876543210", "asha@example.com", "Asha")
        .await;
    let ravi = server
        .register("9123456789", "ravi@example.com", "Ravi")
        .await;

    let uploaded = server
        .upload(&ravi, "aadhaar.pdf", b"%PDF-1.4 test", "Identity")
        .await;
    assert_eq!(uploaded["name"], "aadhaar");
    assert_eq!(uploaded["category"], "Identity");

    // Not linked yet
    let (status, _) = server
        .get("/api/documents?owner=9123456789", Some(&asha))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server
        .post_json(
            "/api/links",
            json!({
                "phone": "9123456789",
                "email": "ravi@example.com",
                "password": PASSWORD,
                "nickname": "Brother",
            }),
            Some(&asha),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["linkedAccounts"][0]["name"], "Brother");

    let (status, body) = server
        .get("/api/documents?owner=9123456789", Some(&asha))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents"].as_array().unwrap().len(), 1);

    // Reads only; the owner alone may delete
    let path = format!("/api/documents/{}", uploaded["id"].as_str().unwrap());
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(&path)
        .header(header::AUTHORIZATION, format!("Bearer {}", asha))
        .body(Body::empty())
        .unwrap();
    let (status, _) = server.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The link is one-way
    let (status, _) = server
        .get("/api/documents?owner=9876543210", Some(&ravi))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The stored file is served from the public URL
    let url = uploaded["url"].as_str().unwrap();
    let file_path = url.trim_start_matches("http://localhost:8080");
    let response = server
        .app
        .clone()
        .oneshot(Request::builder().uri(file_path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.4 test");
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let server = TestServer::new().await;

    let (status, body) = server.get("/api/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let (status, body) = server.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
