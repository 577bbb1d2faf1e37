//! HTTP surface: the upload page and the generation endpoint.

use std::num::NonZeroU16;
use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::GenerateError;
use crate::generation::{GenerationRequest, GenerationService};
use crate::prompt::Vibe;

mod middleware;
mod views;

use middleware::ClientKey;
use views::index_handler;

/// Room for JSON framing around the base64 image.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

const MISSING_FIELDS: &str = "Missing image or vibe mode.";

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    service: Arc<GenerationService>,
    max_image_bytes: usize,
}

impl AppState {
    fn new(service: Arc<GenerationService>, max_image_bytes: usize) -> Self {
        Self {
            service,
            max_image_bytes,
        }
    }

    /// Largest request body we'll read: the image as base64 plus framing.
    fn body_limit(&self) -> usize {
        (self.max_image_bytes / 3 + 1)
            .saturating_mul(4)
            .saturating_add(BODY_LIMIT_SLACK)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    #[serde(default, rename = "imageData", alias = "userImage")]
    image_data: Option<String>,
    #[serde(default, alias = "vibe")]
    mode: Option<String>,
}

impl TryFrom<GenerateBody> for GenerationRequest {
    type Error = GenerateError;

    fn try_from(body: GenerateBody) -> Result<Self, Self::Error> {
        let image_data = body
            .image_data
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| GenerateError::Validation(MISSING_FIELDS.into()))?;
        let mode = body
            .mode
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| GenerateError::Validation(MISSING_FIELDS.into()))?;
        let vibe = mode
            .trim()
            .parse::<Vibe>()
            .map_err(|err| GenerateError::Validation(err.to_string()))?;
        Ok(GenerationRequest { image_data, vibe })
    }
}

/// handles the /api/generate POST
async fn generate_handler(
    ClientKey(client_key): ClientKey,
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<Value>, GenerateError> {
    let Json(body) = body.map_err(|rejection| GenerateError::Validation(rejection.body_text()))?;
    let request = GenerationRequest::try_from(body)?;

    let outcome = state.service.generate(&client_key, &request).await?;
    info!(
        "Generated {} for {} via job {}",
        request.vibe, client_key, outcome.job_id
    );
    Ok(Json(json!({
        "status": "success",
        "output": outcome.output,
    })))
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

fn create_router(body_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(index_handler))
        .route("/static/styles.css", axum::routing::get(styles_handler))
        .route("/healthz", axum::routing::get(healthz_handler))
        .route("/api/generate", axum::routing::post(generate_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

/// Serves the app on `listen_addr:port` until the listener fails.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    service: Arc<GenerationService>,
    max_image_bytes: usize,
) -> Result<(), anyhow::Error> {
    let state = AppState::new(service, max_image_bytes);
    let app = create_router(state.body_limit()).with_state(state);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::clock::ManualClock;
    use crate::constants::TEST_IMAGE_DATA;
    use crate::generation::GenerationConfig;
    use crate::job::{Job, JobStatus};
    use crate::provider::JobProvider;
    use crate::provider::testing::ScriptedProvider;
    use crate::ratelimit::{RateLimitConfig, RateLimiter};

    fn setup_app(provider: &Arc<ScriptedProvider>) -> Router {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::in_memory(
            RateLimitConfig {
                max_requests: 5,
                window: Duration::from_secs(60),
            },
            clock.clone(),
        );
        let config = GenerationConfig::default();
        let service = GenerationService::new(
            Some(provider.clone() as Arc<dyn JobProvider>),
            limiter,
            clock,
            config,
        );
        let state = AppState::new(Arc::new(service), config.max_image_bytes);
        create_router(state.body_limit()).with_state(state)
    }

    fn generate_request(body: Value, client: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/generate")
            .header(CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", client)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn valid_body() -> Value {
        json!({ "imageData": TEST_IMAGE_DATA, "mode": "party" })
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn read_body(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    #[tokio::test]
    async fn successful_generation_returns_the_output() {
        let provider = Arc::new(ScriptedProvider::with_job());
        provider.push_poll(Ok(
            Job::new("job-1", JobStatus::Succeeded).with_output(json!(["https://x/1.jpg"]))
        ));
        let app = setup_app(&provider);

        let response = app
            .oneshot(generate_request(valid_body(), "203.0.113.1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json(response).await,
            json!({ "status": "success", "output": "https://x/1.jpg" })
        );
    }

    #[tokio::test]
    async fn aliased_field_names_are_accepted() {
        let provider = Arc::new(ScriptedProvider::with_job());
        provider.push_poll(Ok(
            Job::new("job-1", JobStatus::Succeeded).with_output(json!("https://x/2.jpg"))
        ));
        let app = setup_app(&provider);

        let body = json!({ "userImage": TEST_IMAGE_DATA, "vibe": "Couple" });
        let response = app
            .oneshot(generate_request(body, "203.0.113.1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["output"], "https://x/2.jpg");
    }

    #[tokio::test]
    async fn failed_job_reports_the_provider_message() {
        let provider = Arc::new(ScriptedProvider::with_job());
        for _ in 0..3 {
            provider.push_status(JobStatus::Running);
        }
        provider.push_poll(Ok(Job::new("job-1", JobStatus::Failed).with_error("nsfw")));
        let app = setup_app(&provider);

        let response = app
            .oneshot(generate_request(valid_body(), "203.0.113.1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert!(
            body["error"]
                .as_str()
                .is_some_and(|message| message.contains("nsfw"))
        );
        assert_eq!(provider.cancel_calls(), 0);
    }

    #[tokio::test]
    async fn stuck_job_times_out_and_is_canceled() {
        let provider = Arc::new(ScriptedProvider::with_job());
        let app = setup_app(&provider);

        let response = app
            .oneshot(generate_request(valid_body(), "203.0.113.1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            read_json(response).await["error"],
            "Generation timed out. Please try again."
        );
        assert_eq!(provider.cancel_calls(), 1);
    }

    #[tokio::test]
    async fn sixth_request_in_a_window_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new());
        for _ in 0..5 {
            provider.push_create(Ok(Job::new("job-1", JobStatus::Pending)));
            provider.push_poll(Ok(
                Job::new("job-1", JobStatus::Succeeded).with_output(json!("https://x/1.jpg"))
            ));
        }
        let app = setup_app(&provider);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(generate_request(valid_body(), "198.51.100.9"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app
            .clone()
            .oneshot(generate_request(valid_body(), "198.51.100.9"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(provider.create_calls(), 5);
    }

    #[tokio::test]
    async fn missing_fields_are_a_bad_request() {
        let provider = Arc::new(ScriptedProvider::new());
        let app = setup_app(&provider);

        for body in [
            json!({ "mode": "party" }),
            json!({ "imageData": TEST_IMAGE_DATA }),
            json!({ "imageData": "", "mode": "party" }),
        ] {
            let response = app
                .clone()
                .oneshot(generate_request(body, "203.0.113.1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(read_json(response).await["error"], MISSING_FIELDS);
        }
        assert_eq!(provider.create_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_vibe_and_bad_json_are_bad_requests() {
        let provider = Arc::new(ScriptedProvider::new());
        let app = setup_app(&provider);

        let body = json!({ "imageData": TEST_IMAGE_DATA, "mode": "disco" });
        let response = app
            .clone()
            .oneshot(generate_request(body, "203.0.113.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method("POST")
            .uri("/api/generate")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(read_json(response).await["error"].is_string());
        assert_eq!(provider.create_calls(), 0);
    }

    #[tokio::test]
    async fn healthz_says_ok() {
        let app = setup_app(&Arc::new(ScriptedProvider::new()));
        let request = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_body(response).await, "ok");
    }

    #[tokio::test]
    async fn homepage_lists_the_vibes() {
        let app = setup_app(&Arc::new(ScriptedProvider::new()));
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_body(response).await;
        assert!(body.contains("value=\"party\""));
        assert!(body.contains("value=\"couple\""));
        assert!(body.contains("up to 8 MB"));
    }

    #[tokio::test]
    async fn stylesheet_is_served_as_css() {
        let app = setup_app(&Arc::new(ScriptedProvider::new()));
        let request = Request::builder()
            .uri("/static/styles.css")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/css");
    }

    #[test]
    fn body_limit_fits_a_maximum_size_image() {
        let state = AppState::new(
            Arc::new(GenerationService::new(
                None,
                RateLimiter::in_memory(
                    RateLimitConfig {
                        max_requests: 1,
                        window: Duration::from_secs(1),
                    },
                    Arc::new(ManualClock::new()),
                ),
                Arc::new(ManualClock::new()),
                GenerationConfig::default(),
            )),
            3 * 1024,
        );
        assert_eq!(state.body_limit(), 4 * 1025 + BODY_LIMIT_SLACK);
    }
}
