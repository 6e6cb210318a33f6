// ./api/src/main.rs
use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use application::{
    ApiResponse, ApplicationError, INVALID_CREATE_MESSAGE, ListStudentsQuery, StudentRequest,
    StudentService,
};
use infrastructure::InMemoryStudentRepository;

/// Shared handler state.
#[derive(Clone)]
struct AppState {
    student_service: Arc<StudentService>,
}

const DEFAULT_PORT: u16 = 3000;
const STUDENTS_PATH: &str = "/api/mahasiswa";
const STUDENT_PATH: &str = "/api/mahasiswa/:nim";

// Application entry point
#[tokio::main]
async fn main() {
    // --- Logger Initialization ---
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    info!("Logger initialized successfully.");

    let port = port_from_env();

    // --- Dependency Injection ---
    let repository = Arc::new(InMemoryStudentRepository::seeded());
    info!("In-memory student store initialized with seed data.");
    let student_service = Arc::new(StudentService::new(repository));
    let app_state = AppState { student_service };

    let app = app(app_state);
    info!("API routes configured.");

    // --- Server Startup ---
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server starting on {}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Reads `PORT`, falling back to [`DEFAULT_PORT`] when unset or invalid.
fn port_from_env() -> u16 {
    match env::var("PORT") {
        Ok(port_str) => parse_port(&port_str),
        Err(_) => {
            info!(
                "PORT environment variable not set. Using default port {}.",
                DEFAULT_PORT
            );
            DEFAULT_PORT
        }
    }
}

fn parse_port(port_str: &str) -> u16 {
    match u16::from_str(port_str.trim()) {
        Ok(port_num) => {
            info!("Using port {} from environment variable PORT.", port_num);
            port_num
        }
        Err(_) => {
            warn!(
                "Invalid PORT value '{}' in environment variable. Using default port {}.",
                port_str, DEFAULT_PORT
            );
            DEFAULT_PORT
        }
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            STUDENTS_PATH,
            get(list_students_handler).post(create_student_handler),
        )
        .route(
            STUDENT_PATH,
            get(get_student_handler)
                .put(update_student_handler)
                .delete(delete_student_handler),
        )
        .with_state(state)
}

/// Wraps `data` in the `{ status, message, data }` envelope.
fn envelope<T: Serialize>(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Response {
    (
        status,
        Json(ApiResponse::new(status.as_u16(), message, data)),
    )
        .into_response()
}

// --- API Handlers ---

async fn health_check() -> impl IntoResponse {
    info!("Health check endpoint called");
    (StatusCode::OK, "OK")
}

/// GET /api/mahasiswa?nim=&nama=
async fn list_students_handler(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    info!("Received request to list students");
    let query = ListStudentsQuery::from_pairs(pairs);
    match state.student_service.list_students(query.into()).await {
        Ok(students) if students.is_empty() => envelope(
            StatusCode::OK,
            "Tidak ada mahasiswa yang cocok dengan kriteria pencarian.",
            Some(students),
        ),
        Ok(students) => envelope(
            StatusCode::OK,
            "Data mahasiswa berhasil diambil.",
            Some(students),
        ),
        Err(e) => map_application_error_to_response(e),
    }
}

/// GET /api/mahasiswa/:nim
async fn get_student_handler(State(state): State<AppState>, Path(nim): Path<String>) -> Response {
    info!(nim = %nim, "Received request to get student");
    match state.student_service.get_student(&nim).await {
        Ok(student) => envelope(StatusCode::OK, "Data mahasiswa ditemukan.", Some(student)),
        Err(e) => map_application_error_to_response(e),
    }
}

/// POST /api/mahasiswa
async fn create_student_handler(
    State(state): State<AppState>,
    payload: Result<Json<StudentRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            warn!("Rejected create request body: {}", rejection.body_text());
            return map_application_error_to_response(ApplicationError::InvalidInput(
                INVALID_CREATE_MESSAGE.to_string(),
            ));
        }
    };
    info!("Received request to create student");
    match state.student_service.create_student(request).await {
        Ok(student) => envelope(
            StatusCode::CREATED,
            "Mahasiswa berhasil ditambahkan.",
            Some(student),
        ),
        Err(e) => map_application_error_to_response(e),
    }
}

/// PUT /api/mahasiswa/:nim
async fn update_student_handler(
    State(state): State<AppState>,
    Path(nim): Path<String>,
    payload: Result<Json<StudentRequest>, JsonRejection>,
) -> Response {
    info!(nim = %nim, "Received request to update student");
    let request = payload
        .inspect_err(|rejection| {
            warn!(nim = %nim, "Rejected update request body: {}", rejection.body_text());
        })
        .ok()
        .map(|Json(request)| request);
    match state.student_service.update_student(&nim, request).await {
        Ok(student) => envelope(
            StatusCode::OK,
            "Data mahasiswa berhasil diupdate.",
            Some(student),
        ),
        Err(e) => map_application_error_to_response(e),
    }
}

/// DELETE /api/mahasiswa/:nim
async fn delete_student_handler(
    State(state): State<AppState>,
    Path(nim): Path<String>,
) -> Response {
    info!(nim = %nim, "Received request to delete student");
    match state.student_service.delete_student(&nim).await {
        Ok(()) => envelope::<()>(
            StatusCode::OK,
            format!("Mahasiswa dengan NIM {} berhasil dihapus.", nim),
            None,
        ),
        Err(e) => map_application_error_to_response(e),
    }
}

/// Maps an ApplicationError to its HTTP status and error envelope.
fn map_application_error_to_response(err: ApplicationError) -> Response {
    let status = match &err {
        ApplicationError::InvalidInput(_) | ApplicationError::Domain(_) => StatusCode::BAD_REQUEST,
        ApplicationError::Conflict(_) => StatusCode::CONFLICT,
        ApplicationError::NotFound(_) => StatusCode::NOT_FOUND,
    };
    warn!(status = status.as_u16(), "Request failed: {}", err);
    envelope(status, err.to_string(), err.data())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let repository = Arc::new(InMemoryStudentRepository::seeded());
        app(AppState {
            student_service: Arc::new(StudentService::new(repository)),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap_or_else(|err| panic!("failed to build request: {err}"));

        let response = app
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|err| panic!("router request failed: {err}"));
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap_or_else(|err| panic!("failed to read response body: {err}"));
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|err| panic!("response body is not JSON: {err}"));
        (status, value)
    }

    fn assert_envelope(body: &Value, status: StatusCode) {
        assert_eq!(body["status"], json!(status.as_u16()));
        assert!(body["message"].is_string());
        assert!(body.get("data").is_some());
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn list_returns_all_seeded_students() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/api/mahasiswa", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_envelope(&body, status);
        assert_eq!(body["message"], "Data mahasiswa berhasil diambil.");
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(
            data[0],
            json!({"nim": "103022300017", "nama": "Indra Yuda", "jurusan": "RPL", "ipk": 3.8})
        );
    }

    #[tokio::test]
    async fn list_filters_by_nim_and_name() {
        let app = test_app();
        let (_, by_nim) = send(&app, "GET", "/api/mahasiswa?nim=103022300023", None).await;
        assert_eq!(by_nim["data"].as_array().unwrap().len(), 1);
        assert_eq!(by_nim["data"][0]["nama"], "Azwa Radya");

        let (_, by_name) = send(&app, "GET", "/api/mahasiswa?name=HARDI", None).await;
        assert_eq!(by_name["data"][0]["nim"], "103022300027");

        let (status, none) = send(&app, "GET", "/api/mahasiswa?nama=zzz&nim=103022300017", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(none["data"], json!([]));
        assert_eq!(
            none["message"],
            "Tidak ada mahasiswa yang cocok dengan kriteria pencarian."
        );
    }

    #[tokio::test]
    async fn list_tolerates_aliased_and_repeated_filters() {
        let app = test_app();
        let (status, body) = send(
            &app,
            "GET",
            "/api/mahasiswa?id=103022300017&nim=103022300017",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_envelope(&body, status);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["nim"], "103022300017");

        // First non-blank value wins: "ra" keeps Indra and Azwa, in seed order
        let (status, body) = send(&app, "GET", "/api/mahasiswa?nama=&nama=RA&name=zzz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_envelope(&body, status);
        let nims: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["nim"].as_str().unwrap())
            .collect();
        assert_eq!(nims, ["103022300017", "103022300023"]);
    }

    #[tokio::test]
    async fn get_by_nim_found_and_missing() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/api/mahasiswa/103022300017", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["nama"], "Indra Yuda");

        let (status, body) = send(&app, "GET", "/api/mahasiswa/000", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_envelope(&body, status);
        assert_eq!(body["message"], "Mahasiswa dengan NIM 000 tidak ditemukan.");
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn create_returns_created_and_is_retrievable() {
        let app = test_app();
        let new_student =
            json!({"nim": "103022399001", "nama": "Budi Santoso", "jurusan": "DKV", "ipk": 3.9});
        let (status, body) = send(&app, "POST", "/api/mahasiswa", Some(new_student.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_envelope(&body, status);
        assert_eq!(body["data"], new_student);

        let (status, body) = send(&app, "GET", "/api/mahasiswa/103022399001", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], new_student);

        let (_, list) = send(&app, "GET", "/api/mahasiswa", None).await;
        assert_eq!(list["data"][3]["nim"], "103022399001");
    }

    #[tokio::test]
    async fn create_duplicate_returns_conflict_with_nim() {
        let app = test_app();
        let duplicate = json!({"nim": "103022300017", "nama": "Dobel Indra", "jurusan": "RPL", "ipk": 3.0});
        let (status, body) = send(&app, "POST", "/api/mahasiswa", Some(duplicate)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_envelope(&body, status);
        assert_eq!(body["message"], "Mahasiswa dengan NIM 103022300017 sudah ada.");
        assert_eq!(body["data"], json!({"nim": "103022300017"}));
    }

    #[tokio::test]
    async fn create_invalid_returns_bad_request() {
        let app = test_app();
        let (status, body) = send(&app, "POST", "/api/mahasiswa", Some(json!({"nim": "1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_envelope(&body, status);
        assert_eq!(body["message"], INVALID_CREATE_MESSAGE);

        let (status, body) = send(&app, "POST", "/api/mahasiswa", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn update_replaces_record_in_place() {
        let app = test_app();
        let updated = json!({"nim": "103022300023", "nama": "Azwa Radya Updated", "jurusan": "RPL Updated", "ipk": 3.75});
        let (status, body) = send(&app, "PUT", "/api/mahasiswa/103022300023", Some(updated.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_envelope(&body, status);
        assert_eq!(body["data"], updated);

        let (_, list) = send(&app, "GET", "/api/mahasiswa", None).await;
        assert_eq!(list["data"][1], updated);
    }

    #[tokio::test]
    async fn update_mismatch_and_missing() {
        let app = test_app();
        let mismatch = json!({"nim": "103022300017", "nama": "Wrong"});
        let (status, body) = send(&app, "PUT", "/api/mahasiswa/103022300023", Some(mismatch)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Data update tidak valid atau NIM tidak cocok.");

        let (status, _) = send(&app, "PUT", "/api/mahasiswa/103022300023", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let ghost = json!({"nim": "999", "nama": "Ghost"});
        let (status, body) = send(&app, "PUT", "/api/mahasiswa/999", Some(ghost)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let app = test_app();
        let (status, body) = send(&app, "DELETE", "/api/mahasiswa/103022300027", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_envelope(&body, status);
        assert_eq!(body["data"], Value::Null);

        let (status, _) = send(&app, "GET", "/api/mahasiswa/103022300027", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "DELETE", "/api/mahasiswa/103022300027", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_port_falls_back_to_default() {
        assert_eq!(parse_port("8080"), 8080);
        assert_eq!(parse_port("not-a-port"), DEFAULT_PORT);
        assert_eq!(parse_port("70000"), DEFAULT_PORT);
    }
}
