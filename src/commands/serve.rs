use std::net::SocketAddr;

use ansi_to_html::Esc;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, ServiceExt};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::NormalizePath;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::clock::RequestNow;
use crate::config::Config;
use crate::controllers::paste::{self, NewPaste};
use crate::db::Database;
use crate::error::AppError;
use crate::models::Consumed;
use crate::types::api::{CreatePaste, CreatedPaste, Health, PasteBody};
use crate::App;

/// The manual for the service in man page form.
const MAN_PAGE: &str = include_str!("../../assets/man.txt");

const NOT_FOUND_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>Paste Not Found</title>
    <style>
      body { font-family: sans-serif; max-width: 600px; margin: 40px auto; }
    </style>
  </head>
  <body>
    <h1>404 - Paste Not Found</h1>
    <p>This paste is expired, exceeded its views, or does not exist.</p>
  </body>
</html>
"#;

pub async fn run(app: App) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], app.config.port));

    app.database.migrate().await?;

    if app.config.test_mode {
        info!("test mode enabled, clients may override the clock");
    }

    let service = NormalizePath::trim_trailing_slash(router(app));

    info!("listening on http://{addr}");
    axum::Server::bind(&addr)
        .serve(service.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn router(app: App) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/healthz", get(healthz))
        .route("/api/pastes", post(create_paste))
        .route("/api/pastes/:id", get(get_paste))
        .route("/p/:id", get(view_paste))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            app.config.limits.max_content_size,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

async fn index() -> &'static str {
    MAN_PAGE
}

async fn healthz(State(db): State<Database>) -> impl IntoResponse {
    let ok = db.is_available().await;
    let status_code = if ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status_code, Json(Health { ok }))
}

async fn create_paste(
    State(config): State<Config>,
    State(db): State<Database>,
    body: Result<Json<CreatePaste>, JsonRejection>,
) -> crate::AppResult<impl IntoResponse> {
    let Json(body) = body?;
    let created = paste::create(&db, NewPaste::try_from(body)?).await?;

    let path = format!("/p/{id}", id = created.id);
    let url = format!("{base_url}{path}", base_url = config.base_url());

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, path)],
        Json(CreatedPaste {
            id: created.id,
            url,
            created_at: created.created_at,
        }),
    ))
}

async fn get_paste(
    State(db): State<Database>,
    RequestNow(now): RequestNow,
    Path(id): Path<String>,
) -> crate::AppResult<Json<PasteBody>> {
    match paste::consume(&db, &id, &now).await? {
        Consumed::Found(view) => Ok(Json(view.into())),
        Consumed::NotFound(_) => Err(AppError::NotFound),
    }
}

async fn view_paste(
    State(db): State<Database>,
    RequestNow(now): RequestNow,
    Path(id): Path<String>,
) -> crate::AppResult<Response> {
    match paste::consume(&db, &id, &now).await? {
        Consumed::Found(view) => {
            let content = Esc(view.content.as_str()).to_string();
            Ok(Html(render_paste(&id, &content)).into_response())
        }
        Consumed::NotFound(_) => {
            Ok((StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response())
        }
    }
}

fn render_paste(id: &str, escaped_content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <title>Paste {id}</title>
    <style>
      body {{
        font-family: sans-serif;
        max-width: 600px;
        margin: 40px auto;
        line-height: 1.5;
      }}
      pre {{
        white-space: pre-wrap;
        word-break: break-word;
        padding: 1rem;
        border: 1px solid #ccc;
        border-radius: 6px;
        background: #f7f7f7;
      }}
    </style>
  </head>
  <body>
    <h1>Paste</h1>
    <pre>{escaped_content}</pre>
  </body>
</html>
"#
    )
}
