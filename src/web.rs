use actix_web::{web, App, HttpServer, HttpResponse, HttpRequest, Result, ResponseError, middleware};
use actix_web::http::{header, StatusCode};
use actix_files::Files;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use crate::document::AttendanceDocument;
use crate::ranking::{event_summaries, player_stats, rank_all_events, RankingError};
use crate::sync::{DocumentUpdate, StoreError, SyncBroadcaster};

/// Name of the push event carrying a freshly committed document.
pub const UPDATE_EVENT: &str = "dataUpdated";

pub struct AppState {
    pub store: SyncBroadcaster,
    pub capacity: usize,
    pub admin_name: String,
    pub admin_password: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub data_file: PathBuf,
    pub capacity: usize,
    pub admin_name: String,
    pub admin_password: String,
    pub public_dir: PathBuf,
    pub broadcast_capacity: usize,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    name: String,
    password: String,
}

impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({"success": false, "error": self.to_string()}))
    }
}

impl ResponseError for RankingError {
    fn status_code(&self) -> StatusCode {
        match self {
            RankingError::PlayerNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({"error": self.to_string()}))
    }
}

// Whole document, as committed
async fn get_attendance(state: web::Data<AppState>) -> HttpResponse {
    let document = state.store.current().await;
    HttpResponse::Ok().json(document.as_ref())
}

// Whole-document replacement; acknowledged only after the file is written
async fn post_attendance(
    body: web::Json<AttendanceDocument>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, StoreError> {
    match state.store.replace_document(body.into_inner()).await {
        Ok(_) => Ok(HttpResponse::Ok().json(serde_json::json!({"success": true}))),
        Err(e) => {
            log::error!("Failed to persist attendance document: {}", e);
            Err(e)
        }
    }
}

fn sse_frame(update: &DocumentUpdate) -> web::Bytes {
    web::Bytes::from(format!(
        "id: {}\nevent: {}\ndata: {}\n\n",
        update.revision, UPDATE_EVENT, update.json
    ))
}

// Server-Sent Events push channel
async fn updates(state: web::Data<AppState>) -> HttpResponse {
    let rx = state.store.subscribe();
    log::info!(
        "Observer connected at revision {} ({} active)",
        state.store.revision(),
        state.store.observer_count()
    );

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(update) => return Some((Ok::<_, actix_web::Error>(sse_frame(&update)), rx)),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Observer lagged behind, skipped {} update(s)", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

async fn get_rankings(state: web::Data<AppState>) -> HttpResponse {
    let document = state.store.current().await;
    HttpResponse::Ok().json(rank_all_events(&document, state.capacity))
}

async fn get_summary(state: web::Data<AppState>) -> HttpResponse {
    let document = state.store.current().await;
    HttpResponse::Ok().json(event_summaries(&document))
}

async fn get_player_stats(
    name: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, RankingError> {
    let document = state.store.current().await;
    let stats = player_stats(&document, name.as_str())?;
    Ok(HttpResponse::Ok().json(stats))
}

// UI unlock only; the write endpoints stay open
async fn admin_login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if req.name == state.admin_name && req.password == state.admin_password {
        HttpResponse::Ok().json(serde_json::json!({"success": true}))
    } else {
        HttpResponse::Unauthorized().json(serde_json::json!({"success": false, "error": "Invalid name or password"}))
    }
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req: &HttpRequest| {
        let message = err.to_string();
        log::warn!("Rejected attendance payload: {}", message);
        actix_web::error::InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(serde_json::json!({"success": false, "error": message})),
        )
        .into()
    })
}

/// Registers the API routes. Static files are mounted separately.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(
            web::resource("/attendance")
                .route(web::get().to(get_attendance))
                .route(web::post().to(post_attendance)),
        )
        .service(
            web::resource("/api/attendance")
                .route(web::get().to(get_attendance))
                .route(web::post().to(post_attendance)),
        )
        .route("/api/updates", web::get().to(updates))
        .route("/api/rankings", web::get().to(get_rankings))
        .route("/api/summary", web::get().to(get_summary))
        .route("/api/players/{name}/stats", web::get().to(get_player_stats))
        .route("/api/login", web::post().to(admin_login));
}

pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let store = SyncBroadcaster::open(&config.data_file, config.broadcast_capacity)?;
    let app_state = web::Data::new(AppState {
        store,
        capacity: config.capacity,
        admin_name: config.admin_name,
        admin_password: config.admin_password,
    });

    let public_dir = config.public_dir;
    let serve_static = public_dir.is_dir();
    if !serve_static {
        log::warn!("Static directory {} not found, serving API only", public_dir.display());
    }

    HttpServer::new(move || {
        let public_dir = public_dir.clone();
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
            .configure(move |cfg| {
                if serve_static {
                    cfg.service(Files::new("/", public_dir).index_file("index.html"));
                }
            })
    })
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
