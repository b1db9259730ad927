use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::config::{Config, Role};
use crate::dispatch::Dispatcher;
use crate::notify::Notifier;
use crate::store::ResultStore;

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
}

#[derive(Serialize)]
struct ErrorResponseWithMessage {
    reason: &'static str,
    code: u32,
    message: String,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SourceUpload {
    pub name: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitRequest {
    pub player1: SourceUpload,
    pub player2: SourceUpload,
    pub judge: SourceUpload,
}

impl SubmitRequest {
    fn uploads(&self) -> [(Role, &SourceUpload); 3] {
        [
            (Role::Player1, &self.player1),
            (Role::Player2, &self.player2),
            (Role::Judge, &self.judge),
        ]
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitResponse {
    pub message: String,
    pub submission_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ResultResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LogResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ConnectResponse {
    pub connected: bool,
}

static SUBMISSION_SEQ: AtomicU32 = AtomicU32::new(0);

/// Ids need only be unique per server process; a sequence number plus the
/// submission time keeps them short and greppable in the staging dirs.
fn next_submission_id() -> String {
    let seq = SUBMISSION_SEQ.fetch_add(1, Ordering::Relaxed) % 100_000;
    format!("{seq:05}{}", Local::now().format("%H%M%S"))
}

fn extension_of(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|e| e.to_str())
}

/// Accept a submission: persist the three sources to their staging dirs
/// keyed by a fresh id, then enqueue the id.
pub async fn submit_handler(
    config: web::Data<Config>,
    dispatcher: web::Data<Dispatcher>,
    body: web::Json<SubmitRequest>,
) -> impl Responder {
    let request = body.into_inner();

    let mut staged = Vec::with_capacity(3);
    for (role, upload) in request.uploads() {
        match extension_of(&upload.name).filter(|ext| config.toolchain_for(ext).is_some()) {
            Some(extension) => staged.push((role, upload, extension)),
            None => {
                return HttpResponse::BadRequest().json(ErrorResponseWithMessage {
                    reason: "ERR_INVALID_ARGUMENT",
                    code: 1,
                    message: format!("no toolchain registered for {}", upload.name),
                });
            }
        }
    }

    let id = next_submission_id();
    for (role, upload, extension) in staged {
        let path = config
            .dirs
            .staging_dir(role)
            .join(format!("{id}.{extension}"));
        if let Err(e) = std::fs::write(&path, &upload.content) {
            log::error!("failed to stage {} for submission {id}: {e}", role.name());
            return HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 2,
            });
        }
    }

    dispatcher.submit(id.clone()).await;
    HttpResponse::Ok().json(SubmitResponse {
        message: "Submission received.".to_string(),
        submission_id: id,
    })
}

/// Hand out a stored result exactly once; absence is a normal condition.
pub async fn get_result_handler(
    store: web::Data<ResultStore>,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    match store.take_result(&id) {
        Ok(Some(raw)) => {
            // the orchestrator owns the record format; pass malformed JSON
            // through as a string rather than dropping it
            let result = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
            HttpResponse::Ok().json(ResultResponse {
                found: true,
                result: Some(result),
            })
        }
        Ok(None) => HttpResponse::Ok().json(ResultResponse {
            found: false,
            result: None,
        }),
        Err(e) => {
            log::error!("retrieving result of submission {id}: {e:#}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 2,
            })
        }
    }
}

pub async fn get_log_handler(
    store: web::Data<ResultStore>,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    match store.take_log(&id) {
        Ok(log) => {
            let found = log.is_some();
            HttpResponse::Ok().json(LogResponse { found, log })
        }
        Err(e) => {
            log::error!("retrieving log of submission {id}: {e:#}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 2,
            })
        }
    }
}

/// Inbound trigger: the consumer is reachable now, (re)establish the channel.
pub async fn consumer_online_handler(notifier: web::Data<Notifier>) -> impl Responder {
    let connected = match notifier.connect().await {
        Ok(connected) => connected,
        Err(e) => {
            log::warn!("consumer announced itself but connecting failed: {e:#}");
            false
        }
    };
    HttpResponse::Ok().json(ConnectResponse { connected })
}
