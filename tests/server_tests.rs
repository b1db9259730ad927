use std::fs;
use std::path::Path;
use std::sync::Arc;

use actix_web::{App, test, web};
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;

use duelhub::config::{
    Config, ConsumerConfig, DirConfig, PoolConfig, ServerConfig, ToolchainConfig,
};
use duelhub::dispatch::Dispatcher;
use duelhub::notify::Notifier;
use duelhub::routes::{
    ConnectResponse, LogResponse, ResultResponse, SourceUpload, SubmitRequest, SubmitResponse,
    consumer_online_handler, get_log_handler, get_result_handler, submit_handler,
};
use duelhub::store::{ResultArtifact, ResultStore};

fn test_config(root: &Path) -> Config {
    Config {
        server: ServerConfig {
            bind_address: None,
            bind_port: None,
        },
        dirs: DirConfig {
            scaffold_dir: root.join("scaffold"),
            player1_dir: root.join("staging/p1"),
            player2_dir: root.join("staging/p2"),
            judge_dir: root.join("staging/judge"),
            log_dir: root.join("logs"),
            result_dir: root.join("results"),
            workspace_dir: Some(root.join("workspace")),
        },
        pool: PoolConfig {
            workers: 1,
            compile_timeout_secs: 10,
            run_timeout_secs: 10,
        },
        consumer: ConsumerConfig::default(),
        toolchains: vec![ToolchainConfig {
            extension: "cpp".to_string(),
            command: vec![
                "g++".to_string(),
                "-std=c++17".to_string(),
                "%INPUT%".to_string(),
                "-o".to_string(),
                "%OUTPUT%".to_string(),
            ],
        }],
    }
}

fn submit_request(name: &str) -> SubmitRequest {
    SubmitRequest {
        player1: SourceUpload {
            name: name.to_string(),
            content: "int main() { return 0; }".to_string(),
        },
        player2: SourceUpload {
            name: name.to_string(),
            content: "int main() { return 1; }".to_string(),
        },
        judge: SourceUpload {
            name: name.to_string(),
            content: "int main() { return 2; }".to_string(),
        },
    }
}

macro_rules! init_app {
    ($config:expr, $dispatcher:expr, $store:expr, $notifier:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($config.clone()))
                .app_data(web::Data::from($dispatcher.clone()))
                .app_data(web::Data::new($store.clone()))
                .app_data(web::Data::from($notifier.clone()))
                .service(web::resource("/submit").route(web::post().to(submit_handler)))
                .service(web::resource("/results/{id}").route(web::get().to(get_result_handler)))
                .service(web::resource("/logs/{id}").route(web::get().to(get_log_handler)))
                .service(
                    web::resource("/internal/consumer-online")
                        .route(web::post().to(consumer_online_handler)),
                ),
        )
        .await
    };
}

#[actix_web::test]
async fn test_submit_stages_sources_and_enqueues() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    config.dirs.ensure().unwrap();
    let dispatcher = Arc::new(Dispatcher::new(1));
    let store = ResultStore::new(&config.dirs);
    let notifier = Arc::new(Notifier::new(None));
    let app = init_app!(config, dispatcher, store, notifier);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(submit_request("bot.cpp"))
        .to_request();
    let response: SubmitResponse = test::call_and_read_body_json(&app, req).await;

    assert_eq!(response.message, "Submission received.");
    let id = &response.submission_id;
    assert_eq!(id.len(), 11);

    assert_eq!(
        fs::read_to_string(config.dirs.player1_dir.join(format!("{id}.cpp"))).unwrap(),
        "int main() { return 0; }"
    );
    assert!(config.dirs.judge_dir.join(format!("{id}.cpp")).exists());
    assert_eq!(dispatcher.pending().await, 1);
    assert_eq!(dispatcher.next_submission().await, *id);
}

#[actix_web::test]
async fn test_submit_rejects_unregistered_extension() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    config.dirs.ensure().unwrap();
    let dispatcher = Arc::new(Dispatcher::new(1));
    let store = ResultStore::new(&config.dirs);
    let notifier = Arc::new(Notifier::new(None));
    let app = init_app!(config, dispatcher, store, notifier);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(submit_request("bot.rs"))
        .to_request();
    let response = test::call_service(&app, req).await;

    assert_eq!(response.status(), 400);
    assert_eq!(dispatcher.pending().await, 0);
}

#[actix_web::test]
async fn test_result_endpoint_hands_out_each_result_once() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    config.dirs.ensure().unwrap();
    let dispatcher = Arc::new(Dispatcher::new(1));
    let store = ResultStore::new(&config.dirs);
    let notifier = Arc::new(Notifier::new(None));
    store
        .save(
            "777",
            &ResultArtifact {
                log: Some("the log".to_string()),
                result: Some(r#"{"winner":"player2"}"#.to_string()),
            },
        )
        .unwrap();
    let app = init_app!(config, dispatcher, store, notifier);

    let req = test::TestRequest::get().uri("/results/777").to_request();
    let response: ResultResponse = test::call_and_read_body_json(&app, req).await;
    assert!(response.found);
    assert_eq!(response.result.unwrap()["winner"], "player2");

    // retrieval removed it
    let req = test::TestRequest::get().uri("/results/777").to_request();
    let response: ResultResponse = test::call_and_read_body_json(&app, req).await;
    assert!(!response.found);
    assert!(response.result.is_none());

    let req = test::TestRequest::get().uri("/logs/777").to_request();
    let response: LogResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response.log.as_deref(), Some("the log"));

    let req = test::TestRequest::get().uri("/logs/777").to_request();
    let response: LogResponse = test::call_and_read_body_json(&app, req).await;
    assert!(!response.found);
}

#[actix_web::test]
async fn test_consumer_online_without_configured_consumer() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let dispatcher = Arc::new(Dispatcher::new(1));
    let store = ResultStore::new(&config.dirs);
    let notifier = Arc::new(Notifier::new(None));
    let app = init_app!(config, dispatcher, store, notifier);

    let req = test::TestRequest::post()
        .uri("/internal/consumer-online")
        .to_request();
    let response: ConnectResponse = test::call_and_read_body_json(&app, req).await;
    assert!(!response.connected);
}

#[actix_web::test]
async fn test_consumer_online_establishes_the_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let dispatcher = Arc::new(Dispatcher::new(1));
    let store = ResultStore::new(&config.dirs);
    let notifier = Arc::new(Notifier::new(Some(addr.to_string())));
    let app = init_app!(config, dispatcher, store, notifier);

    let req = test::TestRequest::post()
        .uri("/internal/consumer-online")
        .to_request();
    let response: ConnectResponse = test::call_and_read_body_json(&app, req).await;
    assert!(response.connected);
    assert!(notifier.is_connected().await);
}
