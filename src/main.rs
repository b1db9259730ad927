use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use duelhub::config::CliArgs;
use duelhub::dispatch::Dispatcher;
use duelhub::notify::Notifier;
use duelhub::store::ResultStore;
use duelhub::web_server::build_server;
use duelhub::worker::worker;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let mut config = cli.to_config().expect("Failed to load configuration");
    if let Some(n) = cli.workers {
        config.pool.workers = n;
    }
    if config.pool.workers == 0 {
        panic!("The number of pool workers must not be 0");
    }

    config
        .dirs
        .ensure()
        .expect("Failed to create working directories");

    let dispatcher = Arc::new(Dispatcher::new(config.pool.workers));
    let store = ResultStore::new(&config.dirs);
    let notifier = Arc::new(Notifier::new(config.consumer.address.clone()));
    let shutdown_token = CancellationToken::new();

    // the consumer may come up later; a failed connect means degraded
    // (unnotified) mode until /internal/consumer-online succeeds
    if let Err(e) = notifier.connect().await {
        log::warn!("consumer unreachable at startup, continuing unnotified: {e:#}");
    }

    let config = Arc::new(config);

    // ======= PREPARATION END, EXECUTION START =======

    let mut workers = JoinSet::new();
    for i in 0..config.pool.workers {
        workers.spawn(worker(
            i,
            config.clone(),
            dispatcher.clone(),
            store.clone(),
            notifier.clone(),
            shutdown_token.clone(),
        ));
    }

    let server = build_server((*config).clone(), dispatcher, store, notifier)
        .expect("Failed to build server");

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
        Some(res_worker) = workers.join_next() => {
            log::error!("A worker terminated unexpectedly: {:?}", res_worker);
        }
    }

    // 1. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    // 2. Broadcast shutdown signal to workers
    shutdown_token.cancel();
    log::info!("Shutdown signal sent to workers, waiting for them to finish...");

    // 3. Wait until every worker terminates
    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            if e.is_panic() {
                log::error!("Worker handle panicked: {:?}", e);
            } else {
                log::error!("Worker handle finished with error: {:?}", e);
            }
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}
