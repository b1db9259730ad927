use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::notify::Notifier;
use crate::routes::{
    consumer_online_handler, get_log_handler, get_result_handler, json_error_handler,
    submit_handler,
};
use crate::store::ResultStore;

pub fn build_server(
    config: Config,
    dispatcher: Arc<Dispatcher>,
    store: ResultStore,
    notifier: Arc<Notifier>,
) -> std::io::Result<Server> {
    let bind_address = config
        .server
        .bind_address
        .clone()
        .unwrap_or("127.0.0.1".to_string());
    let bind_port = config.server.bind_port.unwrap_or(8080);

    let config = web::Data::new(config);
    let dispatcher = web::Data::from(dispatcher);
    let store = web::Data::new(store);
    let notifier = web::Data::from(notifier);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(config.clone())
            .app_data(dispatcher.clone())
            .app_data(store.clone())
            .app_data(notifier.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .service(web::resource("/submit").route(web::post().to(submit_handler)))
            .service(web::resource("/results/{id}").route(web::get().to(get_result_handler)))
            .service(web::resource("/logs/{id}").route(web::get().to(get_log_handler)))
            .service(
                web::resource("/internal/consumer-online")
                    .route(web::post().to(consumer_online_handler)),
            )
    })
    .bind((bind_address, bind_port))?
    .run();

    Ok(server)
}
