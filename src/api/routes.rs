// Read API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_check))
        .service(web::scope("/api").route("/shows", web::get().to(handlers::list_shows)));
}
