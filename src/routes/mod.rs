mod health_check;
mod messages;

use actix_web::web;

pub use health_check::health_check;

/// Wire up `/health_check` and the versioned `/api/v1` message routes (spec
/// §6.1).
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health_check", web::get().to(health_check::health_check)).service(
        web::scope("/api/v1").service(
            web::resource("/messages")
                .route(web::post().to(messages::submit))
                .route(web::get().to(messages::list)),
        ),
    );

    cfg.service(
        web::resource("/api/v1/messages/{uuid}").route(web::get().to(messages::get)),
    );
    cfg.service(
        web::resource("/api/v1/messages/{uuid}/retry").route(web::post().to(messages::retry)),
    );
    cfg.service(
        web::resource("/api/v1/messages/{uuid}/cancel").route(web::post().to(messages::cancel)),
    );
}
