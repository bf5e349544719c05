// src/api/routes.rs
use actix_web::web;
use super::handlers;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health_check))
            .route("/grade", web::post().to(handlers::grade))
            .service(
                web::scope("/questions")
                    .route("", web::post().to(handlers::create_question))
                    .route("/{id}", web::get().to(handlers::get_question))
                    .route("/{id}/answer-key", web::put().to(handlers::update_answer_key))
            )
            .service(
                web::scope("/sessions")
                    .route("", web::post().to(handlers::create_session))
                    .route("/{id}", web::get().to(handlers::get_session))
                    .route("/{id}/responses", web::post().to(handlers::add_response))
                    .route("/{id}/submit", web::post().to(handlers::submit_session))
            )
            .service(
                web::scope("/responses")
                    .route("/{id}/regrade", web::post().to(handlers::regrade_response))
                    .route("/{id}/manual-score", web::put().to(handlers::set_manual_score))
            )
    );
}
