use actix_web::HttpResponse;

/// Ambient liveness endpoint; not part of spec §6.1, kept for operational
/// parity with the teacher's own `/health_check`.
pub async fn health_check() -> HttpResponse { HttpResponse::Ok().finish() }
