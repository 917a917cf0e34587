use crate::proxy::router::GetStatus;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::error;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    let proxy = match state.router().send(GetStatus).await {
        Ok(status) => json!({
            "bot_connected": status.bot_connected,
            "audio_sources": status.audio_sources,
            "transcription_session": status.session,
        }),
        Err(e) => {
            error!("router unavailable for health check: {}", e);
            return HttpResponse::ServiceUnavailable().json(json!({
                "status": "unhealthy",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "error": "message router unavailable"
            }));
        }
    };

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "meeting-transcription-proxy",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "proxy": proxy
    }))
}
