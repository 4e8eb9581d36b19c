use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

/// Every public route, served by `/docs`.
const ROUTES: &[(&str, &str, &str)] = &[
    ("GET", "/", "Liveness check with a pointer to this listing"),
    ("GET", "/health", "Uptime, request metrics and component availability"),
    ("GET", "/metrics", "Per-endpoint request counts, error rates and latency"),
    ("POST", "/transcribe", "Multipart field `file`: mono 16-bit WAV -> {text}"),
    ("POST", "/api/get_intent", "{text} -> {poliklinik, aciliyet, sebep_ozeti}"),
    ("POST", "/api/synthesize", "{text, voice?} -> audio/wav"),
    (
        "GET",
        "/ws/stream_stt?sample_rate=<Hz>",
        "WebSocket: binary PCM in, {type: partial|final, text} out; {\"eof\": 1} flushes",
    ),
];

pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Clinic voice assistant backend is running",
        "docs": "/docs"
    }))
}

pub async fn docs() -> HttpResponse {
    let routes: Vec<_> = ROUTES
        .iter()
        .map(|(method, path, description)| {
            json!({ "method": method, "path": path, "description": description })
        })
        .collect();

    HttpResponse::Ok().json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "routes": routes
    }))
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.config();
    let engine = state.speech_engine_name();

    let status = if engine.is_some() && state.has_gemini() {
        "healthy"
    } else {
        "degraded"
    };

    HttpResponse::Ok().json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "active_sessions": metrics.active_sessions
        },
        "memory": get_memory_info(),
        "components": {
            "speech_engine": {
                "engine": engine,
                "model_path": config.stt.model_path,
                "available": engine.is_some()
            },
            "remote_api": {
                "intent_model": config.gemini.intent_model,
                "tts_model": config.gemini.tts_model,
                "configured": state.has_gemini()
            }
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "active_sessions": metrics.active_sessions,
            "total_sessions": metrics.total_sessions,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats
    }))
}

/// Resident and virtual memory of this process, from procfs where available.
fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", process::id())) {
            let kib = |key: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(key))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(0)
            };

            return json!({
                "resident_memory_bytes": kib("VmRSS:") * 1024,
                "virtual_memory_bytes": kib("VmSize:") * 1024,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "pid": process::id()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::middleware::MetricsMiddleware;
    use crate::routes;
    use crate::transcription::testing::ScriptedEngine;
    use actix_web::{test, App};
    use serde_json::Value;
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_health_reports_components() {
        let state = AppState::new(AppConfig::default()).with_speech_engine(Arc::new(ScriptedEngine::default()));
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes::configure)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "degraded");
        assert_eq!(body["components"]["speech_engine"]["engine"], "scripted");
        assert_eq!(body["components"]["remote_api"]["configured"], false);
    }

    #[actix_web::test]
    async fn test_docs_lists_every_route() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes::configure)).await;

        let req = test::TestRequest::get().uri("/docs").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let paths: Vec<&str> = body["routes"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|r| r["path"].as_str())
            .collect();

        assert!(paths.contains(&"/api/get_intent"));
        assert!(paths.contains(&"/api/synthesize"));
        assert!(paths.contains(&"/transcribe"));
    }

    #[actix_web::test]
    async fn test_metrics_group_by_route_pattern() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .configure(routes::configure),
        )
        .await;

        for _ in 0..2 {
            test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        }
        test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/get_intent")
                .set_json(serde_json::json!({ "text": "" }))
                .to_request(),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let endpoints = body["endpoints"].as_array().unwrap();
        let root = endpoints.iter().find(|e| e["endpoint"] == "GET /").unwrap();
        assert_eq!(root["request_count"], 2);

        let intent = endpoints
            .iter()
            .find(|e| e["endpoint"] == "POST /api/get_intent")
            .unwrap();
        assert_eq!(intent["error_count"], 1);
        assert_eq!(body["overall"]["total_errors"], 1);
    }
}
