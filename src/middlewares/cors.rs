use crate::config::CorsConfig;
use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};

/// 领取接口的会话头
const SESSION_HEADER_NAME: &str = "x-session-id";

pub fn create_cors(config: &CorsConfig) -> Cors {
    let cors = if config.allowed_origins.is_empty() {
        // 未配置时放开, 仅用于本地开发
        Cors::default().allowed_origin_fn(|_, _req_head| true)
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(SESSION_HEADER_NAME),
        ])
        // sessionId / token 均走 cookie
        .supports_credentials()
        .max_age(3600)
}
