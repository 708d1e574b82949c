use crate::config::SessionConfig;
use crate::models::ClaimantIdentity;
use actix_web::HttpRequest;
use actix_web::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sessionId";
pub const SESSION_HEADER: &str = "X-Session-ID";
const SESSION_MAX_AGE_DAYS: i64 = 30;
const MAX_SESSION_LEN: usize = 128;

/// 请求方身份, 以及需要回写的新会话 cookie
#[derive(Debug)]
pub struct ResolvedIdentity {
    pub identity: ClaimantIdentity,
    pub issued_cookie: Option<Cookie<'static>>,
}

/// 统一 IP 表示: `::1` 归为 127.0.0.1, `::ffff:a.b.c.d` 还原为 IPv4, 去掉端口
///
/// 无法解析为 IP 时返回 None
pub fn normalize_ip(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let parsed = trimmed
        .parse::<IpAddr>()
        .ok()
        .or_else(|| trimmed.parse::<SocketAddr>().ok().map(|addr| addr.ip()))?;

    let normalized = match parsed {
        IpAddr::V6(v6) if v6.is_loopback() => Ipv4Addr::LOCALHOST.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        IpAddr::V4(v4) => v4.to_string(),
    };
    Some(normalized)
}

/// 信任代理时取 X-Forwarded-For 第一项; 该项不是合法 IP 时退回连接地址
pub fn client_ip(req: &HttpRequest, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(normalize_ip);

        if let Some(ip) = forwarded {
            return ip;
        }
        if req.headers().contains_key("X-Forwarded-For") {
            log::warn!("Ignoring malformed X-Forwarded-For header");
        }
    }

    req.peer_addr()
        .and_then(|addr| normalize_ip(&addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn valid_session(token: &str) -> bool {
    !token.is_empty() && token.len() <= MAX_SESSION_LEN
}

/// cookie 优先, 其次请求头
pub fn session_token(req: &HttpRequest) -> Option<String> {
    let from_cookie = req
        .cookie(SESSION_COOKIE)
        .map(|c| c.value().trim().to_string())
        .filter(|token| valid_session(token));

    from_cookie.or_else(|| {
        req.headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|token| valid_session(token))
    })
}

pub fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, value)
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::None)
        .max_age(CookieDuration::days(SESSION_MAX_AGE_DAYS))
        .finish()
}

/// 解析请求方身份; 没有会话时签发新的 UUID
pub fn resolve_identity(req: &HttpRequest, config: &SessionConfig) -> ResolvedIdentity {
    let ip = client_ip(req, config.trust_proxy);

    match session_token(req) {
        Some(session_id) => ResolvedIdentity {
            identity: ClaimantIdentity::new(ip, Some(session_id)),
            issued_cookie: None,
        },
        None => {
            let session_id = Uuid::new_v4().to_string();
            let cookie = session_cookie(session_id.clone(), config.cookie_secure);
            ResolvedIdentity {
                identity: ClaimantIdentity::new(ip, Some(session_id)),
                issued_cookie: Some(cookie),
            }
        }
    }
}
