use crate::config::{ClaimConfig, SessionConfig};
use crate::models::*;
use crate::services::{ClaimRateLimiter, ClaimService};
use crate::utils::resolve_identity;
use actix_web::cookie::Cookie;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use chrono::Utc;

fn with_session_cookie(mut resp: HttpResponse, cookie: Option<&Cookie<'static>>) -> HttpResponse {
    if let Some(cookie) = cookie
        && let Err(e) = resp.add_cookie(cookie)
    {
        log::error!("Failed to set session cookie: {}", e);
    }
    resp
}

#[utoipa::path(
    post,
    path = "/coupons/claim",
    tag = "coupons",
    params(
        ("X-Session-ID" = Option<String>, Header, description = "会话标识 (无 sessionId cookie 时使用)")
    ),
    responses(
        (status = 200, description = "领取成功", body = ClaimCouponResponse),
        (status = 404, description = "没有可领取的优惠券"),
        (status = 409, description = "并发冲突, 请重试"),
        (status = 429, description = "冷却期内或请求过于频繁"),
        (status = 500, description = "服务器内部错误")
    )
)]
pub async fn claim_coupon(
    req: HttpRequest,
    claim_service: web::Data<ClaimService>,
    rate_limiter: web::Data<ClaimRateLimiter>,
    session_config: web::Data<SessionConfig>,
    claim_config: web::Data<ClaimConfig>,
) -> Result<HttpResponse> {
    let resolved = resolve_identity(&req, &session_config);
    let cookie = resolved.issued_cookie.as_ref();
    let now = Utc::now();

    if let Err(e) = rate_limiter.check(&resolved.identity.ip, now).await {
        return Ok(with_session_cookie(e.error_response(), cookie));
    }

    let result = claim_service
        .claim_with_retries(&resolved.identity, now, claim_config.conflict_retries)
        .await;

    let resp = match result {
        Ok(coupon) => HttpResponse::Ok().json(ApiResponse::success(ClaimCouponResponse {
            message: "Coupon claimed successfully".to_string(),
            coupon,
        })),
        Err(e) => e.error_response(),
    };

    Ok(with_session_cookie(resp, cookie))
}

#[utoipa::path(
    get,
    path = "/coupons/available",
    tag = "coupons",
    responses(
        (status = 200, description = "可领取数量", body = AvailableCouponsResponse),
        (status = 500, description = "服务器内部错误")
    )
)]
pub async fn available_coupons(claim_service: web::Data<ClaimService>) -> Result<HttpResponse> {
    match claim_service.available_count(Utc::now()).await {
        Ok(available_coupons) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            AvailableCouponsResponse { available_coupons },
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn coupon_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/coupons")
            .route("/claim", web::post().to(claim_coupon))
            .route("/available", web::get().to(available_coupons)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::database::{CouponStore, MemoryCouponStore};
    use crate::models::NewCoupon;
    use crate::utils::SESSION_COOKIE;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use chrono::Duration;
    use serde_json::Value;
    use std::sync::Arc;

    async fn seeded_store(codes: &[&str]) -> MemoryCouponStore {
        let store = MemoryCouponStore::new();
        for code in codes {
            store
                .insert(NewCoupon {
                    code: code.to_string(),
                    description: format!("{code} description"),
                    expiry_date: Utc::now() + Duration::days(30),
                })
                .await
                .unwrap();
        }
        store
    }

    macro_rules! coupon_app {
        ($store:expr, $max_requests:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(ClaimService::new(Arc::new($store.clone()))))
                    .app_data(web::Data::new(ClaimRateLimiter::new(&RateLimitConfig {
                        max_requests: $max_requests,
                        window_secs: 86_400,
                    })))
                    .app_data(web::Data::new(SessionConfig {
                        cookie_secure: false,
                        trust_proxy: true,
                    }))
                    .app_data(web::Data::new(ClaimConfig::default()))
                    .service(web::scope("/api/v1").configure(coupon_config)),
            )
            .await
        };
    }

    fn claim_request(ip: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/v1/coupons/claim")
            .insert_header(("X-Forwarded-For", ip))
    }

    #[actix_web::test]
    async fn test_claim_then_cooldown() {
        let store = seeded_store(&["FIRST", "SECOND"]).await;
        let app = coupon_app!(store, 10);

        let resp = test::call_service(&app, claim_request("203.0.113.1").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let issued = resp
            .response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .map(|c| c.value().to_string());
        assert!(issued.is_some());

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["coupon"]["code"], "FIRST");
        assert_eq!(body["data"]["coupon"]["description"], "FIRST description");

        // 同一 IP 第二次领取进入冷却期
        let resp = test::call_service(&app, claim_request("203.0.113.1").to_request()).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            resp.headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok()),
            Some("86400")
        );
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "COOLDOWN_ACTIVE");
        assert_eq!(body["error"]["retry_after_hours"], 24);

        // 其它 IP 拿到下一张
        let resp = test::call_service(&app, claim_request("203.0.113.2").to_request()).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["coupon"]["code"], "SECOND");
    }

    #[actix_web::test]
    async fn test_existing_session_cookie_is_not_reissued() {
        let store = seeded_store(&["ONLY"]).await;
        let app = coupon_app!(store, 10);

        let req = claim_request("203.0.113.9")
            .cookie(Cookie::new(SESSION_COOKIE, "returning-visitor"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.response().cookies().next().is_none());

        let claimed = store
            .list_all(crate::models::CouponOrder::Rotation)
            .await
            .unwrap();
        assert_eq!(
            claimed[0].claimed_by[0].session_id.as_deref(),
            Some("returning-visitor")
        );
    }

    #[actix_web::test]
    async fn test_claim_with_no_coupons() {
        let store = MemoryCouponStore::new();
        let app = coupon_app!(store, 10);

        let resp = test::call_service(&app, claim_request("198.51.100.1").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        // 失败响应同样下发会话 cookie
        assert!(
            resp.response()
                .cookies()
                .any(|c| c.name() == SESSION_COOKIE)
        );
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "NO_COUPONS_AVAILABLE");
    }

    #[actix_web::test]
    async fn test_garbage_forwarded_header_records_peer_ip() {
        let store = seeded_store(&["PEER"]).await;
        let app = coupon_app!(store, 10);

        let req = claim_request(&"z".repeat(200))
            .peer_addr("192.0.2.77:50000".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let claimed = store
            .list_all(crate::models::CouponOrder::Rotation)
            .await
            .unwrap();
        assert_eq!(claimed[0].claimed_by[0].ip, "192.0.2.77");
    }

    #[actix_web::test]
    async fn test_rate_limit_per_ip() {
        let store = MemoryCouponStore::new();
        let app = coupon_app!(store, 3);

        for _ in 0..3 {
            let resp =
                test::call_service(&app, claim_request("198.51.100.7").to_request()).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }
        let resp = test::call_service(&app, claim_request("198.51.100.7").to_request()).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
    }

    #[actix_web::test]
    async fn test_available_count() {
        let store = seeded_store(&["A1", "A2", "A3"]).await;
        let app = coupon_app!(store, 10);

        test::call_service(&app, claim_request("192.0.2.1").to_request()).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/coupons/available")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["available_coupons"], 2);
    }
}
