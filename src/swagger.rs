use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::coupon::claim_coupon,
        handlers::coupon::available_coupons,
        handlers::auth::signup,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::admin::list_coupons,
        handlers::admin::create_coupon,
        handlers::admin::update_coupon,
        handlers::admin::claim_history,
    ),
    components(
        schemas(
            Coupon,
            ClaimRecord,
            ClaimedCoupon,
            ClaimCouponResponse,
            AvailableCouponsResponse,
            ClaimHistoryItem,
            CreateCouponRequest,
            UpdateCouponRequest,
            SignupRequest,
            LoginRequest,
            AdminResponse,
            AuthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "coupons", description = "Public coupon claim API"),
        (name = "auth", description = "Admin authentication API"),
        (name = "admin", description = "Coupon administration API"),
    ),
    info(
        title = "Coupon Claim API",
        version = "1.0.0",
        description = "Round-robin coupon distribution REST API documentation",
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
