use crate::config::{AdminConfig, SessionConfig};
use crate::error::AppError;
use crate::middlewares::ADMIN_TOKEN_COOKIE;
use crate::models::*;
use crate::services::AuthService;
use actix_web::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use actix_web::{HttpResponse, ResponseError, Result, web};

fn token_cookie(token: String, expires_in: i64, secure: bool) -> Cookie<'static> {
    Cookie::build(ADMIN_TOKEN_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::None)
        .max_age(CookieDuration::seconds(expires_in))
        .finish()
}

/// 内存存储模式下没有管理员表
fn require_auth_service(
    auth_service: Option<web::Data<AuthService>>,
) -> Result<web::Data<AuthService>, AppError> {
    auth_service.ok_or_else(|| {
        AppError::ConfigError("Admin accounts require a database connection".to_string())
    })
}

fn auth_success(response: AuthResponse, secure: bool) -> HttpResponse {
    let cookie = token_cookie(response.access_token.clone(), response.expires_in, secure);
    HttpResponse::Ok()
        .cookie(cookie)
        .json(ApiResponse::success(response))
}

#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "注册成功", body = AuthResponse),
        (status = 400, description = "请求参数错误"),
        (status = 403, description = "未开放注册")
    )
)]
pub async fn signup(
    auth_service: Option<web::Data<AuthService>>,
    admin_config: web::Data<AdminConfig>,
    session_config: web::Data<SessionConfig>,
    request: web::Json<SignupRequest>,
) -> Result<HttpResponse> {
    if !admin_config.allow_signup {
        return Ok(AppError::Forbidden.error_response());
    }
    let auth_service = match require_auth_service(auth_service) {
        Ok(service) => service,
        Err(e) => return Ok(e.error_response()),
    };

    match auth_service.signup(request.into_inner()).await {
        Ok(response) => Ok(auth_success(response, session_config.cookie_secure)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "登录成功", body = AuthResponse),
        (status = 401, description = "认证失败")
    )
)]
pub async fn login(
    auth_service: Option<web::Data<AuthService>>,
    session_config: web::Data<SessionConfig>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let auth_service = match require_auth_service(auth_service) {
        Ok(service) => service,
        Err(e) => return Ok(e.error_response()),
    };

    match auth_service.login(request.into_inner()).await {
        Ok(response) => Ok(auth_success(response, session_config.cookie_secure)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "已退出登录")
    )
)]
pub async fn logout(session_config: web::Data<SessionConfig>) -> Result<HttpResponse> {
    let mut cookie = token_cookie(String::new(), 0, session_config.cookie_secure);
    cookie.make_removal();

    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(ApiResponse::message_only("Logged out successfully")))
}

pub fn auth_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/signup", web::post().to(signup))
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout)),
    );
}
