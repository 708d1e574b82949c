use crate::models::*;
use crate::services::CouponService;
use actix_web::{HttpResponse, ResponseError, Result, web};
use chrono::Utc;

#[utoipa::path(
    get,
    path = "/admin/coupons",
    tag = "admin",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "全部优惠券 (新建在前)", body = Vec<Coupon>),
        (status = 401, description = "未认证")
    )
)]
pub async fn list_coupons(coupon_service: web::Data<CouponService>) -> Result<HttpResponse> {
    match coupon_service.list_coupons().await {
        Ok(coupons) => Ok(HttpResponse::Ok().json(ApiResponse::success(coupons))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/coupons",
    tag = "admin",
    security(
        ("bearer_auth" = [])
    ),
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "创建成功", body = Coupon),
        (status = 400, description = "参数错误或优惠码重复"),
        (status = 401, description = "未认证")
    )
)]
pub async fn create_coupon(
    coupon_service: web::Data<CouponService>,
    request: web::Json<CreateCouponRequest>,
) -> Result<HttpResponse> {
    match coupon_service
        .create_coupon(request.into_inner(), Utc::now())
        .await
    {
        Ok(coupon) => Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
            coupon,
            "Coupon created successfully",
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/coupons/{id}",
    tag = "admin",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i64, Path, description = "优惠券ID")
    ),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "更新成功", body = Coupon),
        (status = 400, description = "参数错误"),
        (status = 404, description = "优惠券不存在")
    )
)]
pub async fn update_coupon(
    coupon_service: web::Data<CouponService>,
    path: web::Path<i64>,
    request: web::Json<UpdateCouponRequest>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    match coupon_service
        .update_coupon(id, request.into_inner(), Utc::now())
        .await
    {
        Ok(coupon) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            coupon,
            "Coupon updated successfully",
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/claims",
    tag = "admin",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "领取历史", body = Vec<ClaimHistoryItem>),
        (status = 401, description = "未认证")
    )
)]
pub async fn claim_history(coupon_service: web::Data<CouponService>) -> Result<HttpResponse> {
    match coupon_service.claim_history().await {
        Ok(history) => Ok(HttpResponse::Ok().json(ApiResponse::success(history))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/coupons", web::get().to(list_coupons))
            .route("/coupons", web::post().to(create_coupon))
            .route("/coupons/{id}", web::put().to(update_coupon))
            .route("/claims", web::get().to(claim_history)),
    );
}
