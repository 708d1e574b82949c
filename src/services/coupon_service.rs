use crate::database::CouponStore;
use crate::error::{AppError, AppResult, FieldError};
use crate::models::{
    ClaimHistoryItem, Coupon, CouponOrder, CouponPatch, CreateCouponRequest, NewCoupon,
    UpdateCouponRequest,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// 与 coupons.code 列宽一致
const MAX_CODE_LEN: usize = 64;

/// 管理端优惠券维护
#[derive(Clone)]
pub struct CouponService {
    store: Arc<dyn CouponStore>,
}

/// trim 后非空且不是字面量 "null"
fn normalize_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl CouponService {
    pub fn new(store: Arc<dyn CouponStore>) -> Self {
        Self { store }
    }

    pub async fn create_coupon(
        &self,
        request: CreateCouponRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Coupon> {
        let mut errors = Vec::new();

        let code = match request.code.as_deref() {
            None => {
                errors.push(FieldError::new("code", "Code is required"));
                None
            }
            Some(raw) => match normalize_text(raw) {
                Some(code) if code.chars().count() > MAX_CODE_LEN => {
                    errors.push(FieldError::new(
                        "code",
                        format!("Coupon code must be at most {MAX_CODE_LEN} characters"),
                    ));
                    None
                }
                Some(code) => Some(code.to_uppercase()),
                None => {
                    errors.push(FieldError::new("code", "Invalid coupon code"));
                    None
                }
            },
        };

        let description = match request.description.as_deref() {
            None => {
                errors.push(FieldError::new("description", "Description is required"));
                None
            }
            Some(raw) => {
                let normalized = normalize_text(raw);
                if normalized.is_none() {
                    errors.push(FieldError::new("description", "Invalid description"));
                }
                normalized
            }
        };

        let expiry_date = match request.expiry_date {
            None => {
                errors.push(FieldError::new("expiry_date", "Expiry date is required"));
                None
            }
            Some(at) if at <= now => {
                errors.push(FieldError::new(
                    "expiry_date",
                    "Expiry date must be in the future",
                ));
                None
            }
            Some(at) => Some(at),
        };

        let (Some(code), Some(description), Some(expiry_date)) = (code, description, expiry_date)
        else {
            return Err(AppError::InvalidFields(errors));
        };

        let coupon = self
            .store
            .insert(NewCoupon {
                code,
                description,
                expiry_date,
            })
            .await?;

        log::info!("Coupon created: id={} code={}", coupon.id, coupon.code);
        Ok(coupon)
    }

    pub async fn update_coupon(
        &self,
        id: i64,
        request: UpdateCouponRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Coupon> {
        let mut errors = Vec::new();
        let mut patch = CouponPatch {
            is_active: request.is_active,
            ..Default::default()
        };

        if let Some(raw) = request.description.as_deref() {
            match normalize_text(raw) {
                Some(description) => patch.description = Some(description),
                None => errors.push(FieldError::new("description", "Invalid description")),
            }
        }
        if let Some(at) = request.expiry_date {
            if at <= now {
                errors.push(FieldError::new(
                    "expiry_date",
                    "Expiry date must be in the future",
                ));
            } else {
                patch.expiry_date = Some(at);
            }
        }

        if !errors.is_empty() {
            return Err(AppError::InvalidFields(errors));
        }

        let coupon = self
            .store
            .update(id, patch)
            .await?
            .ok_or_else(|| AppError::NotFound("Coupon not found".to_string()))?;

        log::info!(
            "Coupon updated: id={} active={} code={}",
            coupon.id,
            coupon.is_active,
            coupon.code
        );
        Ok(coupon)
    }

    /// 全部优惠券, 新建在前
    pub async fn list_coupons(&self) -> AppResult<Vec<Coupon>> {
        self.store.list_all(CouponOrder::NewestFirst).await
    }

    /// 领取历史 (仅有领取记录的券)
    pub async fn claim_history(&self) -> AppResult<Vec<ClaimHistoryItem>> {
        let list = self.store.list_claimed().await?;
        Ok(list.into_iter().map(Into::into).collect())
    }
}
