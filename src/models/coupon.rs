use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{coupon_claim_entity as claim_entity, coupon_entity};

/// 领取者身份: 规范化后的 IP + 会话令牌
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimantIdentity {
    pub ip: String,
    pub session_id: Option<String>,
}

impl ClaimantIdentity {
    pub fn new(ip: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            ip: ip.into(),
            session_id,
        }
    }
}

/// 一次成功领取的记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClaimRecord {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub claimed_at: DateTime<Utc>,
}

impl From<claim_entity::Model> for ClaimRecord {
    fn from(m: claim_entity::Model) -> Self {
        ClaimRecord {
            ip: m.ip,
            session_id: m.session_id,
            claimed_at: m.claimed_at,
        }
    }
}

/// 优惠券 (含领取记录)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub description: String,
    pub is_active: bool,
    pub expiry_date: DateTime<Utc>,
    pub is_used: bool,
    pub last_claim_at: Option<DateTime<Utc>>,
    pub claimed_by: Vec<ClaimRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn from_parts(model: coupon_entity::Model, claims: Vec<claim_entity::Model>) -> Self {
        let mut claimed_by: Vec<ClaimRecord> = claims.into_iter().map(Into::into).collect();
        claimed_by.sort_by_key(|c| c.claimed_at);
        Coupon {
            id: model.id,
            code: model.code,
            description: model.description,
            is_active: model.is_active,
            expiry_date: model.expiry_date,
            is_used: model.is_used,
            last_claim_at: model.last_claim_at,
            claimed_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    /// 最近一次领取时间 (无领取记录为 None)
    pub fn latest_claim_at(&self) -> Option<DateTime<Utc>> {
        self.claimed_by.iter().map(|c| c.claimed_at).max()
    }

    pub fn was_claimed_by_ip(&self, ip: &str) -> bool {
        self.claimed_by.iter().any(|c| c.ip == ip)
    }
}

/// 已校验、已规范化的新建参数 (code 已大写)
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub description: String,
    pub expiry_date: DateTime<Utc>,
}

/// 管理端可修改字段
#[derive(Debug, Clone, Default)]
pub struct CouponPatch {
    pub is_active: Option<bool>,
    pub description: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// 列表排序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponOrder {
    /// 轮转顺序: last_claim_at 升序 (从未领取优先), created_at 升序
    Rotation,
    /// created_at 倒序
    NewestFirst,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    pub code: Option<String>,
    pub description: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateCouponRequest {
    pub is_active: Option<bool>,
    pub description: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// 领取成功后返回给访客的公开字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClaimedCoupon {
    pub code: String,
    pub description: String,
    pub expiry_date: DateTime<Utc>,
}

impl From<Coupon> for ClaimedCoupon {
    fn from(c: Coupon) -> Self {
        ClaimedCoupon {
            code: c.code,
            description: c.description,
            expiry_date: c.expiry_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClaimCouponResponse {
    pub message: String,
    pub coupon: ClaimedCoupon,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailableCouponsResponse {
    pub available_coupons: u64,
}

/// 领取历史条目
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClaimHistoryItem {
    pub id: i64,
    pub code: String,
    pub claimed_by: Vec<ClaimRecord>,
    pub created_at: DateTime<Utc>,
}

impl From<Coupon> for ClaimHistoryItem {
    fn from(c: Coupon) -> Self {
        ClaimHistoryItem {
            id: c.id,
            code: c.code,
            claimed_by: c.claimed_by,
            created_at: c.created_at,
        }
    }
}
