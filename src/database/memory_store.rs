use crate::database::coupon_store::{CouponStore, duplicate_code_error};
use crate::error::AppResult;
use crate::models::{ClaimRecord, ClaimantIdentity, Coupon, CouponOrder, CouponPatch, NewCoupon};
use crate::services::eligibility;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 进程内存储 (测试 / 本地调试)
///
/// 条件写在同一把写锁内完成检查与修改。
#[derive(Clone, Default)]
pub struct MemoryCouponStore {
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    coupons: BTreeMap<i64, Coupon>,
    next_id: i64,
}

impl MemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以现成记录初始化 (保留其 id / 时间戳)
    pub fn with_coupons(coupons: Vec<Coupon>) -> Self {
        let next_id = coupons.iter().map(|c| c.id).max().unwrap_or(0);
        let coupons = coupons.into_iter().map(|c| (c.id, c)).collect();
        Self {
            state: Arc::new(RwLock::new(MemoryState { coupons, next_id })),
        }
    }
}

#[async_trait]
impl CouponStore for MemoryCouponStore {
    async fn find_eligible_candidate(
        &self,
        claimant_ip: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Coupon>> {
        let identity = ClaimantIdentity::new(claimant_ip, None);
        let state = self.state.read().await;
        Ok(state
            .coupons
            .values()
            .filter(|c| eligibility::is_eligible(c, &identity, now))
            .min_by(|a, b| eligibility::rotation_order(a, b))
            .cloned())
    }

    async fn conditional_mark_used(
        &self,
        id: i64,
        claim: ClaimRecord,
    ) -> AppResult<Option<Coupon>> {
        let mut state = self.state.write().await;
        let Some(coupon) = state.coupons.get_mut(&id) else {
            return Ok(None);
        };
        if coupon.is_used {
            return Ok(None);
        }

        coupon.is_used = true;
        coupon.last_claim_at = Some(claim.claimed_at);
        coupon.updated_at = claim.claimed_at;
        coupon.claimed_by.push(claim);
        Ok(Some(coupon.clone()))
    }

    async fn insert(&self, new: NewCoupon) -> AppResult<Coupon> {
        let mut state = self.state.write().await;
        if state
            .coupons
            .values()
            .any(|c| c.code.eq_ignore_ascii_case(&new.code))
        {
            return Err(duplicate_code_error());
        }

        state.next_id += 1;
        let now = Utc::now();
        let coupon = Coupon {
            id: state.next_id,
            code: new.code,
            description: new.description,
            is_active: true,
            expiry_date: new.expiry_date,
            is_used: false,
            last_claim_at: None,
            claimed_by: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }

    async fn update(&self, id: i64, patch: CouponPatch) -> AppResult<Option<Coupon>> {
        let mut state = self.state.write().await;
        let Some(coupon) = state.coupons.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(is_active) = patch.is_active {
            coupon.is_active = is_active;
        }
        if let Some(description) = patch.description {
            coupon.description = description;
        }
        if let Some(expiry_date) = patch.expiry_date {
            coupon.expiry_date = expiry_date;
        }
        coupon.updated_at = Utc::now();
        Ok(Some(coupon.clone()))
    }

    async fn list_all(&self, order: CouponOrder) -> AppResult<Vec<Coupon>> {
        let state = self.state.read().await;
        let mut list: Vec<Coupon> = state.coupons.values().cloned().collect();
        match order {
            CouponOrder::Rotation => list.sort_by(eligibility::rotation_order),
            CouponOrder::NewestFirst => {
                list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
            }
        }
        Ok(list)
    }

    async fn latest_claim_at(&self, ip: &str) -> AppResult<Option<DateTime<Utc>>> {
        let state = self.state.read().await;
        Ok(state
            .coupons
            .values()
            .filter(|c| c.is_used)
            .flat_map(|c| c.claimed_by.iter())
            .filter(|claim| claim.ip == ip)
            .map(|claim| claim.claimed_at)
            .max())
    }

    async fn count_available(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .coupons
            .values()
            .filter(|c| eligibility::is_claimable(c, now))
            .count() as u64)
    }

    async fn list_claimed(&self) -> AppResult<Vec<Coupon>> {
        let state = self.state.read().await;
        let mut list: Vec<Coupon> = state
            .coupons
            .values()
            .filter(|c| !c.claimed_by.is_empty())
            .cloned()
            .collect();
        list.sort_by(|a, b| b.latest_claim_at().cmp(&a.latest_claim_at()));
        Ok(list)
    }
}
