use crate::database::CouponStore;
use crate::error::{AppError, AppResult};
use crate::models::{ClaimRecord, ClaimantIdentity, ClaimedCoupon};
use crate::services::eligibility;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// 优惠券分配
#[derive(Clone)]
pub struct ClaimService {
    store: Arc<dyn CouponStore>,
}

impl ClaimService {
    pub fn new(store: Arc<dyn CouponStore>) -> Self {
        Self { store }
    }

    /// 领取一张优惠券
    ///
    /// 流程:
    /// 1. 冷却期检查 (按 IP), 命中返回 CooldownActive
    /// 2. 按轮转顺序选出候选券, 无候选返回 NoCouponsAvailable
    /// 3. 条件写: 仅当候选券仍未使用时追加领取记录并置为已使用;
    ///    条件不成立返回 ClaimConflict, 不在同一候选上重试
    pub async fn claim(
        &self,
        identity: &ClaimantIdentity,
        now: DateTime<Utc>,
    ) -> AppResult<ClaimedCoupon> {
        let last_claim_at = self.store.latest_claim_at(&identity.ip).await?;
        if let Some(at) = last_claim_at
            && eligibility::is_in_cooldown(Some(at), now)
        {
            return Err(AppError::CooldownActive {
                hours_left: eligibility::hours_left(at, now),
            });
        }

        let candidate = self
            .store
            .find_eligible_candidate(&identity.ip, now)
            .await?
            .ok_or(AppError::NoCouponsAvailable)?;

        let claim = ClaimRecord {
            ip: identity.ip.clone(),
            session_id: identity.session_id.clone(),
            claimed_at: now,
        };

        match self.store.conditional_mark_used(candidate.id, claim).await? {
            Some(coupon) => {
                log::info!(
                    "Coupon claimed: code={} ip={} at={}",
                    coupon.code,
                    identity.ip,
                    now.to_rfc3339()
                );
                Ok(coupon.into())
            }
            None => Err(AppError::ClaimConflict),
        }
    }

    /// 冲突后重新走完整流程 (重新检查冷却期与选券), 最多额外 `retries` 次
    pub async fn claim_with_retries(
        &self,
        identity: &ClaimantIdentity,
        now: DateTime<Utc>,
        retries: u32,
    ) -> AppResult<ClaimedCoupon> {
        let mut attempt = 0;
        loop {
            match self.claim(identity, now).await {
                Err(AppError::ClaimConflict) if attempt < retries => {
                    attempt += 1;
                    log::debug!(
                        "Claim conflict for ip={}, retrying ({attempt}/{retries})",
                        identity.ip
                    );
                }
                other => return other,
            }
        }
    }

    /// 当前可领取数量 (只读)
    pub async fn available_count(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.store.count_available(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryCouponStore;
    use crate::models::{Coupon, CouponOrder, CouponPatch, NewCoupon};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap()
    }

    fn coupon(id: i64, code: &str) -> Coupon {
        Coupon {
            id,
            code: code.to_string(),
            description: format!("{code} description"),
            is_active: true,
            expiry_date: t0() + Duration::days(30),
            is_used: false,
            last_claim_at: None,
            claimed_by: Vec::new(),
            created_at: t0() - Duration::days(10) + Duration::minutes(id),
            updated_at: t0() - Duration::days(10),
        }
    }

    fn service_with(coupons: Vec<Coupon>) -> (ClaimService, MemoryCouponStore) {
        let store = MemoryCouponStore::with_coupons(coupons);
        (ClaimService::new(Arc::new(store.clone())), store)
    }

    fn visitor(ip: &str) -> ClaimantIdentity {
        ClaimantIdentity::new(ip, Some(format!("session-{ip}")))
    }

    #[tokio::test]
    async fn test_claim_skips_inactive_then_cooldown() {
        let mut b = coupon(2, "B");
        b.is_active = false;
        let (service, _) = service_with(vec![coupon(1, "A"), b]);
        let x = visitor("203.0.113.7");

        let claimed = service.claim(&x, t0()).await.unwrap();
        assert_eq!(claimed.code, "A");
        assert_eq!(claimed.description, "A description");

        let err = service.claim(&x, t0()).await.unwrap_err();
        assert!(matches!(err, AppError::CooldownActive { hours_left: 24 }));
    }

    #[tokio::test]
    async fn test_cooldown_boundaries() {
        let (service, _) = service_with(vec![coupon(1, "A"), coupon(2, "B"), coupon(3, "C")]);
        let x = visitor("198.51.100.1");
        service.claim(&x, t0()).await.unwrap();

        let almost = t0() + Duration::hours(23) + Duration::minutes(59);
        let err = service.claim(&x, almost).await.unwrap_err();
        assert!(matches!(err, AppError::CooldownActive { hours_left: 1 }));

        let after = t0() + Duration::hours(24) + Duration::minutes(1);
        let claimed = service.claim(&x, after).await.unwrap();
        assert_eq!(claimed.code, "B");
    }

    #[tokio::test]
    async fn test_cooldown_keyed_on_ip_not_session() {
        let (service, _) = service_with(vec![coupon(1, "A"), coupon(2, "B")]);
        service
            .claim(&ClaimantIdentity::new("10.1.1.1", Some("s1".into())), t0())
            .await
            .unwrap();

        let err = service
            .claim(&ClaimantIdentity::new("10.1.1.1", Some("s2".into())), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CooldownActive { .. }));

        // 不同 IP 相同会话不受影响
        let other = service
            .claim(&ClaimantIdentity::new("10.1.1.2", Some("s1".into())), t0())
            .await
            .unwrap();
        assert_eq!(other.code, "B");
    }

    #[tokio::test]
    async fn test_no_coupons_available() {
        let mut expired = coupon(1, "OLD");
        expired.expiry_date = t0();
        let (service, _) = service_with(vec![expired]);

        let err = service.claim(&visitor("10.0.0.1"), t0()).await.unwrap_err();
        assert!(matches!(err, AppError::NoCouponsAvailable));
    }

    #[tokio::test]
    async fn test_rotation_prefers_never_claimed_then_oldest() {
        let t1 = t0() - Duration::days(3);
        let t2 = t0() - Duration::days(2);

        let mut c1 = coupon(1, "T1");
        c1.last_claim_at = Some(t1);
        let mut c2 = coupon(2, "T2");
        c2.last_claim_at = Some(t2);
        let never = coupon(3, "NEVER");

        let (service, _) = service_with(vec![c1, c2, never]);
        let first = service.claim(&visitor("10.0.0.1"), t0()).await.unwrap();
        assert_eq!(first.code, "NEVER");
        let second = service.claim(&visitor("10.0.0.2"), t0()).await.unwrap();
        assert_eq!(second.code, "T1");
        let third = service.claim(&visitor("10.0.0.3"), t0()).await.unwrap();
        assert_eq!(third.code, "T2");
    }

    #[tokio::test]
    async fn test_equal_last_claim_prefers_earlier_created() {
        let t1 = t0() - Duration::days(1);
        let mut newer = coupon(1, "NEWER");
        newer.last_claim_at = Some(t1);
        newer.created_at = t0() - Duration::days(5);
        let mut older = coupon(2, "OLDER");
        older.last_claim_at = Some(t1);
        older.created_at = t0() - Duration::days(6);

        let (service, _) = service_with(vec![newer, older]);
        let claimed = service.claim(&visitor("10.0.0.1"), t0()).await.unwrap();
        assert_eq!(claimed.code, "OLDER");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_coupon_has_exactly_one_winner() {
        let (service, store) = service_with(vec![coupon(1, "ONLY")]);

        let mut handles = Vec::new();
        for i in 0..32 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.claim(&visitor(&format!("10.9.0.{i}")), t0()).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(c) => {
                    assert_eq!(c.code, "ONLY");
                    winners += 1;
                }
                Err(AppError::ClaimConflict) | Err(AppError::NoCouponsAvailable) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(winners, 1);

        let all = store.list_all(CouponOrder::Rotation).await.unwrap();
        assert!(all[0].is_used);
        assert_eq!(all[0].claimed_by.len(), 1);
    }

    #[tokio::test]
    async fn test_same_identity_never_reselects_claimed_coupon() {
        let (service, store) = service_with(vec![coupon(1, "A")]);
        let x = visitor("10.0.0.1");
        service.claim(&x, t0()).await.unwrap();

        // 管理员无法把券改回未使用; 即使冷却期已过, 也不会再选中 A
        let later = t0() + Duration::days(2);
        let err = service.claim(&x, later).await.unwrap_err();
        assert!(matches!(err, AppError::NoCouponsAvailable));
        assert!(store.find_eligible_candidate(&x.ip, later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_available_count_is_read_only() {
        let mut inactive = coupon(3, "OFF");
        inactive.is_active = false;
        let (service, _) = service_with(vec![coupon(1, "A"), coupon(2, "B"), inactive]);

        assert_eq!(service.available_count(t0()).await.unwrap(), 2);
        assert_eq!(service.available_count(t0()).await.unwrap(), 2);

        service.claim(&visitor("10.0.0.1"), t0()).await.unwrap();
        assert_eq!(service.available_count(t0()).await.unwrap(), 1);
    }

    /// 前 N 次条件写总是失败的存储, 模拟并发竞争
    struct ContendedStore {
        inner: MemoryCouponStore,
        lose_first: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl CouponStore for ContendedStore {
        async fn find_eligible_candidate(
            &self,
            claimant_ip: &str,
            now: DateTime<Utc>,
        ) -> AppResult<Option<Coupon>> {
            self.inner.find_eligible_candidate(claimant_ip, now).await
        }

        async fn conditional_mark_used(
            &self,
            id: i64,
            claim: ClaimRecord,
        ) -> AppResult<Option<Coupon>> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.lose_first {
                return Ok(None);
            }
            self.inner.conditional_mark_used(id, claim).await
        }

        async fn insert(&self, coupon: NewCoupon) -> AppResult<Coupon> {
            self.inner.insert(coupon).await
        }

        async fn update(&self, id: i64, patch: CouponPatch) -> AppResult<Option<Coupon>> {
            self.inner.update(id, patch).await
        }

        async fn list_all(&self, order: CouponOrder) -> AppResult<Vec<Coupon>> {
            self.inner.list_all(order).await
        }

        async fn latest_claim_at(&self, ip: &str) -> AppResult<Option<DateTime<Utc>>> {
            self.inner.latest_claim_at(ip).await
        }

        async fn count_available(&self, now: DateTime<Utc>) -> AppResult<u64> {
            self.inner.count_available(now).await
        }

        async fn list_claimed(&self) -> AppResult<Vec<Coupon>> {
            self.inner.list_claimed().await
        }
    }

    fn contended(lose_first: u32) -> (ClaimService, Arc<ContendedStore>) {
        let store = Arc::new(ContendedStore {
            inner: MemoryCouponStore::with_coupons(vec![coupon(1, "A")]),
            lose_first,
            attempts: AtomicU32::new(0),
        });
        (ClaimService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_conflict_is_reported_without_retry() {
        let (service, store) = contended(1);
        let err = service.claim(&visitor("10.0.0.1"), t0()).await.unwrap_err();
        assert!(matches!(err, AppError::ClaimConflict));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_claim_with_retries_reruns_selection() {
        let (service, store) = contended(2);
        let claimed = service
            .claim_with_retries(&visitor("10.0.0.1"), t0(), 2)
            .await
            .unwrap();
        assert_eq!(claimed.code, "A");
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);

        let (service, _) = contended(5);
        let err = service
            .claim_with_retries(&visitor("10.0.0.1"), t0(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ClaimConflict));
    }
}
