//! 领取规则 (纯函数, 无副作用)
//!
//! 冷却期与单券排重都只按 IP 判断; 会话令牌仅随领取记录保存。

use crate::models::{ClaimantIdentity, Coupon};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;

/// 同一 IP 两次领取之间的冷却期 (小时)
pub const COOLDOWN_HOURS: i64 = 24;

pub fn cooldown_window() -> Duration {
    Duration::hours(COOLDOWN_HOURS)
}

/// 最近一次成功领取仍在冷却窗口内
pub fn is_in_cooldown(last_claim_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_claim_at {
        Some(at) => at > now - cooldown_window(),
        None => false,
    }
}

/// 冷却剩余时长 (不在冷却期为 0)
pub fn time_remaining(last_claim_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let remaining = cooldown_window() - (now - last_claim_at);
    remaining.max(Duration::zero())
}

/// 剩余小时数, 向上取整; 冷却期内至少为 1
pub fn hours_left(last_claim_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = time_remaining(last_claim_at, now).num_milliseconds();
    let hour = Duration::hours(1).num_milliseconds();
    ((millis + hour - 1) / hour).max(1)
}

/// 券本身可被领取 (与领取者无关): 启用、未使用、未过期
pub fn is_claimable(coupon: &Coupon, now: DateTime<Utc>) -> bool {
    coupon.is_active && !coupon.is_used && coupon.expiry_date > now
}

/// 券对该领取者可领取
pub fn is_eligible(coupon: &Coupon, identity: &ClaimantIdentity, now: DateTime<Utc>) -> bool {
    is_claimable(coupon, now) && !coupon.was_claimed_by_ip(&identity.ip)
}

/// 轮转顺序: last_claim_at 升序 (None 最前), created_at 升序, id 升序
pub fn rotation_order(a: &Coupon, b: &Coupon) -> Ordering {
    let last_claim = match (a.last_claim_at, b.last_claim_at) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    };
    last_claim
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap()
    }

    fn coupon(id: i64, last_claim_at: Option<DateTime<Utc>>, created_at: DateTime<Utc>) -> Coupon {
        Coupon {
            id,
            code: format!("CODE{id}"),
            description: "10% off".to_string(),
            is_active: true,
            expiry_date: t0() + Duration::days(1),
            is_used: false,
            last_claim_at,
            claimed_by: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_cooldown_window() {
        let claimed = t0();
        assert!(!is_in_cooldown(None, claimed));
        assert!(is_in_cooldown(Some(claimed), claimed));
        assert!(is_in_cooldown(
            Some(claimed),
            claimed + Duration::hours(23) + Duration::minutes(59)
        ));
        // 恰好 24 小时: claimed_at > now - 24h 不成立
        assert!(!is_in_cooldown(Some(claimed), claimed + Duration::hours(24)));
        assert!(!is_in_cooldown(
            Some(claimed),
            claimed + Duration::hours(24) + Duration::minutes(1)
        ));
    }

    #[test]
    fn test_hours_left_rounds_up() {
        let claimed = t0();
        assert_eq!(hours_left(claimed, claimed), 24);
        assert_eq!(hours_left(claimed, claimed + Duration::minutes(1)), 24);
        assert_eq!(hours_left(claimed, claimed + Duration::hours(1)), 23);
        assert_eq!(
            hours_left(claimed, claimed + Duration::hours(23) + Duration::minutes(59)),
            1
        );
        assert_eq!(
            time_remaining(claimed, claimed + Duration::hours(25)),
            Duration::zero()
        );
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let now = t0();
        let mut c = coupon(1, None, now - Duration::days(1));
        let identity = ClaimantIdentity::new("10.0.0.1", None);

        c.expiry_date = now;
        assert!(!is_eligible(&c, &identity, now));

        c.expiry_date = now + Duration::milliseconds(1);
        assert!(is_eligible(&c, &identity, now));
    }

    #[test]
    fn test_inactive_or_used_is_not_eligible() {
        let now = t0();
        let identity = ClaimantIdentity::new("10.0.0.1", None);

        let mut inactive = coupon(1, None, now);
        inactive.is_active = false;
        assert!(!is_eligible(&inactive, &identity, now));

        let mut used = coupon(2, None, now);
        used.is_used = true;
        assert!(!is_eligible(&used, &identity, now));
    }

    #[test]
    fn test_same_ip_excluded_regardless_of_session() {
        let now = t0();
        let mut c = coupon(1, None, now);
        c.claimed_by.push(crate::models::ClaimRecord {
            ip: "10.0.0.1".to_string(),
            session_id: Some("a".to_string()),
            claimed_at: now - Duration::days(3),
        });

        let same_ip = ClaimantIdentity::new("10.0.0.1", Some("b".to_string()));
        let other_ip = ClaimantIdentity::new("10.0.0.2", Some("a".to_string()));
        assert!(!is_eligible(&c, &same_ip, now));
        assert!(is_eligible(&c, &other_ip, now));
    }

    #[test]
    fn test_rotation_order_prefers_never_claimed() {
        let t1 = t0();
        let t2 = t0() + Duration::hours(1);
        let created = t0() - Duration::days(2);

        let mut list = vec![
            coupon(1, Some(t2), created),
            coupon(2, Some(t1), created),
            coupon(3, None, created + Duration::days(1)),
        ];
        list.sort_by(rotation_order);
        let ids: Vec<i64> = list.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_rotation_order_ties_on_created_at() {
        let t1 = t0();
        let older = coupon(7, Some(t1), t0() - Duration::days(2));
        let newer = coupon(3, Some(t1), t0() - Duration::days(1));
        assert_eq!(rotation_order(&older, &newer), Ordering::Less);
        assert_eq!(rotation_order(&newer, &older), Ordering::Greater);
    }
}
