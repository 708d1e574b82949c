use crate::config::RateLimitConfig;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// 领取接口的滑动窗口限流 (按 IP)
#[derive(Clone)]
pub struct ClaimRateLimiter {
    max_requests: u32,
    window: Duration,
    hits: Arc<Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>>,
}

impl ClaimRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::seconds(config.window_secs),
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 记录一次请求; 超出窗口配额返回 RateLimited
    pub async fn check(&self, key: &str, now: DateTime<Utc>) -> AppResult<()> {
        let mut hits = self.hits.lock().await;

        // 顺便清理所有已过期的 key
        let window_start = now - self.window;
        hits.retain(|_, q| {
            while q.front().is_some_and(|t| *t <= window_start) {
                q.pop_front();
            }
            !q.is_empty()
        });

        let queue = hits.entry(key.to_string()).or_default();
        if queue.len() as u32 >= self.max_requests {
            let retry_after = queue
                .front()
                .map(|oldest| (*oldest + self.window - now).num_seconds())
                .unwrap_or(0)
                .max(1);
            return Err(AppError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        queue.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limiter(max_requests: u32, window_secs: i64) -> ClaimRateLimiter {
        ClaimRateLimiter::new(&RateLimitConfig {
            max_requests,
            window_secs,
        })
    }

    #[tokio::test]
    async fn test_blocks_after_max_requests() {
        let limiter = limiter(3, 86_400);
        let now = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();

        for _ in 0..3 {
            limiter.check("10.0.0.1", now).await.unwrap();
        }
        let err = limiter.check("10.0.0.1", now).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::RateLimited {
                retry_after_secs: 86_400
            }
        ));

        // 其它 IP 独立计数
        limiter.check("10.0.0.2", now).await.unwrap();
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = limiter(2, 60);
        let start = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();

        limiter.check("ip", start).await.unwrap();
        limiter
            .check("ip", start + Duration::seconds(30))
            .await
            .unwrap();
        assert!(
            limiter
                .check("ip", start + Duration::seconds(45))
                .await
                .is_err()
        );

        // 第一条记录滑出窗口
        limiter
            .check("ip", start + Duration::seconds(61))
            .await
            .unwrap();
    }
}
