// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// 域名级请求限速器
///
/// 保证对同一域名的相邻请求之间至少间隔配置的延迟。
/// 延迟是下限而非精确间隔：调用方在拿到槽位前会被挂起，
/// 但不保证挂起结束后立即发出请求。
pub struct DomainRateLimiter {
    /// 各域名下一个可用槽位的时间点
    next_slot: DashMap<String, Instant>,
    /// 域名级延迟覆盖（来自robots.txt的Crawl-delay）
    overrides: DashMap<String, Duration>,
    /// 默认最小请求间隔
    delay: Duration,
}

impl DomainRateLimiter {
    /// 创建新的限速器实例
    pub fn new(delay: Duration) -> Self {
        Self {
            next_slot: DashMap::new(),
            overrides: DashMap::new(),
            delay,
        }
    }

    /// 为域名设置延迟下限覆盖
    ///
    /// 实际延迟取配置值与覆盖值中的较大者
    pub fn set_domain_floor(&self, domain: &str, floor: Duration) {
        if floor > self.delay {
            self.overrides.insert(domain.to_lowercase(), floor);
        }
    }

    /// 等待该域名的下一个请求槽位
    ///
    /// 多个工作器并发调用时，每个调用者预约到互不重叠的槽位
    pub async fn wait_for_slot(&self, domain: &str) {
        let domain = domain.to_lowercase();
        let delay = self
            .overrides
            .get(&domain)
            .map(|d| (*d).max(self.delay))
            .unwrap_or(self.delay);

        if delay.is_zero() {
            return;
        }

        // 在map条目的锁内预约槽位，避免两个工作器抢到同一时段
        let wait = {
            let mut entry = self.next_slot.entry(domain.clone()).or_insert_with(|| {
                Instant::now()
                    .checked_sub(delay)
                    .unwrap_or_else(Instant::now)
            });
            let now = Instant::now();
            let earliest = (*entry + delay).max(now);
            *entry = earliest;
            earliest - now
        };

        if !wait.is_zero() {
            trace!(domain = %domain, wait_ms = wait.as_millis() as u64, "rate limit wait");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enforces_minimum_spacing() {
        let limiter = DomainRateLimiter::new(Duration::from_millis(50));

        let start = Instant::now();
        limiter.wait_for_slot("example.com").await;
        limiter.wait_for_slot("example.com").await;
        limiter.wait_for_slot("example.com").await;

        // 第一个槽位立即可用，后两个各间隔50ms
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_domains_are_independent() {
        let limiter = DomainRateLimiter::new(Duration::from_millis(200));

        let start = Instant::now();
        limiter.wait_for_slot("a.example.com").await;
        limiter.wait_for_slot("b.example.com").await;

        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_zero_delay_never_blocks() {
        let limiter = DomainRateLimiter::new(Duration::ZERO);

        let start = Instant::now();
        for _ in 0..10 {
            limiter.wait_for_slot("example.com").await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_crawl_delay_floor_applies() {
        let limiter = DomainRateLimiter::new(Duration::from_millis(10));
        limiter.set_domain_floor("slow.example.com", Duration::from_millis(80));

        let start = Instant::now();
        limiter.wait_for_slot("slow.example.com").await;
        limiter.wait_for_slot("slow.example.com").await;

        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
