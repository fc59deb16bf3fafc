// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::{HashSet, VecDeque};
use tracing::trace;

use crate::domain::models::target::CrawlTarget;
use crate::utils::url_utils;

/// 目标入队的判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// 已加入边界
    Enqueued,
    /// 本次运行已调度过该URL
    AlreadyVisited,
    /// 深度超出预算
    DepthExceeded,
    /// 外链且未开启外链跟随
    ExternalSkipped,
    /// 非HTTP(S)地址
    NotCrawlable,
}

/// 爬取边界
///
/// 深度受限的广度优先队列加访问集合。FIFO顺序配合
/// “子链接统一入队在depth+1”的纪律，保证第N层全部出队完毕
/// 之后才会轮到第N+1层。每个作业独占一个边界实例。
pub struct Frontier {
    queue: VecDeque<CrawlTarget>,
    visited: HashSet<String>,
    max_depth: u32,
    follow_external_links: bool,
}

impl Frontier {
    /// 创建新的爬取边界
    pub fn new(max_depth: u32, follow_external_links: bool) -> Self {
        Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            max_depth,
            follow_external_links,
        }
    }

    /// 尝试将目标加入边界
    ///
    /// 访问集合在入队时更新，同一URL每次运行最多调度一次。
    /// 被拒绝的目标不占用任何后续资源。
    pub fn push(&mut self, target: CrawlTarget) -> PushOutcome {
        if !url_utils::is_crawlable(&target.url) {
            return PushOutcome::NotCrawlable;
        }
        if target.depth > self.max_depth {
            trace!(url = %target.url, depth = target.depth, "depth budget exhausted");
            return PushOutcome::DepthExceeded;
        }
        if !self.follow_external_links && url_utils::is_external(&target.url, &target.origin_domain)
        {
            trace!(url = %target.url, "external link skipped");
            return PushOutcome::ExternalSkipped;
        }

        let key = url_utils::normalize_url(&target.url).to_string();
        if !self.visited.insert(key) {
            return PushOutcome::AlreadyVisited;
        }

        self.queue.push_back(target);
        PushOutcome::Enqueued
    }

    /// 取出下一个目标
    pub fn pop(&mut self) -> Option<CrawlTarget> {
        self.queue.pop_front()
    }

    /// 边界中剩余的目标数
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// 边界是否已排空
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// 本次运行已调度过的URL数
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn target(url: &str, depth: u32) -> CrawlTarget {
        CrawlTarget {
            url: Url::parse(url).unwrap(),
            depth,
            origin_domain: "example.com".to_string(),
        }
    }

    #[test]
    fn test_bfs_ordering() {
        let mut frontier = Frontier::new(3, false);
        frontier.push(target("https://example.com/a", 1));
        frontier.push(target("https://example.com/b", 1));
        frontier.push(target("https://example.com/a/x", 2));

        assert_eq!(frontier.pop().unwrap().url.path(), "/a");
        assert_eq!(frontier.pop().unwrap().url.path(), "/b");
        assert_eq!(frontier.pop().unwrap().url.path(), "/a/x");
        assert!(frontier.pop().is_none());
    }

    #[test]
    fn test_depth_budget_enforced() {
        let mut frontier = Frontier::new(1, false);
        assert_eq!(
            frontier.push(target("https://example.com/", 1)),
            PushOutcome::Enqueued
        );
        assert_eq!(
            frontier.push(target("https://example.com/deep", 2)),
            PushOutcome::DepthExceeded
        );
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_visited_prevents_cycles() {
        let mut frontier = Frontier::new(3, false);
        assert_eq!(
            frontier.push(target("https://example.com/loop", 1)),
            PushOutcome::Enqueued
        );
        assert_eq!(
            frontier.push(target("https://example.com/loop", 2)),
            PushOutcome::AlreadyVisited
        );
        // fragment变体归并为同一访问记录
        assert_eq!(
            frontier.push(target("https://example.com/loop#sec", 2)),
            PushOutcome::AlreadyVisited
        );
    }

    #[test]
    fn test_external_links_filtered() {
        let mut frontier = Frontier::new(3, false);
        assert_eq!(
            frontier.push(target("https://other.org/page", 2)),
            PushOutcome::ExternalSkipped
        );

        let mut open = Frontier::new(3, true);
        assert_eq!(
            open.push(target("https://other.org/page", 2)),
            PushOutcome::Enqueued
        );
    }
}
