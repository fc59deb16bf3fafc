// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// robots.txt获取超时
const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Robots.txt检查器接口
#[async_trait]
pub trait RobotsCheckerTrait: Send + Sync {
    /// 检查URL是否被允许访问
    ///
    /// 失败时开放放行（fail-open）：无法获取或解析robots.txt
    /// 一律视为允许
    async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool;

    /// 获取该域名对此user agent声明的爬取延迟
    async fn get_crawl_delay(&self, url: &Url, user_agent: &str) -> Option<Duration>;
}

/// Robots.txt检查器
///
/// 按域名缓存robots.txt内容，每个域名每次运行只获取一次，
/// 获取失败不重试
pub struct RobotsChecker {
    /// HTTP客户端
    client: Client,
    /// 域名 -> robots.txt内容缓存
    cache: DashMap<String, String>,
}

#[async_trait]
impl RobotsCheckerTrait for RobotsChecker {
    async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        let content = self.get_robots_content(url).await;
        if content.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&content, user_agent, url.as_str())
    }

    async fn get_crawl_delay(&self, url: &Url, user_agent: &str) -> Option<Duration> {
        let content = self.get_robots_content(url).await;
        parse_crawl_delay(&content, user_agent)
    }
}

impl Default for RobotsChecker {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl RobotsChecker {
    /// 创建新的Robots检查器实例
    ///
    /// 复用调用方已配置好user agent的HTTP客户端
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: DashMap::new(),
        }
    }

    /// 获取robots.txt内容（带域名级缓存）
    ///
    /// 每个域名只尝试一次网络请求；任何失败都缓存为空内容，
    /// 空内容意味着全部允许
    async fn get_robots_content(&self, url: &Url) -> String {
        let Some(host) = url.host_str() else {
            return String::new();
        };
        // 非默认端口是不同的authority，robots.txt也要分开取
        let cache_key = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host.to_lowercase(), port),
            None => format!("{}://{}", url.scheme(), host.to_lowercase()),
        };

        if let Some(cached) = self.cache.get(&cache_key) {
            return cached.clone();
        }

        let robots_url = format!("{}/robots.txt", cache_key);
        let content = match self
            .client
            .get(&robots_url)
            .timeout(ROBOTS_FETCH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            Ok(resp) => {
                // 404意味着没有robots.txt；其他状态码同样开放放行
                debug!(url = %robots_url, status = %resp.status(), "robots.txt not available");
                String::new()
            }
            Err(e) => {
                warn!(url = %robots_url, error = %e, "failed to fetch robots.txt, allowing all");
                String::new()
            }
        };

        self.cache.insert(cache_key, content.clone());
        content
    }
}

/// 解析适用于该user agent的Crawl-delay指令
///
/// 简化实现：定位匹配的User-agent块并读取其中的Crawl-delay，
/// 特定agent的块优先于通配块
fn parse_crawl_delay(content: &str, user_agent: &str) -> Option<Duration> {
    let mut current_agent_matched = false;
    let mut specific_agent_found = false;
    let mut delay: Option<f64> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let lower_line = line.to_lowercase();
        if let Some(agent) = lower_line.strip_prefix("user-agent:") {
            let agent = agent.trim();
            if agent == "*" {
                current_agent_matched = !specific_agent_found;
            } else if user_agent.to_lowercase().contains(agent) {
                current_agent_matched = true;
                specific_agent_found = true;
                delay = None;
            } else {
                current_agent_matched = false;
            }
        } else if let Some(value) = lower_line.strip_prefix("crawl-delay:") {
            if current_agent_matched {
                if let Ok(d) = value.trim().parse::<f64>() {
                    if d >= 0.0 {
                        delay = Some(d);
                    }
                }
            }
        }
    }

    delay.map(Duration::from_secs_f64)
}
