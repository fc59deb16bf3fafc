// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use reqwest::{redirect, Client, Response, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::settings::Settings;
use crate::utils::errors::FetchError;
use crate::utils::retry_policy::RetryPolicy;

/// 抓取到的页面
#[derive(Debug)]
pub struct FetchedPage {
    /// HTTP状态码
    pub status: u16,
    /// 响应头
    pub headers: HashMap<String, String>,
    /// 解码后的响应体
    pub body: String,
    /// 跟随重定向后的最终URL
    pub final_url: Url,
    /// Content-Type头
    pub content_type: String,
}

impl FetchedPage {
    /// 响应是否为HTML页面
    pub fn is_html(&self) -> bool {
        self.content_type.starts_with("text/html")
            || self.content_type.starts_with("application/xhtml")
    }
}

/// HTTP抓取引擎
///
/// 所有请求复用同一个客户端：统一的User-Agent、超时与重定向上限。
/// 瞬时失败（连接错误、5xx、429）按指数退避重试，
/// Retry-After头存在时优先于计算出的退避时间。
pub struct Fetcher {
    client: Client,
    retry_policy: RetryPolicy,
}

impl Fetcher {
    /// 根据配置创建抓取引擎
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout())
            .redirect(redirect::Policy::limited(settings.max_redirects))
            .build()?;

        Ok(Self {
            client,
            retry_policy: RetryPolicy::from_settings(
                settings.max_retries,
                settings.retry_backoff_seed(),
            ),
        })
    }

    /// 共享底层HTTP客户端（robots检查器复用）
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// 抓取页面并解码响应体
    pub async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self.fetch_with_retry(url).await?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        let mut headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(v_str) = v.to_str() {
                headers.insert(k.as_str().to_string(), v_str.to_string());
            }
        }

        let body = response.text().await.map_err(|e| FetchError::Transient {
            url: url.to_string(),
            reason: format!("failed to read body: {}", e),
            retry_after_secs: None,
        })?;

        Ok(FetchedPage {
            status,
            headers,
            body,
            final_url,
            content_type,
        })
    }

    /// 抓取用于分块流式读取的响应
    ///
    /// 返回时状态已校验，调用方通过`bytes_stream`消费响应体
    pub async fn fetch_stream(&self, url: &Url) -> Result<Response, FetchError> {
        self.fetch_with_retry(url).await
    }

    /// 带重试的请求执行
    async fn fetch_with_retry(&self, url: &Url) -> Result<Response, FetchError> {
        let mut attempt: u32 = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && self.retry_policy.should_retry(attempt) => {
                    attempt += 1;
                    // Retry-After覆盖计算出的退避时间
                    let backoff = err
                        .retry_after_secs()
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.retry_policy.calculate_backoff(attempt));
                    warn!(
                        url = %url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// 单次请求与响应分类
    async fn fetch_once(&self, url: &Url) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %url, status = status.as_u16(), "fetched");
            return Ok(response);
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(FetchError::Transient {
                url: url.to_string(),
                reason: format!("http status {}", status),
                retry_after_secs,
            });
        }

        // 非429的4xx和其余状态码都是永久失败
        Err(FetchError::Permanent {
            url: url.to_string(),
            reason: format!("http status {}", status),
        })
    }
}

/// 将reqwest错误归入错误分类
fn classify_request_error(url: &Url, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_redirect() {
        FetchError::TooManyRedirects {
            url: url.to_string(),
        }
    } else if err.is_connect() {
        FetchError::Transient {
            url: url.to_string(),
            reason: format!("connection error: {}", err),
            retry_after_secs: None,
        }
    } else {
        // DNS解析、TLS握手和请求构造错误不重试
        FetchError::Permanent {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
