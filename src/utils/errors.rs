// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::path::PathBuf;
use thiserror::Error;

/// 抓取错误类型
///
/// 区分可重试的瞬时错误与不可重试的永久错误。
/// 分类决定抓取引擎的重试行为：瞬时错误按退避策略重试，
/// 永久错误立即记录失败。
#[derive(Error, Debug)]
pub enum FetchError {
    /// 瞬时网络错误（连接失败、5xx、429），可重试
    #[error("transient fetch error for {url}: {reason}")]
    Transient {
        url: String,
        reason: String,
        /// 服务端通过Retry-After建议的等待时间（秒）
        retry_after_secs: Option<u64>,
    },

    /// 永久抓取错误（非429的4xx、DNS/TLS失败、畸形URL），不可重试
    #[error("permanent fetch error for {url}: {reason}")]
    Permanent { url: String, reason: String },

    /// 单次请求超时，按瞬时错误处理
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// 重定向跳数超过上限
    #[error("too many redirects fetching {url}")]
    TooManyRedirects { url: String },
}

impl FetchError {
    /// 错误是否可以重试
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. } | FetchError::Timeout { .. })
    }

    /// 服务端建议的重试等待时间（仅瞬时错误携带）
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            FetchError::Transient {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// 下载错误类型
#[derive(Error, Debug)]
pub enum DownloadError {
    /// 底层抓取失败
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// 文件大小超过该类型的限制，部分输出已丢弃
    #[error("size limit exceeded for {url}: streamed {received} bytes, limit {limit}")]
    SizeLimitExceeded {
        url: String,
        received: u64,
        limit: u64,
    },

    /// 本地文件IO错误
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 作业已取消，传输在检查点停止
    #[error("download of {url} cancelled")]
    Cancelled { url: String },
}

/// 爬取作业的致命前置条件错误
///
/// 仅在作业开始前出现；单个页面或下载的失败
/// 不会产生此类错误，而是计入作业错误统计。
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// 配置校验失败
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// 没有可用的种子URL
    #[error("no valid seed urls provided")]
    NoSeedUrls,

    /// 输出目录不可写
    #[error("output directory {path} is not writable: {reason}")]
    OutputDirUnwritable { path: PathBuf, reason: String },
}
