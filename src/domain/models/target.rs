// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::utils::url_utils;

/// 爬取目标
///
/// 覆盖种子URL与爬取过程中发现的链接；两者的区别仅在于深度，
/// 种子目标深度为1。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTarget {
    /// 绝对URL，scheme限定为http/https
    pub url: Url,
    /// 距种子的链接跳数，种子为1
    pub depth: u32,
    /// 种子所在域名，用于外链过滤
    pub origin_domain: String,
}

impl CrawlTarget {
    /// 从种子URL创建深度为1的目标
    pub fn seed(url: Url) -> Self {
        let origin_domain = url_utils::get_domain(&url);
        Self {
            url,
            depth: 1,
            origin_domain,
        }
    }

    /// 创建从本目标页面发现的下一层目标
    pub fn child(&self, url: Url) -> Self {
        Self {
            url,
            depth: self.depth + 1,
            origin_domain: self.origin_domain.clone(),
        }
    }
}

/// 媒体类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// 图片资源
    Image,
    /// 视频资源
    Video,
    /// 页面正文文本
    Text,
    /// 无法从扩展名判断的资源，下载后按魔数嗅探归类
    Other,
}

impl MediaType {
    /// 分类子目录名
    pub fn subdir(&self) -> &'static str {
        match self {
            MediaType::Image => "images",
            MediaType::Video => "videos",
            MediaType::Text => "text",
            MediaType::Other => "other",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MediaType::Image => write!(f, "image"),
            MediaType::Video => write!(f, "video"),
            MediaType::Text => write!(f, "text"),
            MediaType::Other => write!(f, "other"),
        }
    }
}

impl FromStr for MediaType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            "text" => Ok(MediaType::Text),
            "other" => Ok(MediaType::Other),
            _ => Err(()),
        }
    }
}

/// 页面中发现的媒体引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaReference {
    /// 媒体资源的绝对URL
    pub url: Url,
    /// 按扩展名或声明类型推断的媒体类型
    pub media_type: MediaType,
    /// 引用该资源的页面URL
    pub source_page: Url,
}

/// 已持久化内容的记录
///
/// 由去重索引持有，生命周期与一次爬取运行一致
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    /// 来源域名
    pub domain: String,
    /// 媒体类型
    pub media_type: MediaType,
    /// 落盘路径
    pub local_path: PathBuf,
    /// 内容的SHA-256哈希（十六进制）
    pub content_hash: String,
    /// 字节数
    pub byte_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_target_depth_and_domain() {
        let url = Url::parse("https://Example.com/start").unwrap();
        let target = CrawlTarget::seed(url);
        assert_eq!(target.depth, 1);
        assert_eq!(target.origin_domain, "example.com");
    }

    #[test]
    fn test_child_increments_depth() {
        let seed = CrawlTarget::seed(Url::parse("https://example.com/").unwrap());
        let child = seed.child(Url::parse("https://example.com/next").unwrap());
        assert_eq!(child.depth, 2);
        assert_eq!(child.origin_domain, "example.com");
    }

    #[test]
    fn test_media_type_roundtrip() {
        for t in [
            MediaType::Image,
            MediaType::Video,
            MediaType::Text,
            MediaType::Other,
        ] {
            assert_eq!(t.to_string().parse::<MediaType>().unwrap(), t);
        }
    }
}
