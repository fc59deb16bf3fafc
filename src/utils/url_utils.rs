// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use url::{ParseError, Url};

/// 匹配大概率不含可下载内容的URL
static NON_CONTENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(/api/|/ajax/|\.json$|\.xml$|\.css$|\.js$|/search\?|/login|/logout|/admin)")
        .expect("non-content pattern is valid")
});

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 规范化URL用于访问去重
///
/// 去除fragment，其余部分保持原样；
/// 相同页面的锚点变体由此归并为同一个访问记录
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}

/// 提取小写域名
pub fn get_domain(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_lowercase()
}

/// URL是否指向种子域之外
pub fn is_external(url: &Url, origin_domain: &str) -> bool {
    get_domain(url) != origin_domain.to_lowercase()
}

/// URL是否是可爬取的HTTP(S)地址
pub fn is_crawlable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// 判断URL是否大概率指向内容页面
///
/// 过滤API端点、静态资源和登录页等明显不含可下载内容的地址
pub fn is_likely_content_url(url: &Url) -> bool {
    !NON_CONTENT_PATTERN.is_match(url.as_str())
}

/// 解析种子URL，拒绝非HTTP(S)或畸形地址
pub fn parse_seed(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    if is_crawlable(&url) && url.host_str().is_some() {
        Some(normalize_url(&url))
    } else {
        None
    }
}
