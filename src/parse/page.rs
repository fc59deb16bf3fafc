// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scraper::{Html, Node, Selector};
use std::collections::HashSet;
use url::Url;

use crate::config::settings::Settings;
use crate::domain::models::target::{MediaReference, MediaType};
use crate::utils::text_processing::clean_text_content;
use crate::utils::url_utils;

/// 页面解析结果
#[derive(Debug, Default)]
pub struct ParsedPage {
    /// 页面中发现的可跟随链接
    pub links: Vec<Url>,
    /// 页面引用的媒体资源
    pub media: Vec<MediaReference>,
    /// 清理后的正文文本
    pub text: String,
}

/// 页面解析器
///
/// 从HTML提取链接、媒体引用和规范化正文。
/// 页面不产出任何内容时视为叶子节点而非错误。
pub struct PageParser {
    image_extensions: Vec<String>,
    video_extensions: Vec<String>,
    collect_images: bool,
    collect_videos: bool,
}

impl PageParser {
    /// 根据配置创建解析器
    pub fn new(settings: &Settings) -> Self {
        Self {
            image_extensions: settings.image_extensions.clone(),
            video_extensions: settings.video_extensions.clone(),
            collect_images: settings.download_images,
            collect_videos: settings.download_videos,
        }
    }

    /// 解析页面
    ///
    /// 相对引用以`base_url`为基准解析；无法解析的引用被静默丢弃
    pub fn parse(&self, html: &str, base_url: &Url) -> ParsedPage {
        let document = Html::parse_document(html);

        ParsedPage {
            links: self.extract_links(&document, base_url),
            media: self.extract_media(&document, base_url),
            text: extract_text(&document),
        }
    }

    /// 提取并过滤页面链接
    fn extract_links(&self, document: &Html, base_url: &Url) -> Vec<Url> {
        let selector = Selector::parse("a[href]").expect("anchor selector is valid");
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            // 忽略锚点、mailto和javascript链接
            if href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("javascript:")
            {
                continue;
            }

            let Ok(resolved) = url_utils::resolve_url(base_url, href) else {
                continue;
            };
            if !url_utils::is_crawlable(&resolved) {
                continue;
            }

            let normalized = url_utils::normalize_url(&resolved);
            if !url_utils::is_likely_content_url(&normalized) {
                continue;
            }
            if seen.insert(normalized.to_string()) {
                links.push(normalized);
            }
        }

        links
    }

    /// 提取媒体引用
    fn extract_media(&self, document: &Html, base_url: &Url) -> Vec<MediaReference> {
        let mut seen = HashSet::new();
        let mut media = Vec::new();

        if self.collect_images {
            let img_selector = Selector::parse("img").expect("img selector is valid");
            for element in document.select(&img_selector) {
                if let Some(src) = element.value().attr("src") {
                    self.push_media(&mut media, &mut seen, base_url, src, MediaType::Image);
                }
                // srcset中的每个候选地址都收集
                if let Some(srcset) = element.value().attr("srcset") {
                    for entry in srcset.split(',') {
                        if let Some(src) = entry.trim().split_whitespace().next() {
                            self.push_media(&mut media, &mut seen, base_url, src, MediaType::Image);
                        }
                    }
                }
            }
        }

        if self.collect_videos {
            let video_selector = Selector::parse("video").expect("video selector is valid");
            let source_selector =
                Selector::parse("video > source[src]").expect("source selector is valid");
            for element in document.select(&video_selector) {
                if let Some(src) = element.value().attr("src") {
                    self.push_media(&mut media, &mut seen, base_url, src, MediaType::Video);
                }
            }
            for element in document.select(&source_selector) {
                if let Some(src) = element.value().attr("src") {
                    self.push_media(&mut media, &mut seen, base_url, src, MediaType::Video);
                }
            }
        }

        media
    }

    fn push_media(
        &self,
        media: &mut Vec<MediaReference>,
        seen: &mut HashSet<String>,
        base_url: &Url,
        src: &str,
        declared: MediaType,
    ) {
        let Ok(resolved) = url_utils::resolve_url(base_url, src) else {
            return;
        };
        if !url_utils::is_crawlable(&resolved) {
            return;
        }
        let normalized = url_utils::normalize_url(&resolved);
        if !seen.insert(normalized.to_string()) {
            return;
        }

        let media_type = self.classify(&normalized, declared);
        media.push(MediaReference {
            url: normalized,
            media_type,
            source_page: base_url.clone(),
        });
    }

    /// 按扩展名分类媒体引用
    ///
    /// 扩展名命中已知集合时以扩展名为准；缺失或未知时回退到
    /// 标签声明的类型（`<img>`→图片，`<video>`→视频），
    /// 真实格式留待下载后按首块字节的魔数修正
    fn classify(&self, url: &Url, declared: MediaType) -> MediaType {
        if let Some(ext) = extension_of(url) {
            let matches = |set: &[String]| set.iter().any(|e| e.to_lowercase() == ext);
            if matches(&self.image_extensions) {
                return MediaType::Image;
            }
            if matches(&self.video_extensions) {
                return MediaType::Video;
            }
        }
        declared
    }
}

/// URL路径的小写扩展名
fn extension_of(url: &Url) -> Option<String> {
    let path = url.path();
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

/// 提取规范化正文
///
/// 跳过script/style/noscript下的文本节点，
/// 其余文本折叠空白后拼接，保证同一页面产出确定的字节序列
fn extract_text(document: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for node in document.tree.nodes() {
        if let Node::Text(text) = node.value() {
            let skip = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .map(|name| matches!(name, "script" | "style" | "noscript"))
                .unwrap_or(false);
            if !skip {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed);
                }
            }
        }
    }

    clean_text_content(&parts.join(" "))
}
