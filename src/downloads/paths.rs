// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use url::Url;

use crate::domain::models::target::MediaType;
use crate::utils::url_utils;

/// 文件名最大长度
const MAX_FILENAME_LEN: usize = 255;

/// 文件系统非法字符
static INVALID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("invalid-chars pattern is valid"));

/// 清理文件名以兼容文件系统
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned = INVALID_CHARS.replace_all(filename, "_");
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ' ');

    if cleaned.is_empty() {
        return "unnamed".to_string();
    }

    if cleaned.len() > MAX_FILENAME_LEN {
        // 截断时保留扩展名
        match cleaned.rsplit_once('.') {
            Some((stem, ext)) if ext.len() + 1 < MAX_FILENAME_LEN => {
                let keep = MAX_FILENAME_LEN - ext.len() - 1;
                return format!("{}.{}", truncate_at_boundary(stem, keep), ext);
            }
            _ => return truncate_at_boundary(cleaned, MAX_FILENAME_LEN).to_string(),
        }
    }

    cleaned.to_string()
}

/// 在字符边界上按字节数截断
fn truncate_at_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// 从URL推导文件名主干和扩展名
///
/// 路径为空时回退到`<domain>_page`
pub fn filename_from_url(url: &Url) -> (String, String) {
    let path = url.path();
    let basename = path.rsplit('/').next().unwrap_or_default();

    if basename.is_empty() {
        return (
            sanitize_filename(&format!("{}_page", url_utils::get_domain(url))),
            String::new(),
        );
    }

    match basename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (
            sanitize_filename(stem),
            sanitize_filename(&ext.to_lowercase()),
        ),
        _ => (sanitize_filename(basename), String::new()),
    }
}

/// 在目录中生成不冲突的文件路径
///
/// 命名冲突以数字后缀解决；后缀耗尽后回退到哈希命名
pub fn unique_path(directory: &Path, stem: &str, extension: &str) -> PathBuf {
    let ext_suffix = if extension.is_empty() {
        String::new()
    } else {
        format!(".{}", extension.trim_start_matches('.'))
    };

    let candidate = directory.join(format!("{}{}", stem, ext_suffix));
    if !candidate.exists() {
        return candidate;
    }

    for counter in 1..=9999u32 {
        let candidate = directory.join(format!("{}_{}{}", stem, counter, ext_suffix));
        if !candidate.exists() {
            return candidate;
        }
    }

    // 兜底：哈希命名避免无限循环
    let digest = Sha256::digest(format!("{}{}", stem, ext_suffix).as_bytes());
    directory.join(format!("{}_{}{}", stem, &hex::encode(digest)[..8], ext_suffix))
}

/// 按魔数嗅探媒体类型
///
/// 用于扩展名无法分类的引用；返回嗅探出的类型与对应扩展名
pub fn sniff_media_type(first_bytes: &[u8]) -> Option<(MediaType, &'static str)> {
    if first_bytes.len() < 12 {
        return None;
    }

    match first_bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some((MediaType::Image, "jpg")),
        [0x89, b'P', b'N', b'G', ..] => Some((MediaType::Image, "png")),
        [b'G', b'I', b'F', b'8', ..] => Some((MediaType::Image, "gif")),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
            Some((MediaType::Image, "webp"))
        }
        // EBML头覆盖webm与mkv
        [0x1A, 0x45, 0xDF, 0xA3, ..] => Some((MediaType::Video, "webm")),
        // MP4家族：ftyp box位于偏移4
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some((MediaType::Video, "mp4")),
        _ => sniff_svg(first_bytes),
    }
}

/// 嗅探SVG文档
///
/// SVG是文本格式没有魔数；媒体标签引用的XML负载实际上就是SVG
fn sniff_svg(first_bytes: &[u8]) -> Option<(MediaType, &'static str)> {
    let head = first_bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| &first_bytes[start..])?;
    if head.starts_with(b"<svg") || head.starts_with(b"<?xml") {
        Some((MediaType::Image, "svg"))
    } else {
        None
    }
}
