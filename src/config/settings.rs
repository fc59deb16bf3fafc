// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::models::target::MediaType;

/// 应用程序配置设置
///
/// 包含输出、并发、媒体过滤、爬取深度与重试等所有配置项。
/// 大小限制以MiB为单位，0表示不限制。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// 下载内容的根输出目录
    pub output_dir: PathBuf,
    /// 请求使用的User-Agent
    pub user_agent: String,
    /// 工作器池大小，同时约束页面抓取与媒体下载
    pub max_workers: usize,
    /// 同一域名相邻请求的最小间隔（秒）
    pub delay_between_requests: f64,

    /// 是否下载图片
    pub download_images: bool,
    /// 是否下载视频
    pub download_videos: bool,
    /// 是否保存页面正文文本
    pub download_text: bool,

    /// 识别为图片的扩展名集合
    pub image_extensions: Vec<String>,
    /// 识别为视频的扩展名集合
    pub video_extensions: Vec<String>,

    /// 未分类文件的大小上限（MiB，0=不限）
    pub max_file_size: u64,
    /// 图片大小上限（MiB，0=不限）
    pub max_image_size: u64,
    /// 视频大小上限（MiB，0=不限）
    pub max_video_size: u64,

    /// 最大爬取深度，种子为第1层
    pub max_depth: u32,
    /// 是否跟随种子域之外的链接
    pub follow_external_links: bool,
    /// 是否遵守robots.txt
    pub respect_robots_txt: bool,

    /// 瞬时错误的最大重试次数
    pub max_retries: u32,
    /// 重试退避的种子延迟（秒）
    pub retry_delay: f64,

    /// 单次网络请求的超时（秒）
    pub request_timeout: u64,
    /// 跟随重定向的最大跳数
    pub max_redirects: usize,

    /// 是否按域名组织输出目录
    pub organize_by_domain: bool,
    /// 是否按日期组织输出目录
    pub organize_by_date: bool,
    /// 是否按媒体类型创建子目录
    pub create_subdirs_for_types: bool,

    /// 日志级别
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        // 与配置加载路径保持同一组默认值
        Self::load(None).expect("built-in defaults are valid")
    }
}

impl Settings {
    /// 加载配置
    ///
    /// 优先级从低到高：内置默认值 → `config/default.yaml` →
    /// 显式指定的配置文件 → `SCRAPRS__`前缀的环境变量
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("output_dir", "./scraped")?
            .set_default("user_agent", "scraprs/0.1.0")?
            .set_default("max_workers", 5)?
            .set_default("delay_between_requests", 1.0)?
            .set_default("download_images", true)?
            .set_default("download_videos", true)?
            .set_default("download_text", true)?
            .set_default(
                "image_extensions",
                vec!["jpg", "jpeg", "png", "gif", "webp", "svg"],
            )?
            .set_default("video_extensions", vec!["mp4", "webm", "avi", "mov", "mkv"])?
            .set_default("max_file_size", 100)?
            .set_default("max_image_size", 50)?
            .set_default("max_video_size", 500)?
            .set_default("max_depth", 1)?
            .set_default("follow_external_links", false)?
            .set_default("respect_robots_txt", true)?
            .set_default("max_retries", 3)?
            .set_default("retry_delay", 2.0)?
            .set_default("request_timeout", 30)?
            .set_default("max_redirects", 10)?
            .set_default("organize_by_domain", true)?
            .set_default("organize_by_date", false)?
            .set_default("create_subdirs_for_types", true)?
            .set_default("log_level", "INFO")?
            .add_source(File::with_name("config/default").required(false));

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::with_prefix("SCRAPRS").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// 校验配置值
    ///
    /// 汇总所有问题后一次性返回可读的错误信息
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.max_workers < 1 {
            errors.push("max_workers must be at least 1".to_string());
        }
        if self.max_depth < 1 {
            errors.push("max_depth must be at least 1".to_string());
        }
        if self.delay_between_requests < 0.0 {
            errors.push("delay_between_requests cannot be negative".to_string());
        }
        if self.retry_delay < 0.0 {
            errors.push("retry_delay cannot be negative".to_string());
        }
        if self.request_timeout == 0 {
            errors.push("request_timeout must be positive".to_string());
        }

        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.log_level.to_uppercase().as_str()) {
            errors.push(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    /// 域名级的最小请求间隔
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_between_requests.max(0.0))
    }

    /// 重试退避的种子延迟
    pub fn retry_backoff_seed(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay.max(0.0))
    }

    /// 单次请求超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// 扩展名是否为受支持的图片格式
    pub fn is_supported_image(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.image_extensions.iter().any(|e| e.to_lowercase() == ext)
    }

    /// 扩展名是否为受支持的视频格式
    pub fn is_supported_video(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.video_extensions.iter().any(|e| e.to_lowercase() == ext)
    }

    /// 该媒体类型是否开启下载
    pub fn should_download(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Image => self.download_images,
            MediaType::Video => self.download_videos,
            MediaType::Text => self.download_text,
            // 未分类的引用在嗅探归类前按总开关处理
            MediaType::Other => self.download_images || self.download_videos,
        }
    }

    /// 该媒体类型的大小上限（字节，0=不限）
    pub fn size_limit_bytes(&self, media_type: MediaType) -> u64 {
        const MIB: u64 = 1024 * 1024;
        match media_type {
            MediaType::Image if self.max_image_size > 0 => self.max_image_size * MIB,
            MediaType::Video if self.max_video_size > 0 => self.max_video_size * MIB,
            _ => self.max_file_size * MIB,
        }
    }

    /// 该域名内容的基础输出路径
    pub fn output_path(&self, domain: &str) -> PathBuf {
        let mut base = self.output_dir.clone();
        if self.organize_by_domain && !domain.is_empty() {
            base.push(domain);
        }
        if self.organize_by_date {
            base.push(chrono::Utc::now().format("%Y-%m-%d").to_string());
        }
        base
    }

    /// 媒体类型在基础路径下的落盘目录
    pub fn content_path(&self, base: &Path, media_type: MediaType) -> PathBuf {
        if self.create_subdirs_for_types {
            base.join(media_type.subdir())
        } else {
            base.to_path_buf()
        }
    }
}
