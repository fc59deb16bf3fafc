// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::settings::Settings;
use crate::domain::models::download::{DownloadOutcome, DownloadTask};
use crate::domain::models::target::{ContentRecord, MediaType};
use crate::downloads::dedup::DuplicateIndex;
use crate::downloads::paths;
use crate::engines::fetcher::Fetcher;
use crate::utils::errors::DownloadError;
use crate::utils::rate_limit::DomainRateLimiter;
use crate::utils::url_utils;

/// 下载管理器
///
/// 在`max_workers`个信号量许可约束下并发执行下载任务。
/// 每个工作器：获取许可 → 等待域名限速槽位 → 分块流式写入临时文件
/// （绝不整体缓冲响应体）→ 边下边算滚动哈希并执行大小限制 →
/// 查询去重索引 → 新内容原子改名落盘，重复内容丢弃临时文件。
/// 单个任务失败不影响兄弟任务。
#[derive(Clone)]
pub struct DownloadManager {
    fetcher: Arc<Fetcher>,
    limiter: Arc<DomainRateLimiter>,
    dedup: Arc<DuplicateIndex>,
    settings: Arc<Settings>,
    permits: Arc<Semaphore>,
    /// 序列化“去重判定+命名+改名”的临界区，
    /// 防止并发工作器对同一哈希或同名文件互相踩踏
    finalize_lock: Arc<Mutex<()>>,
}

impl DownloadManager {
    /// 创建下载管理器
    ///
    /// `permits`与页面抓取共享，统一约束作业的并发度
    pub fn new(
        fetcher: Arc<Fetcher>,
        limiter: Arc<DomainRateLimiter>,
        dedup: Arc<DuplicateIndex>,
        settings: Arc<Settings>,
        permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            dedup,
            settings,
            permits,
            finalize_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 提交下载任务
    ///
    /// 返回可等待的句柄；任务内部的所有失败都折叠进
    /// [`DownloadOutcome::Failed`]，绝不向兄弟任务传播
    pub fn submit(&self, task: DownloadTask, cancel: Arc<AtomicBool>) -> JoinHandle<DownloadOutcome> {
        let manager = self.clone();
        tokio::spawn(async move {
            match manager.download_media(&task, &cancel).await {
                Ok(outcome) => outcome,
                Err(err @ DownloadError::Cancelled { .. }) => {
                    debug!(url = %task.reference.url, "download stopped at cancellation checkpoint");
                    DownloadOutcome::Failed(err)
                }
                Err(err) => {
                    warn!(url = %task.reference.url, error = %err, "download failed");
                    DownloadOutcome::Failed(err)
                }
            }
        })
    }

    /// 执行单个媒体下载
    async fn download_media(
        &self,
        task: &DownloadTask,
        cancel: &AtomicBool,
    ) -> Result<DownloadOutcome, DownloadError> {
        let reference = &task.reference;
        let url = &reference.url;

        // 明确分类且被禁用的类型直接跳过，不消耗许可
        if reference.media_type != MediaType::Other
            && !self.settings.should_download(reference.media_type)
        {
            return Ok(DownloadOutcome::SkippedDisabled);
        }
        if cancel.load(Ordering::Relaxed) {
            return Err(DownloadError::Cancelled {
                url: url.to_string(),
            });
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DownloadError::Cancelled {
                url: url.to_string(),
            })?;

        // 限速按媒体所在域名计算
        self.limiter
            .wait_for_slot(&url_utils::get_domain(url))
            .await;

        // 限速等待期间可能发生取消，发出请求前再检查一次
        if cancel.load(Ordering::Relaxed) {
            return Err(DownloadError::Cancelled {
                url: url.to_string(),
            });
        }

        let response = self.fetcher.fetch_stream(url).await?;

        // Content-Length先行检查，便宜地拒绝明显超限的资源；
        // 流式计数仍是最终的执行点，因为该头可能缺失或说谎
        let provisional_limit = self.settings.size_limit_bytes(reference.media_type);
        if provisional_limit > 0 {
            if let Some(len) = response.content_length() {
                if len > provisional_limit {
                    return Ok(DownloadOutcome::Failed(DownloadError::SizeLimitExceeded {
                        url: url.to_string(),
                        received: len,
                        limit: provisional_limit,
                    }));
                }
            }
        }

        // 落盘域名取来源页面的域名，跨域CDN资源归档在页面名下
        let layout_domain = url_utils::get_domain(&reference.source_page);
        let base_dir = self.settings.output_path(&layout_domain);
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| DownloadError::Io {
                path: base_dir.clone(),
                source: e,
            })?;

        let tmp_path = base_dir.join(format!(".scraprs-{}.part", Uuid::new_v4()));
        let streamed = self
            .stream_to_temp(response, url, &tmp_path, reference.media_type, cancel)
            .await;

        let (hash, byte_size, effective_type, sniffed_ext) = match streamed {
            Ok(streamed) => streamed,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };

        // 嗅探后仍无法归类，或归类到被禁用的类型
        let Some(effective_type) = effective_type else {
            debug!(url = %url, "media type could not be determined, skipping");
            let _ = fs::remove_file(&tmp_path).await;
            return Ok(DownloadOutcome::SkippedDisabled);
        };
        if !self.settings.should_download(effective_type) {
            let _ = fs::remove_file(&tmp_path).await;
            return Ok(DownloadOutcome::SkippedDisabled);
        }

        self.finalize(
            &tmp_path,
            url,
            layout_domain,
            effective_type,
            hash,
            byte_size,
            sniffed_ext,
        )
        .await
    }

    /// 分块流式写入临时文件
    ///
    /// 返回内容哈希、字节数与最终归类；`Other`类型在首块字节
    /// 到达后按魔数嗅探归类，随之切换到该类型的大小限制
    async fn stream_to_temp(
        &self,
        response: reqwest::Response,
        url: &Url,
        tmp_path: &Path,
        declared_type: MediaType,
        cancel: &AtomicBool,
    ) -> Result<(String, u64, Option<MediaType>, Option<&'static str>), DownloadError> {
        let mut file = fs::File::create(tmp_path)
            .await
            .map_err(|e| DownloadError::Io {
                path: tmp_path.to_path_buf(),
                source: e,
            })?;

        let mut hasher = Sha256::new();
        let mut received: u64 = 0;
        let mut resolved: Option<MediaType> = match declared_type {
            MediaType::Other => None,
            t => Some(t),
        };
        let mut sniffed_ext: Option<&'static str> = None;
        let mut limit = self.settings.size_limit_bytes(declared_type);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            // 取消检查点：放弃本次传输，已完成的文件不受影响
            if cancel.load(Ordering::Relaxed) {
                return Err(DownloadError::Cancelled {
                    url: url.to_string(),
                });
            }

            let chunk = chunk.map_err(|e| {
                DownloadError::Fetch(crate::utils::errors::FetchError::Transient {
                    url: url.to_string(),
                    reason: format!("body stream error: {}", e),
                    retry_after_secs: None,
                })
            })?;

            // 首块字节嗅探：无扩展名的文件用嗅探出的扩展名命名，
            // 未分类的引用进一步用嗅探结果归类
            if received == 0 {
                if let Some((sniffed, ext)) = paths::sniff_media_type(&chunk) {
                    sniffed_ext = Some(ext);
                    if resolved.is_none() {
                        resolved = Some(sniffed);
                        limit = self.settings.size_limit_bytes(sniffed);
                    }
                }
            }

            received += chunk.len() as u64;
            if limit > 0 && received > limit {
                return Err(DownloadError::SizeLimitExceeded {
                    url: url.to_string(),
                    received,
                    limit,
                });
            }

            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(|e| DownloadError::Io {
                path: tmp_path.to_path_buf(),
                source: e,
            })?;
        }

        file.flush().await.map_err(|e| DownloadError::Io {
            path: tmp_path.to_path_buf(),
            source: e,
        })?;

        Ok((hex::encode(hasher.finalize()), received, resolved, sniffed_ext))
    }

    /// 去重判定与原子落盘
    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        tmp_path: &Path,
        url: &Url,
        layout_domain: String,
        media_type: MediaType,
        hash: String,
        byte_size: u64,
        sniffed_ext: Option<&'static str>,
    ) -> Result<DownloadOutcome, DownloadError> {
        let _guard = self.finalize_lock.lock().await;

        if !self.dedup.register_if_new(&hash) {
            debug!(url = %url, hash = %hash, "duplicate content, discarding");
            let _ = fs::remove_file(tmp_path).await;
            return Ok(DownloadOutcome::SkippedDuplicate);
        }

        let dest_dir = self
            .settings
            .content_path(&self.settings.output_path(&layout_domain), media_type);
        if let Err(e) = fs::create_dir_all(&dest_dir).await {
            self.dedup.unregister(&hash);
            let _ = fs::remove_file(tmp_path).await;
            return Err(DownloadError::Io {
                path: dest_dir,
                source: e,
            });
        }

        let (stem, mut ext) = paths::filename_from_url(url);
        if ext.is_empty() {
            // 嗅探出的真实格式优先于类型默认扩展名
            ext = sniffed_ext
                .unwrap_or(default_extension(media_type))
                .to_string();
        }
        let final_path = paths::unique_path(&dest_dir, &stem, &ext);

        if let Err(e) = fs::rename(tmp_path, &final_path).await {
            self.dedup.unregister(&hash);
            let _ = fs::remove_file(tmp_path).await;
            return Err(DownloadError::Io {
                path: final_path,
                source: e,
            });
        }

        let record = ContentRecord {
            domain: layout_domain,
            media_type,
            local_path: final_path.clone(),
            content_hash: hash,
            byte_size,
        };
        self.dedup.attach_record(record.clone());

        info!(url = %url, path = %final_path.display(), bytes = byte_size, "saved");
        Ok(DownloadOutcome::Saved(record))
    }

    /// 保存页面正文文本
    ///
    /// 文本已由解析器规范化，与媒体走同一条去重和落盘路径
    pub async fn save_text(&self, page_url: &Url, text: &str) -> DownloadOutcome {
        if !self.settings.download_text {
            return DownloadOutcome::SkippedDisabled;
        }
        if text.is_empty() {
            return DownloadOutcome::SkippedDisabled;
        }

        match self.save_text_inner(page_url, text).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(url = %page_url, error = %err, "failed to save text content");
                DownloadOutcome::Failed(err)
            }
        }
    }

    async fn save_text_inner(
        &self,
        page_url: &Url,
        text: &str,
    ) -> Result<DownloadOutcome, DownloadError> {
        let bytes = text.as_bytes();

        let limit = self.settings.size_limit_bytes(MediaType::Text);
        if limit > 0 && bytes.len() as u64 > limit {
            return Err(DownloadError::SizeLimitExceeded {
                url: page_url.to_string(),
                received: bytes.len() as u64,
                limit,
            });
        }

        let hash = hex::encode(Sha256::digest(bytes));
        let layout_domain = url_utils::get_domain(page_url);
        let base_dir = self.settings.output_path(&layout_domain);
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| DownloadError::Io {
                path: base_dir.clone(),
                source: e,
            })?;

        let tmp_path = base_dir.join(format!(".scraprs-{}.part", Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp_path, bytes).await {
            return Err(DownloadError::Io {
                path: tmp_path,
                source: e,
            });
        }

        let outcome = self
            .finalize(
                &tmp_path,
                page_url,
                layout_domain,
                MediaType::Text,
                hash,
                bytes.len() as u64,
                None,
            )
            .await;
        if outcome.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        outcome
    }
}

/// 类型的默认扩展名
fn default_extension(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Image => "jpg",
        MediaType::Video => "mp4",
        MediaType::Text => "txt",
        MediaType::Other => "bin",
    }
}
