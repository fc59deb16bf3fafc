// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::settings::Settings;
use crate::domain::models::download::{DownloadOutcome, DownloadTask};
use crate::domain::models::job::{JobRecord, JobStatus, RunResult};
use crate::domain::models::target::CrawlTarget;
use crate::downloads::manager::DownloadManager;
use crate::engines::fetcher::Fetcher;
use crate::parse::page::PageParser;
use crate::queue::frontier::Frontier;
use crate::utils::errors::DownloadError;
use crate::utils::rate_limit::DomainRateLimiter;
use crate::utils::robots::RobotsCheckerTrait;
use crate::utils::url_utils;

/// 爬取工作器
///
/// 驱动单个作业的广度优先遍历：出队 → robots检查 → 限速等待 →
/// 抓取 → 解析 → 提交下载 → 子链接入队。页面按FIFO顺序串行出队，
/// 抓取与下载通过共享信号量并发执行。
pub struct CrawlWorker {
    settings: Arc<Settings>,
    fetcher: Arc<Fetcher>,
    parser: PageParser,
    robots: Arc<dyn RobotsCheckerTrait>,
    limiter: Arc<DomainRateLimiter>,
    downloads: DownloadManager,
    permits: Arc<Semaphore>,
    cancel: Arc<AtomicBool>,
    record: Arc<RwLock<JobRecord>>,
}

impl CrawlWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        fetcher: Arc<Fetcher>,
        robots: Arc<dyn RobotsCheckerTrait>,
        limiter: Arc<DomainRateLimiter>,
        downloads: DownloadManager,
        permits: Arc<Semaphore>,
        cancel: Arc<AtomicBool>,
        record: Arc<RwLock<JobRecord>>,
    ) -> Self {
        let parser = PageParser::new(&settings);
        Self {
            settings,
            fetcher,
            parser,
            robots,
            limiter,
            downloads,
            permits,
            cancel,
            record,
        }
    }

    /// 执行爬取作业
    ///
    /// 返回时所有在途下载已排空，作业记录处于终止状态
    pub async fn run(&self, seeds: Vec<Url>) -> RunResult {
        let mut frontier = Frontier::new(
            self.settings.max_depth,
            self.settings.follow_external_links,
        );
        for seed in seeds {
            frontier.push(CrawlTarget::seed(seed));
        }

        self.transition(JobStatus::Running, "crawl started");
        if !self.settings.respect_robots_txt {
            warn!("robots.txt checking is disabled for this run");
        }

        let mut pending: Vec<JoinHandle<DownloadOutcome>> = Vec::new();

        while let Some(target) = frontier.pop() {
            if self.cancel.load(Ordering::Relaxed) {
                info!("cancellation requested, draining in-flight work");
                break;
            }

            let fetched = self
                .process_target(&target, &mut frontier, &mut pending)
                .await;

            // robots跳过的目标不计入已处理页面
            if fetched {
                self.bump_processed(&frontier);
            }
            self.reap_finished(&mut pending).await;
        }

        // 排空在途下载；取消时各任务会在自己的检查点快速停止
        for handle in pending {
            self.apply_outcome(handle.await);
        }

        let cancelled = self.cancel.load(Ordering::Relaxed);
        let final_status = if cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        self.transition(final_status, "crawl finished");

        let record = self.record.read();
        info!(
            job_id = %record.id,
            status = %record.status,
            urls = record.progress.urls_processed,
            files = record.progress.files_downloaded,
            errors = record.progress.errors,
            "job finished"
        );
        RunResult {
            files_downloaded: record.progress.files_downloaded,
            errors: record.progress.errors,
            bytes_total: record.progress.total_bytes,
            urls_processed: record.progress.urls_processed,
        }
    }

    /// 处理单个爬取目标
    ///
    /// 返回是否实际发起了页面请求
    async fn process_target(
        &self,
        target: &CrawlTarget,
        frontier: &mut Frontier,
        pending: &mut Vec<JoinHandle<DownloadOutcome>>,
    ) -> bool {
        let domain = url_utils::get_domain(&target.url);

        if self.settings.respect_robots_txt {
            if !self
                .robots
                .is_allowed(&target.url, &self.settings.user_agent)
                .await
            {
                // 被robots拒绝不是错误，计入跳过统计
                debug!(url = %target.url, "disallowed by robots.txt");
                self.record.write().progress.robots_skipped += 1;
                return false;
            }
            if let Some(delay) = self
                .robots
                .get_crawl_delay(&target.url, &self.settings.user_agent)
                .await
            {
                self.limiter.set_domain_floor(&domain, delay);
            }
        }

        self.limiter.wait_for_slot(&domain).await;

        // 限速等待期间可能发生取消，发出请求前再检查一次
        if self.cancel.load(Ordering::Relaxed) {
            return false;
        }

        let page = {
            let _permit = match self.permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => return false,
            };
            self.fetcher.fetch_page(&target.url).await
        };

        let page = match page {
            Ok(page) => page,
            Err(err) => {
                warn!(url = %target.url, error = %err, "page fetch failed");
                self.record.write().progress.errors += 1;
                return true;
            }
        };

        if !page.is_html() {
            debug!(url = %target.url, content_type = %page.content_type, "not an html page, skipping");
            return true;
        }

        // 相对引用以重定向后的最终URL为基准
        let parsed = self.parser.parse(&page.body, &page.final_url);
        debug!(
            url = %target.url,
            depth = target.depth,
            links = parsed.links.len(),
            media = parsed.media.len(),
            "page parsed"
        );

        if self.settings.download_text && !parsed.text.is_empty() {
            let outcome = self.downloads.save_text(&page.final_url, &parsed.text).await;
            self.apply_outcome(Ok(outcome));
        }

        for reference in parsed.media {
            pending.push(
                self.downloads
                    .submit(DownloadTask::new(reference), self.cancel.clone()),
            );
        }

        for link in parsed.links {
            frontier.push(target.child(link));
        }
        true
    }

    /// 收割已完成的下载句柄，保持统计随进度更新
    async fn reap_finished(&self, pending: &mut Vec<JoinHandle<DownloadOutcome>>) {
        let mut still_pending = Vec::with_capacity(pending.len());
        for handle in pending.drain(..) {
            if handle.is_finished() {
                self.apply_outcome(handle.await);
            } else {
                still_pending.push(handle);
            }
        }
        *pending = still_pending;
    }

    /// 将下载结果计入作业统计
    fn apply_outcome(&self, outcome: Result<DownloadOutcome, tokio::task::JoinError>) {
        let mut record = self.record.write();
        match outcome {
            Ok(DownloadOutcome::Saved(saved)) => {
                record.progress.files_downloaded += 1;
                record.progress.total_bytes += saved.byte_size;
            }
            Ok(DownloadOutcome::SkippedDuplicate) => {
                record.progress.skipped_duplicates += 1;
            }
            Ok(DownloadOutcome::SkippedDisabled) => {}
            // 在检查点停止的传输是取消的正常表现，不计入错误
            Ok(DownloadOutcome::Failed(DownloadError::Cancelled { .. })) => {}
            Ok(DownloadOutcome::Failed(_)) => {
                record.progress.errors += 1;
            }
            Err(join_err) => {
                warn!(error = %join_err, "download task panicked");
                record.progress.errors += 1;
            }
        }
        record.updated_at = chrono::Utc::now();
    }

    /// 页面处理完成后更新进度快照
    fn bump_processed(&self, frontier: &Frontier) {
        let mut record = self.record.write();
        record.progress.urls_processed += 1;
        let processed = record.progress.urls_processed as f32;
        let remaining = frontier.len() as f32;
        record.progress.percent_complete = processed / (processed + remaining) * 100.0;
        record.progress.current_message =
            format!("processed {} pages, {} queued", processed as u64, frontier.len());
        record.updated_at = chrono::Utc::now();
    }

    /// 状态转换，终止状态一经设置不再改变
    fn transition(&self, status: JobStatus, message: &str) {
        let mut record = self.record.write();
        if record.status.is_terminal() {
            return;
        }
        record.status = status;
        record.progress.current_message = message.to_string();
        record.updated_at = chrono::Utc::now();
    }
}
