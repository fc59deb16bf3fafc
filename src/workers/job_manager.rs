// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::settings::Settings;
use crate::domain::models::job::{JobRecord, JobStatus, RunResult};
use crate::downloads::dedup::DuplicateIndex;
use crate::downloads::manager::DownloadManager;
use crate::engines::fetcher::Fetcher;
use crate::jobs::history;
use crate::utils::errors::ScrapeError;
use crate::utils::rate_limit::DomainRateLimiter;
use crate::utils::robots::{RobotsChecker, RobotsCheckerTrait};
use crate::workers::crawl_worker::CrawlWorker;

/// 单个作业的管理句柄
pub struct JobHandle {
    record: Arc<RwLock<JobRecord>>,
    cancel: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<RunResult>>>,
}

/// 作业管理器
///
/// 维护作业注册表，提供提交、状态查询与取消。
/// 每个作业独占自己的边界、去重索引与进度记录；
/// 通过[`JobManager::with_shared_dedup`]可让多次运行共享去重索引。
pub struct JobManager {
    jobs: DashMap<Uuid, Arc<JobHandle>>,
    shared_dedup: Option<Arc<DuplicateIndex>>,
    history_path: Option<PathBuf>,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            shared_dedup: None,
            history_path: None,
        }
    }

    /// 让后续所有作业共享同一个去重索引
    ///
    /// 跨运行去重：第二次运行会跳过第一次已落盘的内容
    pub fn with_shared_dedup(mut self, dedup: Arc<DuplicateIndex>) -> Self {
        self.shared_dedup = Some(dedup);
        self
    }

    /// 作业终止后向该文件追加历史记录
    pub fn with_history(mut self, path: PathBuf) -> Self {
        self.history_path = Some(path);
        self
    }

    /// 提交作业并立即返回作业ID
    ///
    /// 前置条件在提交时校验；爬取在后台任务中执行
    pub fn submit(&self, urls: Vec<String>, settings: Settings) -> Result<Uuid, ScrapeError> {
        let (seeds, settings) = validate_preconditions(urls.clone(), settings)?;

        let record = Arc::new(RwLock::new(JobRecord::new(urls, (*settings).clone())));
        let cancel = Arc::new(AtomicBool::new(false));
        let job_id = record.read().id;

        let worker = self.build_worker(settings, cancel.clone(), record.clone())?;
        let history_path = self.history_path.clone();
        let record_for_task = record.clone();

        let task = tokio::spawn(async move {
            // 工作器内部的panic不能让作业卡在Running
            let result = match AssertUnwindSafe(worker.run(seeds)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    warn!(error = %reason, "job worker panicked");
                    fail_record(&record_for_task, &reason)
                }
            };
            if let Some(path) = history_path {
                let snapshot = record_for_task.read().clone();
                if let Err(err) = history::append(&path, &snapshot) {
                    warn!(path = %path.display(), error = %err, "failed to append job history");
                }
            }
            result
        });

        self.jobs.insert(
            job_id,
            Arc::new(JobHandle {
                record,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        );
        info!(job_id = %job_id, "job submitted");
        Ok(job_id)
    }

    /// 查询作业状态快照
    pub fn status(&self, job_id: &Uuid) -> Option<JobRecord> {
        self.jobs
            .get(job_id)
            .map(|handle| handle.record.read().clone())
    }

    /// 请求取消作业
    ///
    /// 幂等：对已终止或未知的作业返回false。取消是协作式的，
    /// 在途工作在下一个检查点停止，状态随后转为Cancelled。
    pub fn cancel(&self, job_id: &Uuid) -> bool {
        let Some(handle) = self.jobs.get(job_id) else {
            return false;
        };
        if handle.record.read().status.is_terminal() {
            return false;
        }
        info!(job_id = %job_id, "cancellation requested");
        handle.cancel.store(true, Ordering::Relaxed);
        true
    }

    /// 等待作业结束并返回运行结果
    ///
    /// 同一作业只有第一次等待能拿到结果
    pub async fn wait(&self, job_id: &Uuid) -> Option<RunResult> {
        let handle = self.jobs.get(job_id)?.value().clone();
        let task = handle.task.lock().await.take()?;
        task.await.ok()
    }

    /// 同步入口：阻塞完成一次完整的爬取运行
    pub async fn run(&self, urls: Vec<String>, settings: Settings) -> Result<RunResult, ScrapeError> {
        let job_id = self.submit(urls, settings)?;
        self.wait(&job_id)
            .await
            .ok_or_else(|| ScrapeError::InvalidConfig("job task aborted".to_string()))
    }

    /// 组装作业的执行管线
    fn build_worker(
        &self,
        settings: Arc<Settings>,
        cancel: Arc<AtomicBool>,
        record: Arc<RwLock<JobRecord>>,
    ) -> Result<CrawlWorker, ScrapeError> {
        let fetcher = Arc::new(
            Fetcher::new(&settings)
                .map_err(|e| ScrapeError::InvalidConfig(format!("http client: {}", e)))?,
        );
        let limiter = Arc::new(DomainRateLimiter::new(settings.request_delay()));
        let robots: Arc<dyn RobotsCheckerTrait> = Arc::new(RobotsChecker::new(fetcher.client()));
        let permits = Arc::new(Semaphore::new(settings.max_workers));
        let dedup = self
            .shared_dedup
            .clone()
            .unwrap_or_else(|| Arc::new(DuplicateIndex::new()));
        let downloads = DownloadManager::new(
            fetcher.clone(),
            limiter.clone(),
            dedup,
            settings.clone(),
            permits.clone(),
        );

        Ok(CrawlWorker::new(
            settings, fetcher, robots, limiter, downloads, permits, cancel, record,
        ))
    }
}

/// 将作业记录转入Failed终止态并登记错误信息
///
/// 已终止的记录保持不变；返回当时的进度作为运行结果
fn fail_record(record: &RwLock<JobRecord>, reason: &str) -> RunResult {
    let mut record = record.write();
    if !record.status.is_terminal() {
        record.status = JobStatus::Failed;
        record.error_message = Some(reason.to_string());
        record.updated_at = chrono::Utc::now();
    }
    RunResult {
        files_downloaded: record.progress.files_downloaded,
        errors: record.progress.errors,
        bytes_total: record.progress.total_bytes,
        urls_processed: record.progress.urls_processed,
    }
}

/// 提取panic负载中的可读信息
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker task panicked".to_string()
    }
}

/// 校验作业前置条件
///
/// 配置不合法、种子全部无效或输出目录不可写都会让作业
/// 在开始前直接失败
fn validate_preconditions(
    urls: Vec<String>,
    settings: Settings,
) -> Result<(Vec<Url>, Arc<Settings>), ScrapeError> {
    settings.validate().map_err(ScrapeError::InvalidConfig)?;

    let seeds: Vec<Url> = urls
        .iter()
        .filter_map(|raw| {
            let parsed = crate::utils::url_utils::parse_seed(raw);
            if parsed.is_none() {
                warn!(url = %raw, "seed url is not crawlable, skipping");
            }
            parsed
        })
        .collect();
    if seeds.is_empty() {
        return Err(ScrapeError::NoSeedUrls);
    }

    if let Err(err) = std::fs::create_dir_all(&settings.output_dir) {
        return Err(ScrapeError::OutputDirUnwritable {
            path: settings.output_dir.clone(),
            reason: err.to_string(),
        });
    }

    Ok((seeds, Arc::new(settings)))
}
