// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::config::settings::Settings;

/// 作业状态枚举
///
/// 状态转换遵循以下流程：
/// Pending → Running → Completed/Failed/Cancelled
/// 终止状态一经设置不再改变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 已提交，尚未开始执行
    #[default]
    Pending,
    /// 正在执行
    Running,
    /// 成功完成
    Completed,
    /// 因致命前置条件失败
    Failed,
    /// 被调用方取消，在途工作已排空
    Cancelled,
}

impl JobStatus {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// 作业进度快照
///
/// 每完成一个离散工作单元后整体更新一次，
/// 并发读取方不会观察到部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressStats {
    /// 已处理的页面数
    pub urls_processed: u64,
    /// 已落盘的文件数
    pub files_downloaded: u64,
    /// 已落盘的总字节数
    pub total_bytes: u64,
    /// 单项失败计数
    pub errors: u64,
    /// 跳过的重复内容计数
    pub skipped_duplicates: u64,
    /// 被robots.txt拒绝而跳过的目标计数
    pub robots_skipped: u64,
    /// 粗略完成百分比（基于已处理与边界中剩余的目标数）
    pub percent_complete: f32,
    /// 当前阶段的可读描述
    pub current_message: String,
}

/// 作业记录
///
/// 在提交时创建；仅由驱动该作业的任务修改，
/// 状态查询方并发读取克隆的快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// 作业唯一标识符
    pub id: Uuid,
    /// 提交的种子URL列表
    pub input_urls: Vec<String>,
    /// 提交时的配置快照
    pub config_snapshot: Settings,
    /// 作业状态
    pub status: JobStatus,
    /// 进度统计
    pub progress: ProgressStats,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 最后更新时间
    pub updated_at: DateTime<Utc>,
    /// 失败时的可读错误信息
    pub error_message: Option<String>,
}

impl JobRecord {
    /// 创建新的待执行作业记录
    pub fn new(input_urls: Vec<String>, config_snapshot: Settings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            input_urls,
            config_snapshot,
            status: JobStatus::Pending,
            progress: ProgressStats::default(),
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }
}

/// 同步入口的运行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// 落盘文件数
    pub files_downloaded: u64,
    /// 单项失败数
    pub errors: u64,
    /// 落盘总字节数
    pub bytes_total: u64,
    /// 处理的页面数
    pub urls_processed: u64,
}
