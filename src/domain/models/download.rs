// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::target::{ContentRecord, MediaReference};
use crate::utils::errors::DownloadError;

/// 下载任务
///
/// 状态流转：queued → in_progress → {succeeded, failed, skipped_duplicate}，
/// 流转体现在返回的 [`DownloadOutcome`] 中，任务本身不可变
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// 待下载的媒体引用
    pub reference: MediaReference,
}

impl DownloadTask {
    pub fn new(reference: MediaReference) -> Self {
        Self { reference }
    }
}

/// 下载结果
#[derive(Debug)]
pub enum DownloadOutcome {
    /// 新内容已落盘
    Saved(ContentRecord),
    /// 字节级重复，未写入第二份文件
    SkippedDuplicate,
    /// 该媒体类型在配置中被禁用
    SkippedDisabled,
    /// 下载失败，不影响兄弟任务
    Failed(DownloadError),
}

impl DownloadOutcome {
    /// 是否产生了新文件
    pub fn is_saved(&self) -> bool {
        matches!(self, DownloadOutcome::Saved(_))
    }

    /// 结果计入的字节数
    pub fn byte_size(&self) -> u64 {
        match self {
            DownloadOutcome::Saved(record) => record.byte_size,
            _ => 0,
        }
    }
}
