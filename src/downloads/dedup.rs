// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::domain::models::target::ContentRecord;

/// 内容去重索引
///
/// 以下载字节的SHA-256为键，而非URL：不同URL返回相同字节时
/// 只落盘一份。默认随单次运行存活于内存；
/// 跨运行复用由调用方共享同一实例实现。
#[derive(Default)]
pub struct DuplicateIndex {
    /// 哈希 -> 首次落盘记录（注册后补全）
    inner: Mutex<HashMap<String, Option<ContentRecord>>>,
}

impl DuplicateIndex {
    /// 创建空索引
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内容哈希
    ///
    /// 首次出现返回true，调用方随后负责落盘并调用[`Self::attach_record`]；
    /// 重复出现返回false，调用方不得写入第二份文件
    pub fn register_if_new(&self, hash: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.contains_key(hash) {
            return false;
        }
        inner.insert(hash.to_string(), None);
        true
    }

    /// 为已注册的哈希补全落盘记录
    pub fn attach_record(&self, record: ContentRecord) {
        self.inner
            .lock()
            .insert(record.content_hash.clone(), Some(record));
    }

    /// 撤销注册（落盘失败时回滚）
    pub fn unregister(&self, hash: &str) {
        self.inner.lock().remove(hash);
    }

    /// 哈希是否已知
    pub fn contains(&self, hash: &str) -> bool {
        self.inner.lock().contains_key(hash)
    }

    /// 已知哈希数
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// 索引是否为空
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// 本索引见证的所有落盘记录
    pub fn records(&self) -> Vec<ContentRecord> {
        self.inner.lock().values().filter_map(|r| r.clone()).collect()
    }
}
