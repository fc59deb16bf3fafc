// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::domain::models::job::JobRecord;

/// 历史文件保留的最大记录数，超出时淘汰最旧的
const MAX_HISTORY_ENTRIES: usize = 100;

/// 作业历史读写错误
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("io error on history file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("history file {path} is not valid json: {source}")]
    Serde {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 读取作业历史
///
/// 文件不存在视为空历史而非错误
pub fn load(path: &Path) -> Result<Vec<JobRecord>, HistoryError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(HistoryError::Io {
                path: path.display().to_string(),
                source: err,
            })
        }
    };

    serde_json::from_str(&content).map_err(|err| HistoryError::Serde {
        path: path.display().to_string(),
        source: err,
    })
}

/// 追加一条作业记录
///
/// 先写临时文件再改名，崩溃不会留下半截历史文件
pub fn append(path: &Path, record: &JobRecord) -> Result<(), HistoryError> {
    let mut entries = load(path)?;
    entries.push(record.clone());
    if entries.len() > MAX_HISTORY_ENTRIES {
        let excess = entries.len() - MAX_HISTORY_ENTRIES;
        entries.drain(..excess);
    }

    let serialized =
        serde_json::to_string_pretty(&entries).map_err(|err| HistoryError::Serde {
            path: path.display().to_string(),
            source: err,
        })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| HistoryError::Io {
                path: parent.display().to_string(),
                source: err,
            })?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, serialized).map_err(|err| HistoryError::Io {
        path: tmp_path.display().to_string(),
        source: err,
    })?;
    fs::rename(&tmp_path, path).map_err(|err| HistoryError::Io {
        path: path.display().to_string(),
        source: err,
    })?;

    debug!(path = %path.display(), entries = entries.len(), "job history updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::Settings;
    use crate::domain::models::job::JobStatus;

    fn record(url: &str) -> JobRecord {
        let mut record = JobRecord::new(vec![url.to_string()], Settings::default());
        record.status = JobStatus::Completed;
        record
    }

    #[test]
    fn test_missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let entries = load(&dir.path().join("job_history.json")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_append_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_history.json");

        append(&path, &record("https://example.com/a")).unwrap();
        append(&path, &record("https://example.com/b")).unwrap();

        let entries = load(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].input_urls, vec!["https://example.com/a"]);
        assert_eq!(entries[1].status, JobStatus::Completed);
    }

    #[test]
    fn test_history_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_history.json");

        let mut entries: Vec<JobRecord> = (0..MAX_HISTORY_ENTRIES)
            .map(|i| record(&format!("https://example.com/{}", i)))
            .collect();
        let serialized = serde_json::to_string(&entries).unwrap();
        std::fs::write(&path, serialized).unwrap();

        append(&path, &record("https://example.com/newest")).unwrap();

        entries = load(&path).unwrap();
        assert_eq!(entries.len(), MAX_HISTORY_ENTRIES);
        // 最旧的被淘汰，最新的在末尾
        assert_eq!(entries[0].input_urls, vec!["https://example.com/1"]);
        assert_eq!(
            entries.last().unwrap().input_urls,
            vec!["https://example.com/newest"]
        );
    }
}
