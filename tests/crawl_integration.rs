// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 端到端爬取行为测试：深度边界、内容去重、robots遵守、
//! 大小限制与文本落盘

use std::path::{Path, PathBuf};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scraprs::config::settings::Settings;
use scraprs::domain::models::job::JobStatus;
use scraprs::downloads::dedup::DuplicateIndex;
use scraprs::workers::job_manager::JobManager;
use std::time::Duration;

fn test_settings(output_dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.output_dir = output_dir.to_path_buf();
    settings.delay_between_requests = 0.0;
    settings.max_retries = 0;
    settings.respect_robots_txt = false;
    settings
}

fn html_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[7u8; 64]);
    bytes
}

/// 递归收集目录下的所有普通文件
fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(files_under(&path));
            } else {
                files.push(path);
            }
        }
    }
    files
}

#[tokio::test]
async fn depth_budget_stops_link_following() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(r#"<html><body><a href="/a">a</a></body></html>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_response(r#"<html><body><a href="/b">b</a></body></html>"#))
        .mount(&server)
        .await;
    // 第3层页面绝不能被请求
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_response("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.max_depth = 2;
    settings.download_text = false;

    let result = JobManager::new()
        .run(vec![server.uri()], settings)
        .await
        .unwrap();

    assert_eq!(result.urls_processed, 2);
    assert_eq!(result.errors, 0);
}

#[tokio::test]
async fn depth_one_processes_only_seed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(r#"<html><body><a href="/a">a</a></body></html>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_response("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.max_depth = 1;
    settings.download_text = false;

    let result = JobManager::new()
        .run(vec![server.uri()], settings)
        .await
        .unwrap();

    assert_eq!(result.urls_processed, 1);
}

#[tokio::test]
async fn identical_bytes_saved_once() {
    let server = MockServer::start().await;
    let body = png_bytes();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            r#"<html><body><img src="/one.png"><img src="/two.png"></body></html>"#,
        ))
        .mount(&server)
        .await;
    for name in ["/one.png", "/two.png"] {
        Mock::given(method("GET"))
            .and(path(name))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.download_text = false;

    let result = JobManager::new()
        .run(vec![server.uri()], settings)
        .await
        .unwrap();

    // 两个URL返回相同字节，只落盘一份
    assert_eq!(result.files_downloaded, 1);
    assert_eq!(files_under(dir.path()).len(), 1);
}

#[tokio::test]
async fn shared_dedup_spans_runs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            r#"<html><body><img src="/logo.png"></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.download_text = false;

    let dedup = Arc::new(DuplicateIndex::new());
    let manager = JobManager::new().with_shared_dedup(dedup);

    let first = manager
        .run(vec![server.uri()], settings.clone())
        .await
        .unwrap();
    let second = manager.run(vec![server.uri()], settings).await.unwrap();

    assert_eq!(first.files_downloaded, 1);
    // 第二次运行复用索引，不产生新文件
    assert_eq!(second.files_downloaded, 0);
    assert_eq!(files_under(dir.path()).len(), 1);
}

#[tokio::test]
async fn declared_img_without_extension_is_saved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            r#"<html><body><img src="/icon?name=logo"></body></html>"#,
        ))
        .mount(&server)
        .await;
    // 无扩展名、无已知魔数的SVG负载，靠<img>标签归类为图片
    Mock::given(method("GET"))
        .and(path("/icon"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(
            br#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="8" height="8"/></svg>"#
                .to_vec(),
        ))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.download_text = false;

    let result = JobManager::new()
        .run(vec![server.uri()], settings)
        .await
        .unwrap();

    assert_eq!(result.files_downloaded, 1);
    let files = files_under(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].to_string_lossy().contains("images"));
    assert!(files[0].extension().is_some_and(|e| e == "svg"));
}

#[tokio::test]
async fn cancel_halts_new_requests_and_keeps_completed_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            r#"<html><body><p>front page</p><a href="/a">next</a><img src="/one.png"></body></html>"#,
        ))
        .mount(&server)
        .await;
    // 取消落在下一个检查点之前，这两个请求绝不能发出
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_response("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/one.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.max_depth = 2;
    // 域名限速让后续请求停在槽位等待中，取消有充裕的时间窗口
    settings.delay_between_requests = 1.0;

    let manager = JobManager::new();
    let job_id = manager.submit(vec![server.uri()], settings).unwrap();

    // 等首页处理完成再取消
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while manager.status(&job_id).unwrap().progress.urls_processed < 1 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "seed page was not processed in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(manager.cancel(&job_id));
    manager.wait(&job_id).await;

    let record = manager.status(&job_id).unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
    // 在检查点停止的传输不计入错误
    assert_eq!(record.progress.errors, 0);

    // 取消前已落盘的首页文本必须保留
    let files = files_under(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].extension().is_some_and(|e| e == "txt"));
}

#[tokio::test]
async fn robots_disallow_blocks_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            r#"<html><body><a href="/private/page">secret</a></body></html>"#,
        ))
        .mount(&server)
        .await;
    // 被robots禁止的路径绝不能发出请求
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(html_response("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.respect_robots_txt = true;
    settings.max_depth = 2;
    settings.download_text = false;

    let manager = JobManager::new();
    let job_id = manager.submit(vec![server.uri()], settings).unwrap();
    let result = manager.wait(&job_id).await.unwrap();

    // 跳过不计为错误，但反映在跳过统计中
    assert_eq!(result.urls_processed, 1);
    assert_eq!(result.errors, 0);
    let record = manager.status(&job_id).unwrap();
    assert_eq!(record.progress.robots_skipped, 1);
}

#[tokio::test]
async fn oversize_download_leaves_no_partial_file() {
    let server = MockServer::start().await;
    let mut big = png_bytes();
    big.extend(std::iter::repeat(1u8).take(3 * 1024 * 1024));
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            r#"<html><body><img src="/huge.png"></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/huge.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(big))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.max_image_size = 1; // 1 MiB
    settings.download_text = false;

    let result = JobManager::new()
        .run(vec![server.uri()], settings)
        .await
        .unwrap();

    assert_eq!(result.files_downloaded, 0);
    assert_eq!(result.errors, 1);
    assert!(
        files_under(dir.path()).is_empty(),
        "partial output must be discarded"
    );
}

#[tokio::test]
async fn page_text_saved_and_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            "<html><body><h1>Title</h1>\n\n  <p>Some   text</p><script>ignored()</script></body></html>",
        ))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path());

    let result = JobManager::new()
        .run(vec![server.uri()], settings)
        .await
        .unwrap();

    assert_eq!(result.files_downloaded, 1);
    let files = files_under(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].extension().is_some_and(|e| e == "txt"));

    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert_eq!(content, "Title Some text");
}

#[tokio::test]
async fn failed_page_counts_error_and_crawl_continues() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(
            r#"<html><body><a href="/gone">x</a><a href="/ok">y</a></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(html_response("<html><body><p>alive</p></body></html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.max_depth = 2;
    settings.download_text = false;

    let result = JobManager::new()
        .run(vec![server.uri()], settings)
        .await
        .unwrap();

    // 单页失败计入统计，不中断作业
    assert_eq!(result.errors, 1);
    assert_eq!(result.urls_processed, 3);
}
