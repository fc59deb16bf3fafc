// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use scraprs::config::settings::Settings;
use scraprs::utils::telemetry::init_telemetry;
use scraprs::utils::text_processing::format_file_size;
use scraprs::workers::job_manager::JobManager;

/// 深度受限的网页抓取器：跟随链接下载文本、图片与视频，
/// 按内容哈希去重，遵守robots.txt与域名级限速
#[derive(Parser, Debug)]
#[command(name = "scraprs", version, about)]
struct Cli {
    /// 种子URL，至少提供一个
    #[arg(required_unless_present = "init_config")]
    urls: Vec<String>,

    /// 配置文件路径（YAML）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 输出目录，覆盖配置文件
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 最大爬取深度，种子为第1层
    #[arg(long)]
    max_depth: Option<u32>,

    /// 并发工作器数量
    #[arg(long)]
    max_workers: Option<usize>,

    /// 同一域名相邻请求的最小间隔（秒）
    #[arg(long)]
    delay: Option<f64>,

    /// 自定义User-Agent
    #[arg(long)]
    user_agent: Option<String>,

    /// 不下载图片
    #[arg(long)]
    no_images: bool,

    /// 不下载视频
    #[arg(long)]
    no_videos: bool,

    /// 不保存页面正文文本
    #[arg(long)]
    no_text: bool,

    /// 不检查robots.txt（自担风险）
    #[arg(long)]
    ignore_robots: bool,

    /// 跟随种子域之外的链接
    #[arg(long)]
    follow_external: bool,

    /// 只爬取不下载，用于预览抓取范围
    #[arg(long)]
    dry_run: bool,

    /// 日志级别（trace/debug/info/warn/error）
    #[arg(long)]
    log_level: Option<String>,

    /// 将默认配置写入该文件（YAML）后退出
    #[arg(long, value_name = "PATH")]
    init_config: Option<PathBuf>,
}

impl Cli {
    /// 命令行参数覆盖配置文件
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(output) = &self.output {
            settings.output_dir = output.clone();
        }
        if let Some(max_depth) = self.max_depth {
            settings.max_depth = max_depth;
        }
        if let Some(max_workers) = self.max_workers {
            settings.max_workers = max_workers;
        }
        if let Some(delay) = self.delay {
            settings.delay_between_requests = delay;
        }
        if let Some(user_agent) = &self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(log_level) = &self.log_level {
            settings.log_level = log_level.clone();
        }
        if self.no_images {
            settings.download_images = false;
        }
        if self.no_videos {
            settings.download_videos = false;
        }
        if self.no_text {
            settings.download_text = false;
        }
        if self.ignore_robots {
            settings.respect_robots_txt = false;
        }
        if self.follow_external {
            settings.follow_external_links = true;
        }
        if self.dry_run {
            settings.download_images = false;
            settings.download_videos = false;
            settings.download_text = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.init_config {
        let defaults = Settings::default();
        let yaml = serde_yaml::to_string(&defaults).context("failed to serialize defaults")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let mut settings =
        Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_to(&mut settings);

    init_telemetry(&settings.log_level);
    info!(
        urls = cli.urls.len(),
        max_depth = settings.max_depth,
        workers = settings.max_workers,
        dry_run = cli.dry_run,
        "starting scrape"
    );

    let mut manager = JobManager::new();
    if !cli.dry_run {
        manager = manager.with_history(settings.output_dir.join("job_history.json"));
    }

    let result = manager
        .run(cli.urls.clone(), settings)
        .await
        .context("scrape job failed")?;

    println!("Pages processed:  {}", result.urls_processed);
    println!("Files downloaded: {}", result.files_downloaded);
    println!("Total size:       {}", format_file_size(result.bytes_total));
    println!("Errors:           {}", result.errors);

    if result.errors > 0 && result.files_downloaded == 0 && result.urls_processed == 0 {
        anyhow::bail!("scrape produced no output");
    }
    Ok(())
}
