// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体：爬取目标、媒体引用、下载任务和作业记录
pub mod domain;

/// 下载模块
///
/// 实现受限并发的内容下载、去重索引和磁盘布局
pub mod downloads;

/// 引擎模块
///
/// 实现带重试与退避的HTTP抓取引擎
pub mod engines;

/// 作业历史模块
///
/// 将已完成作业记录持久化为JSON历史文件
pub mod jobs;

/// 解析模块
///
/// 从HTML页面提取链接、媒体引用和正文文本
pub mod parse;

/// 队列模块
///
/// 实现深度受限的广度优先爬取边界
pub mod queue;

/// 工具模块
///
/// 提供错误类型、robots检查、限速、重试策略等通用功能
pub mod utils;

/// 工作器模块
///
/// 实现爬取作业的驱动循环与作业管理器
pub mod workers;
