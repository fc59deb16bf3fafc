// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 作业编排：爬取工作器与作业管理器

pub mod crawl_worker;
pub mod job_manager;
