// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 内容下载：去重索引、路径规划与并发下载管理

pub mod dedup;
pub mod manager;
pub mod paths;
