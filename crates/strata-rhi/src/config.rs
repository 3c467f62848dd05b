// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runtime configuration of the RHI and the per-platform tuning limits.
//!
//! Both [`RhiConfig`] and [`PlatformLimits`] can be loaded from a per-platform
//! asset file. The format is picked from the extension: `.ron` files go through
//! `ron`, `.json` files through `serde_json`. Fields missing from the file keep
//! their default value.

use crate::error::{RhiError, RhiResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The largest frame ring the queue context supports.
pub const MAX_FRAME_COUNT: u32 = 8;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// How a heap grows when allocations are made against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeapAllocationStrategy {
    /// The heap is allocated once at its budget; exceeding it is an error.
    #[default]
    Fixed,
    /// The heap grows in pages, without a hard limit.
    Paging,
    /// The budget is a hint; exceeding it only produces a warning.
    MemoryHint,
}

/// Page sizing used by the [`HeapAllocationStrategy::Paging`] strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapPagingParameters {
    /// The size of a single heap page.
    pub page_size_in_bytes: u64,
    /// How many pages are reserved up front.
    pub initial_page_count: u32,
}

impl Default for HeapPagingParameters {
    fn default() -> Self {
        Self {
            page_size_in_bytes: 16 * MIB,
            initial_page_count: 1,
        }
    }
}

/// Byte budgets of the transient attachment heaps.
///
/// A budget of zero means the heap is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransientAttachmentPoolBudgets {
    /// Budget of the heap backing transient buffers.
    pub buffer_budget_in_bytes: u64,
    /// Budget of the heap backing transient images.
    pub image_budget_in_bytes: u64,
}

impl Default for TransientAttachmentPoolBudgets {
    fn default() -> Self {
        Self {
            buffer_budget_in_bytes: 64 * MIB,
            image_budget_in_bytes: 256 * MIB,
        }
    }
}

/// Numeric defaults supplied by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformDefaultValues {
    /// Total budget of staging memory used for uploads.
    pub staging_buffer_budget_in_bytes: u64,
    /// Size of the staging buffer used by the asynchronous upload queue.
    pub async_queue_staging_buffer_size_in_bytes: u64,
    /// Page size of medium staging allocations.
    pub medium_staging_buffer_page_size_in_bytes: u64,
    /// Page size of large staging allocations.
    pub large_staging_buffer_page_size_in_bytes: u64,
    /// Size of the staging buffer used for image uploads.
    pub image_staging_buffer_size_in_bytes: u64,
    /// Allocations above this size bypass pooling.
    pub largest_pooled_allocation_size_in_bytes: u64,
}

impl Default for PlatformDefaultValues {
    fn default() -> Self {
        Self {
            staging_buffer_budget_in_bytes: 256 * MIB,
            async_queue_staging_buffer_size_in_bytes: 4 * MIB,
            medium_staging_buffer_page_size_in_bytes: 4 * MIB,
            large_staging_buffer_page_size_in_bytes: 32 * MIB,
            image_staging_buffer_size_in_bytes: 64 * MIB,
            largest_pooled_allocation_size_in_bytes: 2 * MIB,
        }
    }
}

/// The per-platform limits handed to the RHI at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformLimits {
    /// Staging and pooling defaults.
    pub platform_default_values: PlatformDefaultValues,
    /// Budgets of the transient attachment heaps.
    pub transient_attachment_pool_budgets: TransientAttachmentPoolBudgets,
    /// Growth policy shared by the transient heaps.
    pub heap_allocation_strategy: HeapAllocationStrategy,
    /// Page sizing for [`HeapAllocationStrategy::Paging`].
    pub paging_parameters: HeapPagingParameters,
}

impl PlatformLimits {
    /// Loads platform limits from a `.ron` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> RhiResult<Self> {
        load_file(path.as_ref())
    }
}

/// Runtime configuration of an [`RhiContext`](crate::RhiContext).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhiConfig {
    /// How many physical devices to open. Zero opens every enumerated device.
    pub device_count: u32,
    /// Size of the frame fence ring, which bounds the number of frames in flight.
    pub frame_count: u32,
    /// Capacity of each per-queue command list pool.
    pub command_lists_per_queue: u32,
    /// How long acquiring a command list may block before the frame is aborted.
    pub command_list_acquire_timeout_ms: u64,
    /// How long a CPU wait on a fence may block.
    pub fence_wait_timeout_ms: u64,
    /// Records execute groups on worker threads.
    pub parallel_recording: bool,
    /// Merges consecutive scopes on the same queue into one execute group.
    pub merge_execute_groups: bool,
    /// Upper bound on the scopes merged into one group.
    pub max_scopes_per_group: u32,
    /// Scopes estimating more items than this are split across several command lists.
    pub items_per_command_list: u32,
    /// Per-platform tuning values.
    pub platform_limits: PlatformLimits,
}

impl Default for RhiConfig {
    fn default() -> Self {
        Self {
            device_count: 0,
            frame_count: 3,
            command_lists_per_queue: 16,
            command_list_acquire_timeout_ms: 2_000,
            fence_wait_timeout_ms: 5_000,
            parallel_recording: true,
            merge_execute_groups: true,
            max_scopes_per_group: 8,
            items_per_command_list: 1_024,
            platform_limits: PlatformLimits::default(),
        }
    }
}

impl RhiConfig {
    /// Loads a configuration from a `.ron` or `.json` file and validates it.
    pub fn load(path: impl AsRef<Path>) -> RhiResult<Self> {
        let config: Self = load_file(path.as_ref())?;
        Ok(config.validate())
    }

    /// Clamps out-of-range values, logging a warning for each correction.
    pub fn validate(mut self) -> Self {
        let clamped_frames = self.frame_count.clamp(1, MAX_FRAME_COUNT);
        if clamped_frames != self.frame_count {
            log::warn!(
                "RhiConfig: frame_count {} out of range, using {clamped_frames}",
                self.frame_count
            );
            self.frame_count = clamped_frames;
        }
        if self.command_lists_per_queue == 0 {
            log::warn!("RhiConfig: command_lists_per_queue must be at least 1, using 1");
            self.command_lists_per_queue = 1;
        }
        if self.max_scopes_per_group == 0 {
            log::warn!("RhiConfig: max_scopes_per_group must be at least 1, using 1");
            self.max_scopes_per_group = 1;
        }
        if self.items_per_command_list == 0 {
            log::warn!("RhiConfig: items_per_command_list must be at least 1, using 1");
            self.items_per_command_list = 1;
        }
        self
    }
}

fn load_file<T: DeserializeOwned>(path: &Path) -> RhiResult<T> {
    let display = path.display().to_string();
    let configuration_error = |reason: String| RhiError::Configuration {
        path: display.clone(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|e| configuration_error(e.to_string()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let value = match extension.as_deref() {
        Some("ron") => ron::from_str(&text).map_err(|e| configuration_error(e.to_string()))?,
        Some("json") => {
            serde_json::from_str(&text).map_err(|e| configuration_error(e.to_string()))?
        }
        other => {
            return Err(configuration_error(format!(
                "unsupported extension {other:?}, expected 'ron' or 'json'"
            )))
        }
    };
    log::info!("Loaded configuration from '{display}'");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResultCode;

    #[test]
    fn validate_clamps_out_of_range_values() {
        let config = RhiConfig {
            frame_count: 0,
            command_lists_per_queue: 0,
            max_scopes_per_group: 0,
            items_per_command_list: 0,
            ..Default::default()
        }
        .validate();
        assert_eq!(config.frame_count, 1);
        assert_eq!(config.command_lists_per_queue, 1);
        assert_eq!(config.max_scopes_per_group, 1);
        assert_eq!(config.items_per_command_list, 1);

        let config = RhiConfig {
            frame_count: 64,
            ..Default::default()
        }
        .validate();
        assert_eq!(config.frame_count, MAX_FRAME_COUNT);
    }

    #[test]
    fn load_platform_limits_from_ron_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.ron");
        std::fs::write(
            &path,
            "(heap_allocation_strategy: Paging, transient_attachment_pool_budgets: (buffer_budget_in_bytes: 1024))",
        )
        .unwrap();

        let limits = PlatformLimits::load(&path).unwrap();
        assert_eq!(limits.heap_allocation_strategy, HeapAllocationStrategy::Paging);
        assert_eq!(
            limits.transient_attachment_pool_budgets.buffer_budget_in_bytes,
            1024
        );
        assert_eq!(
            limits.transient_attachment_pool_budgets.image_budget_in_bytes,
            TransientAttachmentPoolBudgets::default().image_budget_in_bytes
        );
        assert_eq!(
            limits.platform_default_values,
            PlatformDefaultValues::default()
        );
    }

    #[test]
    fn load_config_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rhi.json");
        std::fs::write(
            &path,
            r#"{ "frame_count": 2, "parallel_recording": false, "platform_limits": { "heap_allocation_strategy": "MemoryHint" } }"#,
        )
        .unwrap();

        let config = RhiConfig::load(&path).unwrap();
        assert_eq!(config.frame_count, 2);
        assert!(!config.parallel_recording);
        assert_eq!(
            config.platform_limits.heap_allocation_strategy,
            HeapAllocationStrategy::MemoryHint
        );
        assert_eq!(config.command_lists_per_queue, 16);
    }

    #[test]
    fn unsupported_extension_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rhi.toml");
        std::fs::write(&path, "frame_count = 2").unwrap();

        let err = RhiConfig::load(&path).unwrap_err();
        assert!(matches!(err, RhiError::Configuration { .. }));
        assert_eq!(err.code(), ResultCode::Fail);
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = PlatformLimits::load("/definitely/not/here.ron").unwrap_err();
        assert!(matches!(err, RhiError::Configuration { .. }));
    }
}
