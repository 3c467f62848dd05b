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

use super::compile_context::FrameGraphCompileContext;
use crate::backend::GraphicsBackend;
use crate::command::CommandList;
use std::ops::Range;

/// What a producer sees while recording its scope.
///
/// When a scope is split across several command lists, the producer is called
/// once per list and records only the items in [`item_range`](Self::item_range).
pub struct FrameGraphExecuteContext<'a, B: GraphicsBackend> {
    command_list: &'a mut CommandList<B>,
    compile_context: FrameGraphCompileContext<'a>,
    command_list_index: u32,
    command_list_count: u32,
    item_range: Range<u32>,
}

impl<'a, B: GraphicsBackend> FrameGraphExecuteContext<'a, B> {
    pub(crate) fn new(
        command_list: &'a mut CommandList<B>,
        compile_context: FrameGraphCompileContext<'a>,
        command_list_index: u32,
        command_list_count: u32,
        item_range: Range<u32>,
    ) -> Self {
        Self {
            command_list,
            compile_context,
            command_list_index,
            command_list_count,
            item_range,
        }
    }

    /// The list to record into.
    pub fn command_list(&mut self) -> &mut CommandList<B> {
        self.command_list
    }

    /// Resolves the scope's attachments.
    pub fn compile_context(&self) -> &FrameGraphCompileContext<'a> {
        &self.compile_context
    }

    /// The position of this list among the lists of the scope.
    pub fn command_list_index(&self) -> u32 {
        self.command_list_index
    }

    /// The number of lists the scope is recorded into.
    pub fn command_list_count(&self) -> u32 {
        self.command_list_count
    }

    /// The items to record into this list.
    pub fn item_range(&self) -> Range<u32> {
        self.item_range.clone()
    }
}
