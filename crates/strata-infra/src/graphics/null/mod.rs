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

//! A headless backend that executes on the CPU.
//!
//! Command lists record their commands as data. A queue replays them on its
//! worker thread when they are submitted: waits block on the fence, every other
//! command is appended to a shared [`ExecutionLog`], then the signal fence is
//! raised. The log therefore reflects the order in which a real GPU would have
//! been allowed to run the work.

mod backend;
mod command;
mod execution_log;
mod fence;
mod pipeline;
mod queue;
mod srg;

pub use self::backend::{NullBackend, NullBackendDescriptor, NullDevice};
pub use self::command::{NullCommand, NullCommandList};
pub use self::execution_log::{ExecutedCommand, ExecutionLog, NullCommandKind};
pub use self::fence::NullFence;
pub use self::pipeline::{NullPipelineLibrary, NullPipelineState};
pub use self::queue::NullQueue;
pub use self::srg::NullShaderResourceGroup;
