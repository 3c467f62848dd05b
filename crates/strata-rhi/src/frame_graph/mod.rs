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

//! The frame graph: scopes, the attachments they share, and their execution.
//!
//! A frame flows through the modules in order:
//!
//! - [`ScopeProducer`]s declare their scopes through a [`FrameGraphInterface`].
//! - The [`FrameGraphCompiler`] orders the scopes, places transient attachments
//!   and resolves views.
//! - Producers read the resolved views through a [`FrameGraphCompileContext`].
//! - The [`FrameGraphExecuter`] partitions the scopes into
//!   [`FrameGraphExecuteGroup`]s, records them and submits them through
//!   [`FrameGraphExecuteGroupHandler`]s.

mod attachment;
mod compile_context;
mod compiler;
mod database;
mod execute_context;
mod execute_group;
mod executer;
mod graph;
mod handler;
mod ids;
mod interface;
mod scope;

pub use self::attachment::{
    AttachmentDescriptor, AttachmentLifetime, AttachmentType, FrameAttachment, ScopeAttachment,
    ScopeAttachmentAccess, ScopeAttachmentUsage, ScopeAttachmentViewDescriptor,
};
pub use self::compile_context::FrameGraphCompileContext;
pub use self::compiler::FrameGraphCompiler;
pub use self::database::FrameGraphAttachmentDatabase;
pub use self::execute_context::FrameGraphExecuteContext;
pub use self::execute_group::{ExecuteGroupKind, FrameGraphExecuteGroup, RecordingGuard};
pub use self::executer::FrameGraphExecuter;
pub use self::graph::FrameGraph;
pub use self::handler::FrameGraphExecuteGroupHandler;
pub use self::ids::{AttachmentId, ScopeId};
pub use self::interface::FrameGraphInterface;
pub use self::scope::{Scope, ScopeProducer};
