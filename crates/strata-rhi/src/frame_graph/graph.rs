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

use super::scope::Scope;
use super::ScopeId;
use crate::error::{RhiError, RhiResult};
use crate::queue::HardwareQueueClass;
use std::collections::HashMap;

/// The scopes of one frame, in declaration order, plus their compiled order.
#[derive(Debug, Default)]
pub struct FrameGraph {
    scopes: Vec<Scope>,
    lookup: HashMap<ScopeId, usize>,
    order: Vec<usize>,
}

impl FrameGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a scope and returns its index.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if a scope with the same id exists.
    pub fn add_scope(&mut self, id: ScopeId, queue_class: HardwareQueueClass) -> RhiResult<usize> {
        if self.lookup.contains_key(&id) {
            return Err(RhiError::invalid_argument(format!(
                "scope '{id}' was already added this frame"
            )));
        }
        let index = self.scopes.len();
        self.lookup.insert(id.clone(), index);
        self.scopes.push(Scope::new(id, queue_class));
        self.order.clear();
        Ok(index)
    }

    /// A scope by index.
    pub fn scope(&self, index: usize) -> Option<&Scope> {
        self.scopes.get(index)
    }

    pub(crate) fn scope_mut(&mut self, index: usize) -> Option<&mut Scope> {
        self.scopes.get_mut(index)
    }

    pub(crate) fn scopes_mut(&mut self) -> &mut [Scope] {
        &mut self.scopes
    }

    /// The index of a scope by id.
    pub fn find_scope(&self, id: &ScopeId) -> Option<usize> {
        self.lookup.get(id).copied()
    }

    /// Every scope in declaration order.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// The number of scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Scope indices in execution order. Empty until compiled.
    pub fn compiled_order(&self) -> &[usize] {
        &self.order
    }

    /// Checks if the graph was compiled since the last change.
    pub fn is_compiled(&self) -> bool {
        !self.order.is_empty() || self.scopes.is_empty()
    }

    pub(crate) fn set_compiled_order(&mut self, order: Vec<usize>) {
        self.order = order;
    }

    /// Removes every scope.
    pub fn clear(&mut self) {
        self.scopes.clear();
        self.lookup.clear();
        self.order.clear();
    }
}
