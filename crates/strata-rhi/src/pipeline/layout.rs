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

//! Pipeline layout descriptors.

use crate::srg::ShaderResourceGroupLayout;

/// The shader resource groups and root constants a pipeline can access.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineLayoutDescriptor {
    /// A debug name.
    pub name: String,
    /// The group layouts, ordered by binding slot.
    pub srg_layouts: Vec<ShaderResourceGroupLayout>,
    /// The size of the root constant block.
    pub root_constant_byte_count: u32,
}

impl PipelineLayoutDescriptor {
    /// Creates a layout without groups or root constants.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            srg_layouts: Vec::new(),
            root_constant_byte_count: 0,
        }
    }

    /// Adds a group layout, keeping the list ordered by binding slot.
    pub fn with_srg_layout(mut self, layout: ShaderResourceGroupLayout) -> Self {
        let position = self
            .srg_layouts
            .partition_point(|existing| existing.binding_slot() <= layout.binding_slot());
        self.srg_layouts.insert(position, layout);
        self
    }

    /// Sets the size of the root constant block.
    pub fn with_root_constants(mut self, byte_count: u32) -> Self {
        self.root_constant_byte_count = byte_count;
        self
    }

    /// Finds the group layout bound at `binding_slot`.
    pub fn srg_layout_at(&self, binding_slot: u32) -> Option<&ShaderResourceGroupLayout> {
        self.srg_layouts
            .iter()
            .find(|layout| layout.binding_slot() == binding_slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_layouts_are_ordered_by_slot() {
        let layout = PipelineLayoutDescriptor::new("forward")
            .with_srg_layout(ShaderResourceGroupLayout::new("draw", 3))
            .with_srg_layout(ShaderResourceGroupLayout::new("view", 0))
            .with_srg_layout(ShaderResourceGroupLayout::new("material", 2));
        let names: Vec<&str> = layout.srg_layouts.iter().map(|l| l.name()).collect();
        assert_eq!(names, ["view", "material", "draw"]);
        assert_eq!(layout.srg_layout_at(2).map(|l| l.name()), Some("material"));
        assert!(layout.srg_layout_at(1).is_none());
    }
}
