//! Descriptor set layouts, pipeline layouts, and the descriptor pool.
//!
//! The layout builders are order-sensitive accumulators: bindings and set
//! layouts take effect in append order, and `build` consumes the builder
//! by value so it cannot be reused afterwards.

use crate::error::{GpuError, Result};
use ash::vk;

/// One declared binding inside a descriptor set layout.
#[derive(Debug, Clone, Copy)]
struct BindingDecl {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    count: u32,
    stage_flags: vk::ShaderStageFlags,
}

/// Descriptor set layout builder.
///
/// Binding indices default to append order; `binding_at` assigns an
/// explicit index instead.
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<BindingDecl>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Append a binding at the next index.
    pub fn binding(
        mut self,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        let binding = self.bindings.len() as u32;
        self.bindings.push(BindingDecl {
            binding,
            descriptor_type,
            count: 1,
            stage_flags,
        });
        self
    }

    /// Append a binding with an explicit index.
    pub fn binding_at(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(BindingDecl {
            binding,
            descriptor_type,
            count,
            stage_flags,
        });
        self
    }

    /// Append a uniform buffer binding.
    pub fn uniform_buffer(self, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Append a combined image sampler binding.
    pub fn combined_image_sampler(self, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    /// The binding indices assigned so far, in append order.
    pub fn binding_indices(&self) -> Vec<u32> {
        self.bindings.iter().map(|b| b.binding).collect()
    }

    /// Build the descriptor set layout, consuming the builder.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .bindings
            .iter()
            .map(|decl| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(decl.binding)
                    .descriptor_type(decl.descriptor_type)
                    .descriptor_count(decl.count)
                    .stage_flags(decl.stage_flags)
            })
            .collect();

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = device.create_descriptor_set_layout(&layout_info, None)?;
        Ok(layout)
    }
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipeline layout builder. Set layouts bind at the index they were
/// appended at.
pub struct PipelineLayoutBuilder {
    set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl PipelineLayoutBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
        }
    }

    /// Append a descriptor set layout.
    pub fn set_layout(mut self, layout: vk::DescriptorSetLayout) -> Self {
        self.set_layouts.push(layout);
        self
    }

    /// Append a push constant range.
    pub fn push_constant_range(
        mut self,
        stage_flags: vk::ShaderStageFlags,
        offset: u32,
        size: u32,
    ) -> Self {
        self.push_constant_ranges.push(
            vk::PushConstantRange::default()
                .stage_flags(stage_flags)
                .offset(offset)
                .size(size),
        );
        self
    }

    /// Build the pipeline layout, consuming the builder.
    ///
    /// # Safety
    /// The device and all appended layouts must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::PipelineLayout> {
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&self.set_layouts)
            .push_constant_ranges(&self.push_constant_ranges);

        let layout = device.create_pipeline_layout(&layout_info, None)?;
        Ok(layout)
    }
}

impl Default for PipelineLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// CPU-side accounting for a fixed-capacity pool.
///
/// Capacity is a configuration constant; the pool never grows, so
/// exhaustion must surface as a typed error rather than a driver fault.
#[derive(Debug, Clone, Copy)]
pub struct SetBudget {
    max_sets: u32,
    allocated: u32,
}

impl SetBudget {
    /// Create a budget for `max_sets` descriptor sets.
    pub fn new(max_sets: u32) -> Self {
        Self {
            max_sets,
            allocated: 0,
        }
    }

    /// Sets still available.
    pub fn available(&self) -> u32 {
        self.max_sets - self.allocated
    }

    /// Reserve `count` sets, failing if the budget is exhausted.
    pub fn reserve(&mut self, count: u32) -> Result<()> {
        if count > self.available() {
            return Err(GpuError::DescriptorPoolExhausted {
                requested: count,
                available: self.available(),
            });
        }
        self.allocated += count;
        Ok(())
    }

    /// Return `count` sets to the budget.
    pub fn release(&mut self, count: u32) {
        self.allocated = self.allocated.saturating_sub(count);
    }
}

/// Descriptor pool with fixed static capacity.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    budget: SetBudget,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = device.create_descriptor_pool(&create_info, None)?;
        Ok(Self {
            pool,
            budget: SetBudget::new(max_sets),
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Descriptor sets still available.
    pub fn available_sets(&self) -> u32 {
        self.budget.available()
    }

    /// Allocate descriptor sets, failing with
    /// [`GpuError::DescriptorPoolExhausted`] when the fixed capacity is
    /// exceeded.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &mut self,
        device: &ash::Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        self.budget.reserve(layouts.len() as u32)?;

        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        match device.allocate_descriptor_sets(&alloc_info) {
            Ok(sets) => Ok(sets),
            Err(e) => {
                self.budget.release(layouts.len() as u32);
                Err(GpuError::from(e))
            }
        }
    }

    /// Free descriptor sets, returning their capacity to the pool.
    ///
    /// # Safety
    /// The device must be valid and the sets must not be in use.
    pub unsafe fn free(&mut self, device: &ash::Device, sets: &[vk::DescriptorSet]) -> Result<()> {
        device.free_descriptor_sets(self.pool, sets)?;
        self.budget.release(sets.len() as u32);
        Ok(())
    }

    /// Destroy the pool.
    ///
    /// # Safety
    /// The device must be valid and no set from this pool may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}

/// Write a uniform buffer descriptor.
///
/// # Safety
/// Device and buffer must be valid; the set must not be in use by an
/// in-flight command buffer.
pub unsafe fn write_uniform_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(&buffer_info));

    device.update_descriptor_sets(&[write], &[]);
}

/// Write a combined image sampler descriptor.
///
/// # Safety
/// Device, image view, and sampler must be valid; the set must not be in
/// use by an in-flight command buffer.
pub unsafe fn write_combined_image_sampler(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .sampler(sampler)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(std::slice::from_ref(&image_info));

    device.update_descriptor_sets(&[write], &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_indices_follow_append_order() {
        let builder = DescriptorSetLayoutBuilder::new()
            .combined_image_sampler(vk::ShaderStageFlags::FRAGMENT)
            .uniform_buffer(vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(vk::ShaderStageFlags::FRAGMENT);

        assert_eq!(builder.binding_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn explicit_indices_are_preserved() {
        let builder = DescriptorSetLayoutBuilder::new()
            .binding_at(
                4,
                vk::DescriptorType::UNIFORM_BUFFER,
                1,
                vk::ShaderStageFlags::VERTEX,
            )
            .binding_at(
                2,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                1,
                vk::ShaderStageFlags::FRAGMENT,
            );

        assert_eq!(builder.binding_indices(), vec![4, 2]);
    }

    #[test]
    fn budget_rejects_allocation_past_capacity() {
        let mut budget = SetBudget::new(512);
        budget.reserve(512).unwrap();

        let err = budget.reserve(1).unwrap_err();
        assert!(matches!(
            err,
            GpuError::DescriptorPoolExhausted {
                requested: 1,
                available: 0
            }
        ));
    }

    #[test]
    fn budget_recovers_after_release() {
        let mut budget = SetBudget::new(2);
        budget.reserve(2).unwrap();
        assert!(budget.reserve(1).is_err());

        budget.release(1);
        assert_eq!(budget.available(), 1);
        budget.reserve(1).unwrap();
    }

    #[test]
    fn multi_set_request_fails_atomically() {
        let mut budget = SetBudget::new(3);
        budget.reserve(2).unwrap();

        assert!(budget.reserve(2).is_err());
        // The failed request must not consume capacity.
        assert_eq!(budget.available(), 1);
    }
}
