//! How mapper draws are issued on each device model.

use crate::error::RenderResult;
use crate::resource::{Binding, BufferId, Device, PipelineId};

/// One indexed primitive of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimitiveDraw {
    pub pipeline: PipelineId,
    pub index_buffer: BufferId,
    pub count: u32,
}

/// Everything needed to draw one block of a mapper.
pub struct BlockDraw<'a> {
    /// Bind groups by group index.
    pub groups: &'a [(u32, Vec<Binding>)],
    /// Vertex buffers by slot.
    pub vertex_buffers: &'a [BufferId],
    pub primitives: &'a [PrimitiveDraw],
}

/// The backend-specific half of a mapper node.
pub trait MapperBackend: Default + 'static {
    /// Node class name reported by [`MapperNode`](super::MapperNode).
    const NAME: &'static str;

    fn draw_block(&mut self, device: &mut dyn Device, draw: &BlockDraw<'_>) -> RenderResult<()>;
}

/// Global-state devices: bindings and vertex buffers stay bound across
/// pipeline changes, so they are set once per block.
#[derive(Default)]
pub struct ImmediateMapper;

impl MapperBackend for ImmediateMapper {
    const NAME: &'static str = "ImmediateMapper";

    fn draw_block(&mut self, device: &mut dyn Device, draw: &BlockDraw<'_>) -> RenderResult<()> {
        for (group, bindings) in draw.groups {
            device.set_bindings(*group, bindings)?;
        }
        for (slot, buffer) in draw.vertex_buffers.iter().enumerate() {
            device.set_vertex_buffer(slot as u32, *buffer)?;
        }
        for primitive in draw.primitives {
            device.set_pipeline(primitive.pipeline)?;
            device.set_index_buffer(primitive.index_buffer)?;
            device.draw_indexed(0..primitive.count)?;
        }
        Ok(())
    }
}

/// Pipeline-baked devices: bind groups are built against the bound
/// pipeline's layout, so every primitive binds its pipeline first and then
/// everything it reads.
#[derive(Default)]
pub struct ExplicitMapper {
    draws: u64,
}

impl ExplicitMapper {
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

impl MapperBackend for ExplicitMapper {
    const NAME: &'static str = "ExplicitMapper";

    fn draw_block(&mut self, device: &mut dyn Device, draw: &BlockDraw<'_>) -> RenderResult<()> {
        for primitive in draw.primitives {
            device.set_pipeline(primitive.pipeline)?;
            for (group, bindings) in draw.groups {
                device.set_bindings(*group, bindings)?;
            }
            for (slot, buffer) in draw.vertex_buffers.iter().enumerate() {
                device.set_vertex_buffer(slot as u32, *buffer)?;
            }
            device.set_index_buffer(primitive.index_buffer)?;
            device.draw_indexed(0..primitive.count)?;
            self.draws += 1;
        }
        Ok(())
    }
}
