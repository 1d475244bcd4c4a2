//! Fixed-capacity uniform arena.
//!
//! One GPU buffer is allocated at startup and never resized. Each upload maps the
//! arena, bump-allocates blocks from offset zero, then unmaps, which copies the
//! written prefix to the GPU. Blocks are later bound through dynamic offsets.

use bytemuck::Pod;
use glam::{Mat4, Vec3, Vec4};

use crate::error::ArenaError;

/// Byte range of one block inside the arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniformRange {
    pub offset: u32,
    pub size: u32,
}

impl UniformRange {
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }

    pub fn overlaps(&self, other: &UniformRange) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// CPU side of the arena: staging bytes, write head and mapping state.
#[derive(Debug)]
pub struct UniformArena {
    staging: Vec<u8>,
    head: usize,
    alignment: usize,
    mapped: bool,
}

impl UniformArena {
    /// `alignment` is the hardware's dynamic uniform offset alignment.
    pub fn new(capacity: usize, alignment: usize) -> Self {
        Self {
            staging: vec![0; capacity],
            head: 0,
            alignment: alignment.max(1),
            mapped: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.staging.len()
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn begin_write(&mut self) -> Result<(), ArenaError> {
        if self.mapped {
            return Err(ArenaError::AlreadyMapped);
        }
        self.mapped = true;
        self.head = 0;
        Ok(())
    }

    /// Closes the write sequence and returns the bytes that must reach the GPU.
    pub fn end_write(&mut self) -> Result<&[u8], ArenaError> {
        if !self.mapped {
            return Err(ArenaError::NotMapped);
        }
        self.mapped = false;
        Ok(&self.staging[..self.head])
    }

    /// Advances the head to the next multiple of `alignment`. Skipped bytes are left as they were.
    pub fn align_head(&mut self, alignment: usize) -> Result<(), ArenaError> {
        if !self.mapped {
            return Err(ArenaError::NotMapped);
        }
        let aligned = align_up(self.head, alignment);
        if aligned > self.capacity() {
            return Err(self.overflow(aligned - self.head));
        }
        self.head = aligned;
        Ok(())
    }

    /// Aligns to the hardware uniform offset alignment.
    pub fn align_to_binding(&mut self) -> Result<(), ArenaError> {
        self.align_head(self.alignment)
    }

    /// Moves the head forward to `offset` so a block's declared size is reserved
    /// even if fewer bytes were written into it.
    pub fn reserve_to(&mut self, offset: usize) -> Result<(), ArenaError> {
        if !self.mapped {
            return Err(ArenaError::NotMapped);
        }
        if offset > self.capacity() {
            return Err(self.overflow(offset - self.head));
        }
        self.head = self.head.max(offset);
        Ok(())
    }

    /// Appends the raw bytes of `value` and returns the offset they were written at.
    pub fn push<T: Pod>(&mut self, value: &T) -> Result<usize, ArenaError> {
        self.push_bytes(bytemuck::bytes_of(value))
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<usize, ArenaError> {
        if !self.mapped {
            return Err(ArenaError::NotMapped);
        }
        let end = self.head + bytes.len();
        if end > self.capacity() {
            return Err(self.overflow(bytes.len()));
        }
        let offset = self.head;
        self.staging[offset..end].copy_from_slice(bytes);
        self.head = end;
        Ok(offset)
    }

    pub fn push_u32(&mut self, value: u32) -> Result<usize, ArenaError> {
        self.align_head(4)?;
        self.push(&value)
    }

    pub fn push_f32(&mut self, value: f32) -> Result<usize, ArenaError> {
        self.align_head(4)?;
        self.push(&value)
    }

    pub fn push_vec3(&mut self, value: Vec3) -> Result<usize, ArenaError> {
        self.align_head(16)?;
        self.push(&value.to_array())
    }

    pub fn push_vec4(&mut self, value: Vec4) -> Result<usize, ArenaError> {
        self.align_head(16)?;
        self.push(&value.to_array())
    }

    pub fn push_mat4(&mut self, value: &Mat4) -> Result<usize, ArenaError> {
        self.align_head(16)?;
        self.push(&value.to_cols_array())
    }

    /// Contents written so far in the current (or last) sequence.
    pub fn written(&self) -> &[u8] {
        &self.staging[..self.head]
    }

    fn overflow(&self, requested: usize) -> ArenaError {
        ArenaError::Overflow {
            head: self.head,
            requested,
            capacity: self.capacity(),
        }
    }
}

/// The arena plus the GPU buffer it streams into.
pub struct GpuUniformArena {
    cpu: UniformArena,
    buffer: wgpu::Buffer,
}

impl GpuUniformArena {
    /// Capacity is the smaller of the configured cap and the device's uniform binding limit.
    pub fn new(device: &wgpu::Device, requested_capacity: u32) -> Self {
        let limits = device.limits();
        let capacity = requested_capacity.min(limits.max_uniform_buffer_binding_size);
        let alignment = limits.min_uniform_buffer_offset_alignment;
        log::info!(
            "Uniform arena: {} bytes, offset alignment {}",
            capacity,
            alignment
        );

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Arena"),
            size: capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            cpu: UniformArena::new(capacity as usize, alignment as usize),
            buffer,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn begin_write(&mut self) -> Result<&mut UniformArena, ArenaError> {
        self.cpu.begin_write()?;
        Ok(&mut self.cpu)
    }

    /// Copies the written prefix to the GPU. It becomes visible to the next submission.
    pub fn end_write(&mut self, queue: &wgpu::Queue) -> Result<(), ArenaError> {
        let bytes = self.cpu.end_write()?;
        if !bytes.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytes);
        }
        Ok(())
    }

    pub fn cpu(&self) -> &UniformArena {
        &self.cpu
    }
}
