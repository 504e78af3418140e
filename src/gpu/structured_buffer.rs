//! Typed GPU arrays with discard-on-write uploads and a staging read path.
//!
//! The hot per-frame path is [`StructuredBuffer::map_discard`] followed by
//! [`StructuredBuffer::unmap`]: the caller overwrites a CPU shadow and the
//! unmap hands it to `queue.write_buffer`, whose staging belt gives the
//! fresh-region guarantee the GPU needs to keep reading last frame's data.
//! [`StructuredBuffer::map`] is the blocking inspection path.

use std::marker::PhantomData;
use std::sync::mpsc;

use crate::error::LightcullError;

/// A flat GPU array of `T`, whose byte layout must match the WGSL struct it
/// is bound as.
pub struct StructuredBuffer<T> {
    buffer: wgpu::Buffer,
    label: String,
    len: usize,
    dynamic: bool,
    /// CPU copy handed out by `map_discard`; its old contents are garbage.
    shadow: Vec<T>,
    discard_mapped: bool,
    staging: Option<wgpu::Buffer>,
    staging_mapped: bool,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod> StructuredBuffer<T> {
    /// Element stride in bytes.
    pub const STRIDE: usize = std::mem::size_of::<T>();

    /// Buffer holding exactly `len` elements.
    ///
    /// `usage` names how shaders see it (usually `STORAGE`); copy usages for
    /// uploads and inspection are added here. Zero-length buffers keep a
    /// minimal backing allocation so they can still be bound.
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        len: usize,
        usage: wgpu::BufferUsages,
        dynamic: bool,
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: Self::allocation_size(len),
            usage: usage
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            label: label.to_owned(),
            len,
            dynamic,
            shadow: Vec::new(),
            discard_mapped: false,
            staging: None,
            staging_mapped: false,
            _marker: PhantomData,
        }
    }

    /// Bytes actually allocated for `len` elements.
    #[must_use]
    pub fn allocation_size(len: usize) -> u64 {
        let bytes = (len * Self::STRIDE).max(Self::STRIDE).max(4) as u64;
        bytes.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Whole-buffer binding resource.
    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    /// Number of logical elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when the buffer holds no logical elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical size in bytes (`len * STRIDE`).
    pub fn byte_size(&self) -> u64 {
        (self.len * Self::STRIDE) as u64
    }

    /// Map for a full overwrite. Returns every element; their prior contents
    /// must be treated as garbage.
    ///
    /// # Panics
    ///
    /// Panics if the buffer was created non-dynamic.
    pub fn map_discard(&mut self) -> &mut [T] {
        assert!(
            self.dynamic,
            "map_discard on non-dynamic buffer '{}'",
            self.label
        );
        self.release_staging();
        self.shadow.resize(self.len, T::zeroed());
        self.discard_mapped = true;
        &mut self.shadow
    }

    /// Copy the device contents into a lazily created staging buffer, map it,
    /// and return the elements. Blocks until the GPU has finished; never
    /// call this in the per-frame path.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::BufferMap`] if the staging buffer could not
    /// be mapped.
    pub fn map(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<T>, LightcullError> {
        self.unmap(queue);
        if self.len == 0 {
            return Ok(Vec::new());
        }

        let size = Self::allocation_size(self.len);
        let staging = self.staging.get_or_insert_with(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{} Staging", self.label)),
                size,
                usage: wgpu::BufferUsages::MAP_READ
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Structured Buffer Readback"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, staging, 0, size);
        let _ = queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..size);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = device.poll(wgpu::PollType::Wait);
        receiver
            .recv()
            .map_err(|_| LightcullError::BufferMap(wgpu::BufferAsyncError))?
            .map_err(LightcullError::BufferMap)?;
        self.staging_mapped = true;

        let data = slice.get_mapped_range();
        let elements = data
            .chunks_exact(Self::STRIDE)
            .take(self.len)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        drop(data);
        Ok(elements)
    }

    /// Release whichever mapping is active. A discard mapping is uploaded;
    /// a staging mapping is unmapped. Without an active mapping this does
    /// nothing.
    pub fn unmap(&mut self, queue: &wgpu::Queue) {
        if self.discard_mapped {
            if !self.shadow.is_empty() {
                queue.write_buffer(
                    &self.buffer,
                    0,
                    bytemuck::cast_slice(&self.shadow),
                );
            }
            self.discard_mapped = false;
        }
        self.release_staging();
    }

    fn release_staging(&mut self) {
        if self.staging_mapped {
            if let Some(staging) = &self.staging {
                staging.unmap();
            }
            self.staging_mapped = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::headless_context;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Pattern {
        index: u32,
        value: f32,
        tag: [u32; 3],
    }

    fn pattern(n: usize) -> Vec<Pattern> {
        (0..n)
            .map(|i| Pattern {
                index: i as u32,
                value: i as f32 * 0.5 - 3.0,
                tag: [0xDEAD_0000 | i as u32, 7, u32::MAX - i as u32],
            })
            .collect()
    }

    #[test]
    fn allocation_never_collapses_to_zero() {
        assert_eq!(StructuredBuffer::<Pattern>::allocation_size(0), 20);
        assert_eq!(StructuredBuffer::<Pattern>::allocation_size(3), 60);
        assert_eq!(StructuredBuffer::<u8>::allocation_size(1), 4);
    }

    #[test]
    fn discard_then_staging_round_trip() {
        let Some(ctx) = headless_context() else {
            return;
        };
        for n in [0, 1, 16] {
            let mut buffer = StructuredBuffer::<Pattern>::new(
                &ctx.device,
                "round trip",
                n,
                wgpu::BufferUsages::STORAGE,
                true,
            );
            let expected = pattern(n);
            buffer.map_discard().copy_from_slice(&expected);
            buffer.unmap(&ctx.queue);

            let read = buffer.map(&ctx.device, &ctx.queue).unwrap();
            buffer.unmap(&ctx.queue);
            assert_eq!(read, expected, "round trip of {n} elements");
        }
    }

    #[test]
    fn unmap_without_map_is_a_no_op() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let mut buffer = StructuredBuffer::<u32>::new(
            &ctx.device,
            "idle",
            4,
            wgpu::BufferUsages::STORAGE,
            false,
        );
        buffer.unmap(&ctx.queue);
        buffer.unmap(&ctx.queue);
        assert_eq!(buffer.map(&ctx.device, &ctx.queue).unwrap(), vec![0; 4]);
    }
}
