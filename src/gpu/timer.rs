//! GPU timestamp brackets around the three logical frame stages.
//!
//! Each stage owns a start and an end timestamp. The executor attaches them
//! to the first and last pass of the stage through the pass descriptors'
//! `timestamp_writes`. Results are resolved into a ring of readback buffers
//! and read back without stalling: [`FrameTimer::poll`] never blocks, and a
//! stage reads [`TimerReading::NotReady`] until its first frame lands.
//!
//! wgpu exposes no disjoint query. A stage whose end does not follow its
//! start, or whose timestamps are zero, is reported as
//! [`TimerReading::Disjoint`] and contributes 0 ms.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Logical frame stages that carry a timestamp bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuStage {
    /// Depth prepass, forward shading or G-buffer fill.
    Forward,
    /// Light culling and accumulation.
    Lighting,
    /// Resolve and tonemap into the output.
    Resolve,
}

impl GpuStage {
    /// Every stage in frame order.
    pub const ALL: [Self; 3] = [Self::Forward, Self::Lighting, Self::Resolve];
    /// Number of stages.
    pub const COUNT: usize = Self::ALL.len();

    /// Position in frame order.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Forward => 0,
            Self::Lighting => 1,
            Self::Resolve => 2,
        }
    }

    const fn begin_query(self) -> u32 {
        self.index() as u32 * 2
    }

    const fn end_query(self) -> u32 {
        self.index() as u32 * 2 + 1
    }
}

/// Result of reading one stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerReading {
    /// No resolved frame has come back yet.
    NotReady,
    /// The clock was unusable for the interval; report zero.
    Disjoint,
    /// Elapsed GPU time in milliseconds.
    Elapsed(f32),
}

impl TimerReading {
    /// Milliseconds to display, or `None` when not ready.
    #[must_use]
    pub fn millis(self) -> Option<f32> {
        match self {
            Self::NotReady => None,
            Self::Disjoint => Some(0.0),
            Self::Elapsed(ms) => Some(ms),
        }
    }

    /// Interpret a start/end timestamp pair.
    #[must_use]
    pub fn from_timestamps(start: u64, end: u64, period_ns: f32) -> Self {
        if start == 0 || end <= start {
            Self::Disjoint
        } else {
            Self::Elapsed((end - start) as f32 * period_ns / 1_000_000.0)
        }
    }
}

const QUERY_COUNT: u32 = GpuStage::COUNT as u32 * 2;
const RESOLVE_SIZE: u64 = QUERY_COUNT as u64 * 8;
const RING: usize = 3;

const MAP_WAITING: u8 = 0;
const MAP_OK: u8 = 1;
const MAP_FAILED: u8 = 2;

/// Stage readings of one resolved frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTimes<T> {
    /// Monotonic id of the frame, in resolve order.
    pub frame: u64,
    /// Caller tag passed to [`FrameTimer::resolve`] for that frame.
    pub tag: T,
    /// Per-stage readings indexed by [`GpuStage::index`].
    pub readings: [TimerReading; GpuStage::COUNT],
}

impl<T> StageTimes<T> {
    /// Keep whichever of `latest` and `landed` is the newer frame. Returns
    /// `true` when `landed` replaced it.
    fn keep_newest(latest: &mut Option<Self>, landed: Self) -> bool {
        if latest.as_ref().is_some_and(|l| l.frame >= landed.frame) {
            return false;
        }
        *latest = Some(landed);
        true
    }
}

/// Frame id and tag of the frame a readback slot holds.
#[derive(Debug, Clone, Copy)]
struct Stamped<T> {
    frame: u64,
    tag: T,
}

enum Slot<T> {
    Free,
    /// Copy encoded, map not yet requested.
    Encoded(Stamped<T>),
    /// Map requested, not yet consumed.
    Mapping(Stamped<T>),
}

struct Readback<T> {
    buffer: wgpu::Buffer,
    map_state: Arc<AtomicU8>,
    slot: Slot<T>,
}

struct TimestampQueries<T> {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    ring: [Readback<T>; RING],
    next: usize,
    period_ns: f32,
}

/// Per-stage GPU timer. Each resolved frame carries a caller tag `T`, so
/// readings stay attached to whatever produced them.
pub struct FrameTimer<T> {
    queries: Option<TimestampQueries<T>>,
    frames: u64,
    /// Newest frame that got a readback slot.
    last_resolved: Option<u64>,
    latest: Option<StageTimes<T>>,
}

impl<T: Copy> FrameTimer<T> {
    /// Create the query set and readback ring, or a timer that reports
    /// every stage as disjoint when the device lacks timestamp queries.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        if !device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            log::warn!("timestamp queries unsupported; GPU stage times read as 0");
            return Self {
                queries: None,
                frames: 0,
                last_resolved: None,
                latest: None,
            };
        }

        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("Stage Timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: QUERY_COUNT,
        });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Stage Timestamp Resolve"),
            size: RESOLVE_SIZE,
            usage: wgpu::BufferUsages::QUERY_RESOLVE
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let ring = [0, 1, 2].map(|i| Readback {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Stage Timestamp Readback {i}")),
                size: RESOLVE_SIZE,
                usage: wgpu::BufferUsages::MAP_READ
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            map_state: Arc::new(AtomicU8::new(MAP_WAITING)),
            slot: Slot::Free,
        });
        let period_ns = queue.get_timestamp_period();
        log::info!("GPU timestamp period {period_ns:.3} ns");

        Self {
            queries: Some(TimestampQueries {
                query_set,
                resolve_buffer,
                ring,
                next: 0,
                period_ns,
            }),
            frames: 0,
            last_resolved: None,
            latest: None,
        }
    }

    /// Timestamp writes for a render pass that begins and/or ends `stage`.
    pub fn render_pass_writes(
        &self,
        stage: GpuStage,
        begins: bool,
        ends: bool,
    ) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        let queries = self.queries.as_ref()?;
        (begins || ends).then(|| wgpu::RenderPassTimestampWrites {
            query_set: &queries.query_set,
            beginning_of_pass_write_index: begins.then(|| stage.begin_query()),
            end_of_pass_write_index: ends.then(|| stage.end_query()),
        })
    }

    /// Timestamp writes for a compute pass that begins and/or ends `stage`.
    pub fn compute_pass_writes(
        &self,
        stage: GpuStage,
        begins: bool,
        ends: bool,
    ) -> Option<wgpu::ComputePassTimestampWrites<'_>> {
        let queries = self.queries.as_ref()?;
        (begins || ends).then(|| wgpu::ComputePassTimestampWrites {
            query_set: &queries.query_set,
            beginning_of_pass_write_index: begins.then(|| stage.begin_query()),
            end_of_pass_write_index: ends.then(|| stage.end_query()),
        })
    }

    /// Resolve this frame's timestamps, tagged with `tag`, into the next
    /// free readback buffer. Skips the frame when that buffer is still in
    /// flight.
    pub fn resolve(&mut self, encoder: &mut wgpu::CommandEncoder, tag: T) {
        let frame = self.frames;
        self.frames += 1;
        let Some(queries) = self.queries.as_mut() else {
            return;
        };
        let index = queries.next;
        let readback = &mut queries.ring[index];
        if !matches!(readback.slot, Slot::Free) {
            log::trace!("timestamp readback {index} still in flight, skipping frame {frame}");
            return;
        }
        encoder.resolve_query_set(
            &queries.query_set,
            0..QUERY_COUNT,
            &queries.resolve_buffer,
            0,
        );
        encoder.copy_buffer_to_buffer(
            &queries.resolve_buffer,
            0,
            &readback.buffer,
            0,
            RESOLVE_SIZE,
        );
        readback.slot = Slot::Encoded(Stamped { frame, tag });
        queries.next = (index + 1) % RING;
        self.last_resolved = Some(frame);
    }

    /// Request maps for readbacks encoded into the frame just submitted.
    pub fn after_submit(&mut self) {
        let Some(queries) = self.queries.as_mut() else {
            return;
        };
        for readback in &mut queries.ring {
            let Slot::Encoded(stamped) = readback.slot else {
                continue;
            };
            readback.slot = Slot::Mapping(stamped);
            readback.map_state.store(MAP_WAITING, Ordering::SeqCst);
            let state = Arc::clone(&readback.map_state);
            readback
                .buffer
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let landed = if result.is_ok() { MAP_OK } else { MAP_FAILED };
                    state.store(landed, Ordering::SeqCst);
                });
        }
    }

    /// Non-blocking: consume every readback that has landed and keep the
    /// newest frame among them. Returns `true` when newer stage times
    /// arrived.
    pub fn poll(&mut self, device: &wgpu::Device) -> bool {
        let Some(queries) = self.queries.as_mut() else {
            return false;
        };
        let _ = device.poll(wgpu::PollType::Poll);

        let mut updated = false;
        for readback in &mut queries.ring {
            let Slot::Mapping(stamped) = readback.slot else {
                continue;
            };
            match readback.map_state.load(Ordering::SeqCst) {
                MAP_OK => {}
                MAP_FAILED => {
                    log::warn!("timestamp readback of frame {} failed", stamped.frame);
                    readback.slot = Slot::Free;
                    continue;
                }
                _ => continue,
            }
            let data = readback.buffer.slice(..).get_mapped_range();
            let stamps: [u64; QUERY_COUNT as usize] =
                bytemuck::pod_read_unaligned(&data[..RESOLVE_SIZE as usize]);
            drop(data);
            readback.buffer.unmap();
            readback.slot = Slot::Free;

            let landed = StageTimes {
                frame: stamped.frame,
                tag: stamped.tag,
                readings: GpuStage::ALL.map(|stage| {
                    TimerReading::from_timestamps(
                        stamps[stage.begin_query() as usize],
                        stamps[stage.end_query() as usize],
                        queries.period_ns,
                    )
                }),
            };
            updated |= StageTimes::keep_newest(&mut self.latest, landed);
        }
        updated
    }

    /// Newest frame whose readings have come back.
    pub fn latest(&self) -> Option<&StageTimes<T>> {
        self.latest.as_ref()
    }

    /// What every stage reads before any frame lands: disjoint without
    /// timestamp support, otherwise not ready.
    pub fn unavailable(&self) -> [TimerReading; GpuStage::COUNT] {
        let reading = if self.queries.is_some() {
            TimerReading::NotReady
        } else {
            TimerReading::Disjoint
        };
        [reading; GpuStage::COUNT]
    }

    /// Wait until the newest frame that got a readback slot has landed, or
    /// until nothing is left in flight, and return the latest readings.
    pub fn read_blocking(&mut self, device: &wgpu::Device) -> Option<&StageTimes<T>> {
        let Some(target) = self.last_resolved else {
            return self.latest();
        };
        let _ = device.poll(wgpu::PollType::Wait);
        loop {
            let _ = self.poll(device);
            let landed = self.latest.as_ref().is_some_and(|l| l.frame >= target);
            if landed || !self.in_flight() {
                return self.latest();
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn in_flight(&self) -> bool {
        self.queries
            .as_ref()
            .is_some_and(|q| q.ring.iter().any(|r| !matches!(r.slot, Slot::Free)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_or_zero_stamps_are_disjoint() {
        assert_eq!(TimerReading::from_timestamps(0, 100, 1.0), TimerReading::Disjoint);
        assert_eq!(TimerReading::from_timestamps(500, 400, 1.0), TimerReading::Disjoint);
        assert_eq!(TimerReading::from_timestamps(500, 500, 1.0), TimerReading::Disjoint);
    }

    #[test]
    fn elapsed_scales_by_period() {
        let reading = TimerReading::from_timestamps(1_000, 3_001_000, 0.5);
        assert_eq!(reading, TimerReading::Elapsed(1.5));
        assert_eq!(reading.millis(), Some(1.5));
        assert_eq!(TimerReading::Disjoint.millis(), Some(0.0));
        assert_eq!(TimerReading::NotReady.millis(), None);
    }

    fn times(frame: u64, tag: &'static str) -> StageTimes<&'static str> {
        StageTimes {
            frame,
            tag,
            readings: [TimerReading::Elapsed(frame as f32); GpuStage::COUNT],
        }
    }

    #[test]
    fn older_frames_never_replace_newer_ones() {
        let mut latest = None;
        // Ring slots 1, 2, 0 landing in index order after a wrap.
        assert!(StageTimes::keep_newest(&mut latest, times(3, "tile")));
        assert!(!StageTimes::keep_newest(&mut latest, times(1, "forward")));
        assert!(!StageTimes::keep_newest(&mut latest, times(2, "forward")));
        assert_eq!(latest, Some(times(3, "tile")));

        assert!(!StageTimes::keep_newest(&mut latest, times(3, "forward")));
        assert!(StageTimes::keep_newest(&mut latest, times(4, "forward")));
        assert_eq!(latest.map(|t| t.tag), Some("forward"));
    }

    #[test]
    fn stage_queries_do_not_overlap() {
        let mut seen = Vec::new();
        for stage in GpuStage::ALL {
            seen.push(stage.begin_query());
            seen.push(stage.end_query());
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), QUERY_COUNT as usize);
        assert!(seen.iter().all(|&q| q < QUERY_COUNT));
    }
}
