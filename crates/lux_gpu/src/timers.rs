//! Stats/timing collector.
//!
//! Each frame writes begin/end timestamps for the timed stages into one of
//! `TIMER_RING` query slots. A slot is read back two frames after it was
//! written; if its results are not ready yet the previous timings stay.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use lux_core::Stage;

use crate::context::GpuContext;

/// Frames in flight for timestamp readback.
pub const TIMER_RING: usize = 4;

/// How many frames after recording a slot is read.
pub const READBACK_LATENCY: u64 = 2;

/// Trace, accumulate, denoise and tonemap; clear is not timed.
const TIMED_STAGES: usize = 4;
const QUERIES_PER_SLOT: u32 = 2 * TIMED_STAGES as u32;
const PAIR_BYTES: u64 = 2 * 8;
const SLOT_BYTES: u64 = TIMED_STAGES as u64 * PAIR_BYTES;

const FREE: u8 = 0;
const MAPPING: u8 = 1;
const READY: u8 = 2;
const FAILED: u8 = 3;

fn timed_index(stage: Stage) -> Option<usize> {
    match stage {
        Stage::Clear => None,
        Stage::Trace => Some(0),
        Stage::Accumulate => Some(1),
        Stage::Denoise => Some(2),
        Stage::Tonemap => Some(3),
    }
}

/// Byte offset of one stage's begin/end pair in the resolve buffer.
fn resolve_offset(slot: usize, stage: usize) -> u64 {
    (slot * TIMED_STAGES + stage) as u64 * wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT
}

/// Milliseconds between two raw timestamps.
pub fn ticks_to_ms(begin: u64, end: u64, period_ns: f32) -> f32 {
    end.saturating_sub(begin) as f32 * period_ns / 1.0e6
}

struct Slot {
    readback: wgpu::Buffer,
    state: Arc<AtomicU8>,
    written: [bool; TIMED_STAGES],
    frame: u64,
}

struct Queries {
    set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    slots: Vec<Slot>,
    period_ns: f32,
}

pub struct StageTimers {
    queries: Option<Queries>,
    ms: [f32; TIMED_STAGES],
    frame: u64,
    warned: bool,
}

impl StageTimers {
    pub fn new(ctx: &GpuContext) -> Self {
        let mut timers = Self {
            queries: None,
            ms: [0.0; TIMED_STAGES],
            frame: 0,
            warned: false,
        };

        if ctx.supports_timestamps() {
            timers.queries = Some(Queries::new(&ctx.device, ctx.queue.get_timestamp_period()));
        } else {
            timers.warn_once("device has no timestamp queries");
        }

        timers
    }

    fn warn_once(&mut self, reason: &str) {
        if !self.warned {
            log::warn!("GPU stage timing disabled: {reason}");
            self.warned = true;
        }
    }

    /// Collect finished results and pick this frame's slot.
    ///
    /// Returns `None` when timing is unavailable or the slot is still being
    /// read back.
    pub fn begin_frame(&mut self, device: &wgpu::Device) -> Option<usize> {
        let queries = self.queries.as_mut()?;
        device.poll(wgpu::Maintain::Poll);

        let mut failed = false;
        if let Some(target) = self.frame.checked_sub(READBACK_LATENCY) {
            let slot = &mut queries.slots[(target % TIMER_RING as u64) as usize];
            if slot.frame == target {
                match slot.state.load(Ordering::Acquire) {
                    READY => {
                        slot.read_into(&mut self.ms, queries.period_ns);
                        slot.state.store(FREE, Ordering::Release);
                    }
                    FAILED => {
                        slot.state.store(FREE, Ordering::Release);
                        failed = true;
                    }
                    _ => {}
                }
            }
        }

        let index = (self.frame % TIMER_RING as u64) as usize;
        let slot = &mut queries.slots[index];
        let available = match slot.state.load(Ordering::Acquire) {
            MAPPING => false,
            READY => {
                // Never harvested; drop the stale results
                slot.readback.unmap();
                true
            }
            _ => true,
        };

        if available {
            slot.state.store(FREE, Ordering::Release);
            slot.written = [false; TIMED_STAGES];
            slot.frame = self.frame;
        }

        if failed {
            self.warn_once("timestamp readback failed");
        }

        available.then_some(index)
    }

    /// Timestamp writes for one pass of `stage`.
    ///
    /// Multi-pass stages pass `first`/`last` so only their outer passes are
    /// stamped.
    pub fn pass_writes(
        &self,
        slot: Option<usize>,
        stage: Stage,
        first: bool,
        last: bool,
    ) -> Option<wgpu::ComputePassTimestampWrites<'_>> {
        let queries = self.queries.as_ref()?;
        let slot = slot?;
        let base = slot as u32 * QUERIES_PER_SLOT + 2 * timed_index(stage)? as u32;

        Some(wgpu::ComputePassTimestampWrites {
            query_set: &queries.set,
            beginning_of_pass_write_index: first.then_some(base),
            end_of_pass_write_index: last.then_some(base + 1),
        })
    }

    pub fn mark_written(&mut self, slot: Option<usize>, stage: Stage) {
        if let (Some(queries), Some(slot), Some(i)) = (self.queries.as_mut(), slot, timed_index(stage)) {
            queries.slots[slot].written[i] = true;
        }
    }

    /// Copy this frame's queries into the slot's readback buffer.
    pub fn resolve(&self, encoder: &mut wgpu::CommandEncoder, slot: Option<usize>) {
        let (Some(queries), Some(slot)) = (self.queries.as_ref(), slot) else {
            return;
        };

        // Stages that did not run left their queries unwritten; only the
        // written pairs are resolved
        for i in (0..TIMED_STAGES).filter(|&i| queries.slots[slot].written[i]) {
            let first = slot as u32 * QUERIES_PER_SLOT + 2 * i as u32;
            let offset = resolve_offset(slot, i);

            encoder.resolve_query_set(&queries.set, first..first + 2, &queries.resolve, offset);
            encoder.copy_buffer_to_buffer(
                &queries.resolve,
                offset,
                &queries.slots[slot].readback,
                i as u64 * PAIR_BYTES,
                PAIR_BYTES,
            );
        }
    }

    /// Start mapping the slot once its commands are submitted.
    pub fn after_submit(&mut self, slot: Option<usize>) {
        if let (Some(queries), Some(slot)) = (self.queries.as_ref(), slot) {
            let slot = &queries.slots[slot];
            if slot.written.iter().any(|&w| w) {
                slot.state.store(MAPPING, Ordering::Release);
                let state = Arc::clone(&slot.state);
                slot.readback.slice(..).map_async(wgpu::MapMode::Read, move |result| {
                    let next = if result.is_ok() { READY } else { FAILED };
                    state.store(next, Ordering::Release);
                });
            }
        }
        self.frame += 1;
    }

    /// Most recent duration of `stage` in milliseconds.
    pub fn ms(&self, stage: Stage) -> f32 {
        timed_index(stage).map_or(0.0, |i| self.ms[i])
    }

    pub fn is_enabled(&self) -> bool {
        self.queries.is_some()
    }
}

impl Queries {
    fn new(device: &wgpu::Device, period_ns: f32) -> Self {
        let set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("lux_stage_timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: QUERIES_PER_SLOT * TIMER_RING as u32,
        });

        let resolve = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lux_timestamp_resolve"),
            size: resolve_offset(TIMER_RING, 0),
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let slots = (0..TIMER_RING)
            .map(|_| Slot {
                readback: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("lux_timestamp_readback"),
                    size: SLOT_BYTES,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                state: Arc::new(AtomicU8::new(FREE)),
                written: [false; TIMED_STAGES],
                frame: u64::MAX,
            })
            .collect();

        log::debug!("Stage timers: {TIMER_RING} slots, {period_ns} ns per tick");

        Self {
            set,
            resolve,
            slots,
            period_ns,
        }
    }
}

impl Slot {
    fn read_into(&self, ms: &mut [f32; TIMED_STAGES], period_ns: f32) {
        {
            let data = self.readback.slice(..).get_mapped_range();
            let stamps: &[u64] = bytemuck::cast_slice(&data);

            for (i, written) in self.written.iter().enumerate() {
                if *written {
                    ms[i] = ticks_to_ms(stamps[2 * i], stamps[2 * i + 1], period_ns);
                }
            }
        }
        self.readback.unmap();
    }
}
