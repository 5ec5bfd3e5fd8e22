//! Coded-data retrieval: the asynchronous output worker and the shared
//! drain path it has in common with synchronous mode.

use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use tracing::{debug, trace, warn};
use va_sys as va;

use super::display::{Display, VaStatusExt};
use crate::pipeline::{FrameTask, SurfaceTracker};
use crate::traits::SinkSet;

/// Everything the output side needs to turn a [`FrameTask`] into sink
/// deliveries: the display, the per-slot surfaces and coded buffers, the
/// surface tracker, and the sink fan-out list.
pub(crate) struct OutputContext {
    pub display: Arc<Display>,
    pub src_surfaces: Vec<va::VASurfaceID>,
    pub coded_bufs: Vec<va::VABufferID>,
    pub tracker: Arc<SurfaceTracker>,
    pub sinks: SinkSet,
}

// Surface and buffer ids are plain driver handles; the display wrapper is
// Send + Sync and drain calls are serialized per surface by the tracker.
unsafe impl Send for OutputContext {}

impl OutputContext {
    /// Retrieve one frame's coded data and deliver it to every sink.
    ///
    /// Blocks on the accelerator until the surface's encode completes.
    /// Failures skip the frame's output but always return the surface to
    /// the pool, so a stuck frame cannot wedge submission.
    pub(crate) fn drain_task(&mut self, task: &FrameTask) {
        let slot = task.slot(self.src_surfaces.len());
        let dpy = self.display.handle();

        let synced = unsafe { va::vaSyncSurface(dpy, self.src_surfaces[slot]) }
            .check("vaSyncSurface");
        if let Err(err) = synced {
            warn!(%err, encode_order = task.encode_order, "coded output lost: sync failed");
            self.tracker.mark_free(slot);
            return;
        }

        let mut mapped: *mut c_void = ptr::null_mut();
        let map_status = unsafe { va::vaMapBuffer(dpy, self.coded_bufs[slot], &mut mapped) }
            .check("vaMapBuffer");
        if let Err(err) = map_status {
            warn!(%err, encode_order = task.encode_order, "coded output lost: map failed");
            self.tracker.mark_free(slot);
            return;
        }

        let mut total = 0usize;
        let mut segment = mapped as *const va::VACodedBufferSegment;
        while !segment.is_null() {
            let seg = unsafe { &*segment };
            if seg.size > 0 && !seg.buf.is_null() {
                let bytes =
                    unsafe { std::slice::from_raw_parts(seg.buf as *const u8, seg.size as usize) };
                self.sinks.deliver(bytes, task.keyframe);
                total += bytes.len();
            }
            segment = seg.next;
        }

        if let Err(err) =
            unsafe { va::vaUnmapBuffer(dpy, self.coded_bufs[slot]) }.check("vaUnmapBuffer")
        {
            warn!(%err, "coded buffer unmap failed");
        }

        trace!(
            encode_order = task.encode_order,
            display_order = task.display_order,
            bytes = total,
            keyframe = task.keyframe,
            "coded frame delivered"
        );
        self.tracker.mark_free(slot);
    }
}

/// Spawn the output worker thread.
///
/// The worker drains tasks until the submitting side drops its sender,
/// finishes whatever is still queued, and exits.
pub(crate) fn spawn_worker(mut ctx: OutputContext, tasks: Receiver<FrameTask>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("coded-output".into())
        .spawn(move || {
            for task in tasks.iter() {
                ctx.drain_task(&task);
            }
            debug!("output queue closed, worker exiting");
        })
        .expect("failed to spawn coded-output worker")
}
