//! Capture worker: one thread per running session.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use codescan_core::{RegionMask, SymbologySet};
use crossbeam_channel::Sender;
use log::{debug, info, warn};

use super::event::{DecodeResult, SessionEvent};
use super::{Inner, MaskSlot};
use crate::backend::{Detection, MetadataFrame, MetadataStream, StreamEvent};
use crate::registry::SessionId;

pub(super) const THREAD_NAME: &str = "codescan-capture";

/// Detections of one frame that survive filtering, at most one per payload.
///
/// Drops symbologies outside `symbologies` and bounds outside `mask`. Order
/// follows the recognizer's report.
pub fn filter_frame(
    detections: Vec<Detection>,
    symbologies: &SymbologySet,
    mask: &RegionMask,
) -> Vec<Detection> {
    if mask.is_disabled() {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    detections
        .into_iter()
        .filter(|d| symbologies.contains(d.symbology))
        .filter(|d| mask.admits(&d.bounds))
        .filter(|d| seen.insert(d.payload.clone()))
        .collect()
}

pub(super) struct Worker {
    pub(super) session: SessionId,
    pub(super) epoch: u64,
    pub(super) stream: Box<dyn MetadataStream>,
    pub(super) symbologies: SymbologySet,
    pub(super) mask: Arc<MaskSlot>,
    pub(super) running: Arc<AtomicBool>,
    pub(super) events: Sender<SessionEvent>,
    pub(super) owner: Weak<Inner>,
}

impl Worker {
    pub(super) fn run(mut self) {
        info!("{} streaming (epoch {})", self.session, self.epoch);
        let mut frames = 0u64;
        let mut decoded = 0u64;

        while self.running.load(Ordering::Acquire) {
            match self.stream.next_event() {
                StreamEvent::Idle => {}
                StreamEvent::Frame(frame) => {
                    frames += 1;
                    decoded += self.process(frame);
                }
                StreamEvent::Fault(fault) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    warn!("{} stream fault: {fault}", self.session);
                    if let Some(inner) = self.owner.upgrade() {
                        inner.worker_fault(self.epoch, fault);
                    }
                    break;
                }
            }
        }

        info!(
            "{} worker exiting (epoch {}, {frames} frames, {decoded} results)",
            self.session, self.epoch
        );
    }

    fn process(&self, frame: MetadataFrame) -> u64 {
        // frame boundary: one mask for the whole frame
        let mask = self.mask.snapshot();
        if mask.is_disabled() {
            debug!("frame {} skipped, scan region is empty", frame.sequence);
            return 0;
        }

        let total = frame.detections.len();
        let accepted = filter_frame(frame.detections, &self.symbologies, &mask);
        debug!(
            "frame {}: {} of {total} detections accepted",
            frame.sequence,
            accepted.len()
        );

        let mut sent = 0;
        for detection in accepted {
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            let result = DecodeResult {
                payload: detection.payload,
                symbology: detection.symbology,
                timestamp: SystemTime::now(),
                epoch: self.epoch,
                frame: frame.sequence,
                bounds: detection.bounds,
            };
            if self.events.send(SessionEvent::Decoded(result)).is_err() {
                break;
            }
            sent += 1;
        }
        sent
    }
}
