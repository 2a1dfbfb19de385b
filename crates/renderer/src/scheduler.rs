//! The per-frame protocol.
//!
//! [`FrameScheduler`] owns the frame cursor and drives one iteration of the
//! render loop against a [`FrameBackend`]:
//!
//! ```text
//! 1. wait for slot fence
//! 2. acquire image          stale -> recreate, skip the frame
//! 3. update slot uniforms
//! 4. reset slot fence, record slot command buffer
//! 5. submit
//! 6. present                stale -> recreate after advancing
//! 7. advance cursor
//! ```
//!
//! The backend is a trait so the ordering can be checked without a GPU.

use tracing::{debug, trace};

use ember_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::MAX_FRAMES_IN_FLIGHT;

/// The GPU operations one frame iteration is made of.
///
/// `slot` is always in `0..MAX_FRAMES_IN_FLIGHT`. `image_index` is the
/// swapchain image returned by [`acquire_image`](Self::acquire_image) and is
/// unrelated to `slot`.
pub trait FrameBackend {
    type Error;

    /// Blocks until the slot's previous submission has completed.
    fn wait_for_fence(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Acquires the next image, signalling the slot's image-available semaphore.
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome, Self::Error>;

    /// Rebuilds everything that depends on the swapchain.
    fn recreate_swapchain(&mut self) -> Result<(), Self::Error>;

    /// Writes this frame's uniforms into the slot's mapped buffer.
    fn update_uniforms(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Returns the slot's fence to the unsignaled state.
    fn reset_fence(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Resets and re-records the slot's command buffer for `image_index`.
    fn record(&mut self, slot: usize, image_index: u32) -> Result<(), Self::Error>;

    /// Submits the slot's command buffer, signalling its fence on completion.
    fn submit(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Presents `image_index` once the slot's render-finished semaphore signals.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome, Self::Error>;
}

/// What one iteration did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented.
    Presented,
    /// The swapchain was stale at acquire. It was recreated and nothing was
    /// submitted; the cursor did not move.
    Skipped,
    /// The frame was presented, then the swapchain was recreated because it
    /// was stale at present or a resize was pending.
    PresentedAndRecreated,
}

/// Frame cursor and resize flag.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    /// Current frame index (0 to MAX_FRAMES_IN_FLIGHT - 1).
    current_frame: usize,
    /// Most recently acquired swapchain image index.
    image_index: u32,
    resize_pending: bool,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Requests a swapchain rebuild after the next present.
    pub fn notify_resized(&mut self) {
        self.resize_pending = true;
    }

    #[inline]
    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    /// Runs one iteration of the frame protocol.
    ///
    /// # Errors
    ///
    /// Any backend error. The cursor is only advanced once present has been
    /// issued, so an error leaves it where the failed iteration started or
    /// after the frame that was presented.
    pub fn run_iteration<B: FrameBackend>(
        &mut self,
        backend: &mut B,
    ) -> Result<FrameOutcome, B::Error> {
        let slot = self.current_frame;

        backend.wait_for_fence(slot)?;

        let image_index = match backend.acquire_image(slot)? {
            AcquireOutcome::Acquired(index) => index,
            AcquireOutcome::Stale => {
                debug!("Swapchain stale at acquire (slot {}), recreating", slot);
                self.resize_pending = false;
                backend.recreate_swapchain()?;
                return Ok(FrameOutcome::Skipped);
            }
        };
        self.image_index = image_index;
        trace!("Slot {} acquired image {}", slot, image_index);

        backend.update_uniforms(slot)?;
        backend.reset_fence(slot)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)?;
        let presented = backend.present(slot, image_index)?;

        self.advance();

        if presented == PresentOutcome::Stale || self.resize_pending {
            debug!(
                "Recreating swapchain after present (stale: {}, resize pending: {})",
                presented == PresentOutcome::Stale,
                self.resize_pending
            );
            self.resize_pending = false;
            backend.recreate_swapchain()?;
            return Ok(FrameOutcome::PresentedAndRecreated);
        }

        Ok(FrameOutcome::Presented)
    }

    fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Op {
        WaitFence,
        Acquire,
        Recreate,
        UpdateUniforms,
        ResetFence,
        ResetCommandBuffer,
        Submit,
        Present,
    }

    #[derive(Clone, Copy, Debug)]
    struct Event {
        time: u64,
        op: Op,
        slot: Option<usize>,
    }

    /// Records every call with a logical timestamp and models fence state.
    struct MockBackend {
        clock: u64,
        events: Vec<Event>,
        image_count: u32,
        next_image: u32,
        /// Scripted acquire results; `None` means acquire normally.
        acquire_script: VecDeque<Option<AcquireOutcome>>,
        present_script: VecDeque<PresentOutcome>,
        /// Slot has been submitted and not yet waited on.
        in_flight: [bool; MAX_FRAMES_IN_FLIGHT],
        fence_signaled: [bool; MAX_FRAMES_IN_FLIGHT],
        fail_acquire: bool,
    }

    impl MockBackend {
        fn new(image_count: u32) -> Self {
            Self {
                clock: 0,
                events: Vec::new(),
                image_count,
                next_image: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                in_flight: [false; MAX_FRAMES_IN_FLIGHT],
                fence_signaled: [true; MAX_FRAMES_IN_FLIGHT],
                fail_acquire: false,
            }
        }

        fn log(&mut self, op: Op, slot: Option<usize>) {
            self.clock += 1;
            self.events.push(Event {
                time: self.clock,
                op,
                slot,
            });
        }

        fn count(&self, op: Op) -> usize {
            self.events.iter().filter(|e| e.op == op).count()
        }
    }

    impl FrameBackend for MockBackend {
        type Error = &'static str;

        fn wait_for_fence(&mut self, slot: usize) -> Result<(), Self::Error> {
            // The simulated GPU finishes whatever the slot had in flight.
            self.in_flight[slot] = false;
            self.fence_signaled[slot] = true;
            self.log(Op::WaitFence, Some(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome, Self::Error> {
            self.log(Op::Acquire, Some(slot));
            if self.fail_acquire {
                return Err("device lost");
            }
            if let Some(Some(outcome)) = self.acquire_script.pop_front() {
                return Ok(outcome);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquireOutcome::Acquired(index))
        }

        fn recreate_swapchain(&mut self) -> Result<(), Self::Error> {
            self.log(Op::Recreate, None);
            Ok(())
        }

        fn update_uniforms(&mut self, slot: usize) -> Result<(), Self::Error> {
            self.log(Op::UpdateUniforms, Some(slot));
            Ok(())
        }

        fn reset_fence(&mut self, slot: usize) -> Result<(), Self::Error> {
            assert!(self.fence_signaled[slot], "reset of unsignaled fence {}", slot);
            self.fence_signaled[slot] = false;
            self.log(Op::ResetFence, Some(slot));
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> Result<(), Self::Error> {
            assert!(!self.in_flight[slot], "slot {} re-recorded while in flight", slot);
            assert!(image_index < self.image_count);
            self.log(Op::ResetCommandBuffer, Some(slot));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<(), Self::Error> {
            self.in_flight[slot] = true;
            self.log(Op::Submit, Some(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, _image_index: u32) -> Result<PresentOutcome, Self::Error> {
            self.log(Op::Present, Some(slot));
            Ok(self
                .present_script
                .pop_front()
                .unwrap_or(PresentOutcome::Presented))
        }
    }

    #[test]
    fn test_cursor_is_iterations_mod_n() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new(3);

        for n in 1..=10 {
            let outcome = scheduler.run_iteration(&mut backend).unwrap();
            assert_eq!(outcome, FrameOutcome::Presented);
            assert_eq!(scheduler.current_frame(), n % MAX_FRAMES_IN_FLIGHT);
        }
    }

    #[test]
    fn test_image_index_independent_of_slot() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new(3);

        let mut seen = Vec::new();
        for _ in 0..6 {
            scheduler.run_iteration(&mut backend).unwrap();
            seen.push(scheduler.image_index());
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_wait_precedes_reset_for_every_slot() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new(3);

        let iterations = 3 * MAX_FRAMES_IN_FLIGHT + 1;
        for _ in 0..iterations {
            scheduler.run_iteration(&mut backend).unwrap();
        }

        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let slot_events: Vec<&Event> = backend
                .events
                .iter()
                .filter(|e| e.slot == Some(slot))
                .collect();

            let mut last_submit: Option<u64> = None;
            let mut last_wait: Option<u64> = None;
            let mut resets = 0;

            for event in slot_events {
                match event.op {
                    Op::Submit => last_submit = Some(event.time),
                    Op::WaitFence => last_wait = Some(event.time),
                    Op::ResetFence | Op::ResetCommandBuffer => {
                        resets += 1;
                        if let Some(submitted) = last_submit {
                            let waited = last_wait.is_some_and(|w| w > submitted);
                            assert!(
                                waited,
                                "slot {} {:?} at t={} without a wait after submit at t={}",
                                slot, event.op, event.time, submitted
                            );
                        }
                    }
                    _ => {}
                }
            }
            assert!(resets >= 6, "slot {} only reset {} times", slot, resets);
        }
    }

    #[test]
    fn test_iteration_order() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new(2);
        scheduler.run_iteration(&mut backend).unwrap();

        let ops: Vec<Op> = backend.events.iter().map(|e| e.op).collect();
        assert_eq!(
            ops,
            vec![
                Op::WaitFence,
                Op::Acquire,
                Op::UpdateUniforms,
                Op::ResetFence,
                Op::ResetCommandBuffer,
                Op::Submit,
                Op::Present,
            ]
        );
    }

    #[test]
    fn test_stale_acquire_skips_frame() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new(3);

        scheduler.run_iteration(&mut backend).unwrap();
        let cursor = scheduler.current_frame();
        let submits = backend.count(Op::Submit);
        let resets = backend.count(Op::ResetFence);

        backend.acquire_script.push_back(Some(AcquireOutcome::Stale));
        let outcome = scheduler.run_iteration(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(scheduler.current_frame(), cursor);
        assert_eq!(backend.count(Op::Submit), submits);
        assert_eq!(backend.count(Op::ResetFence), resets);
        assert_eq!(backend.count(Op::Recreate), 1);
        assert_eq!(backend.events.last().map(|e| e.op), Some(Op::Recreate));

        // The next iteration reuses the same slot.
        scheduler.run_iteration(&mut backend).unwrap();
        let submit = backend
            .events
            .iter()
            .rev()
            .find(|e| e.op == Op::Submit)
            .unwrap();
        assert_eq!(submit.slot, Some(cursor));
    }

    #[test]
    fn test_stale_present_recreates_and_advances() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new(3);
        backend.present_script.push_back(PresentOutcome::Stale);

        let outcome = scheduler.run_iteration(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::PresentedAndRecreated);
        assert_eq!(scheduler.current_frame(), 1);
        assert_eq!(backend.count(Op::Submit), 1);
        assert_eq!(backend.count(Op::Recreate), 1);
    }

    #[test]
    fn test_resize_flag_recreates_after_present() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new(3);

        scheduler.notify_resized();
        assert!(scheduler.resize_pending());

        let outcome = scheduler.run_iteration(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::PresentedAndRecreated);
        assert!(!scheduler.resize_pending());

        let outcome = scheduler.run_iteration(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented);
        assert_eq!(backend.count(Op::Recreate), 1);
    }

    #[test]
    fn test_stale_acquire_clears_resize_flag() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new(3);

        scheduler.notify_resized();
        backend.acquire_script.push_back(Some(AcquireOutcome::Stale));

        assert_eq!(
            scheduler.run_iteration(&mut backend).unwrap(),
            FrameOutcome::Skipped
        );
        assert!(!scheduler.resize_pending());
        assert_eq!(
            scheduler.run_iteration(&mut backend).unwrap(),
            FrameOutcome::Presented
        );
        assert_eq!(backend.count(Op::Recreate), 1);
    }

    #[test]
    fn test_acquire_error_is_fatal() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = MockBackend::new(3);
        backend.fail_acquire = true;

        assert_eq!(scheduler.run_iteration(&mut backend), Err("device lost"));
        assert_eq!(scheduler.current_frame(), 0);
        assert_eq!(backend.count(Op::Submit), 0);
        assert_eq!(backend.count(Op::Recreate), 0);
    }
}
