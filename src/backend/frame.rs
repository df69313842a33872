// Frame presenter
//
// Drives one frame through acquire -> record -> submit -> present against a
// `PresentationEngine`. Stale-swapchain results never fail a frame, they
// only raise `rebuild_pending`; the owner rebuilds the swapchain and calls
// `complete_rebuild` before the next frame.
//
// FRAME TIMELINE:
// ┌──────────────────────────────────────────────────────────────────────┐
// │  wait_fence ─> acquire ─> record ─> submit ─> present ─> next slot   │
// └──────────────────────────────────────────────────────────────────────┘

use ash::vk;
use super::error::{is_stale_swapchain, FrameError};

/// The Vulkan side of a frame, one call per step
pub trait PresentationEngine {
    /// Block until the work last submitted from `slot` has finished
    fn wait_for_slot(&mut self, slot: usize, timeout: u64) -> Result<(), vk::Result>;

    /// `Ok((index, suboptimal))`, or the raw status on failure
    fn acquire_next_image(&mut self, slot: usize, timeout: u64) -> Result<(u32, bool), vk::Result>;

    fn record(&mut self, slot: usize, image_index: u32) -> Result<(), vk::Result>;

    /// Submit the recorded work, waiting on image-available and signaling
    /// render-finished plus the slot's fence
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<(), vk::Result>;

    /// `Ok(suboptimal)`, or the raw status on failure
    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, vk::Result>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32 },
    /// Nothing was submitted this frame (stale swapchain or acquire timeout)
    Skipped,
}

/// Per-frame bookkeeping: which slot is next and whether the swapchain
/// needs rebuilding. After a failed frame `phase` is the step that failed.
#[derive(Debug)]
pub struct FrameState {
    frames_in_flight: usize,
    slot: usize,
    image_index: Option<u32>,
    rebuild_pending: bool,
    phase: FramePhase,
    timeout_ns: u64,
}

impl FrameState {
    pub fn new(frames_in_flight: usize, timeout_ns: u64) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            slot: 0,
            image_index: None,
            rebuild_pending: false,
            phase: FramePhase::Idle,
            timeout_ns,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    /// Ask for a swapchain rebuild before the next frame (e.g. on resize)
    pub fn request_rebuild(&mut self) {
        if !self.rebuild_pending {
            log::debug!("Swapchain rebuild requested");
        }
        self.rebuild_pending = true;
    }

    /// Called after the swapchain was recreated
    pub fn complete_rebuild(&mut self) {
        self.rebuild_pending = false;
        self.slot = 0;
        self.image_index = None;
        self.phase = FramePhase::Idle;
    }

    /// Run one frame
    pub fn draw<E>(&mut self, engine: &mut E) -> Result<FrameOutcome, FrameError>
    where
        E: PresentationEngine + ?Sized,
    {
        let slot = self.slot;
        self.phase = FramePhase::Acquiring;

        match engine.wait_for_slot(slot, self.timeout_ns) {
            Ok(()) => {}
            Err(vk::Result::TIMEOUT) => {
                log::warn!("Frame slot {} still busy after timeout, skipping frame", slot);
                return Ok(self.skip());
            }
            Err(result) => return Err(FrameError::Wait { slot, result }),
        }

        let image_index = match engine.acquire_next_image(slot, self.timeout_ns) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.request_rebuild();
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.request_rebuild();
                return Ok(self.skip());
            }
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                log::warn!("No swapchain image available before timeout, skipping frame");
                return Ok(self.skip());
            }
            Err(result) => return Err(FrameError::Acquire(result)),
        };
        self.image_index = Some(image_index);

        self.phase = FramePhase::Recording;
        engine
            .record(slot, image_index)
            .map_err(|result| FrameError::Record { image_index, result })?;

        self.phase = FramePhase::Submitted;
        engine.submit(slot, image_index).map_err(FrameError::Submit)?;

        self.phase = FramePhase::Presenting;
        match engine.present(slot, image_index) {
            Ok(false) => {}
            Ok(true) => self.request_rebuild(),
            Err(result) if is_stale_swapchain(result) => self.request_rebuild(),
            Err(result) => return Err(FrameError::Present(result)),
        }

        // Work was submitted from this slot, move on even if a rebuild is due
        self.slot = (slot + 1) % self.frames_in_flight;
        self.phase = FramePhase::Idle;
        Ok(FrameOutcome::Presented { image_index })
    }

    fn skip(&mut self) -> FrameOutcome {
        self.phase = FramePhase::Idle;
        FrameOutcome::Skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted engine: each call pops the next queued result, or succeeds
    #[derive(Default)]
    struct ScriptedEngine {
        waits: VecDeque<Result<(), vk::Result>>,
        acquires: VecDeque<Result<(u32, bool), vk::Result>>,
        submits: VecDeque<Result<(), vk::Result>>,
        presents: VecDeque<Result<bool, vk::Result>>,
        log: Vec<String>,
    }

    impl PresentationEngine for ScriptedEngine {
        fn wait_for_slot(&mut self, slot: usize, _timeout: u64) -> Result<(), vk::Result> {
            self.log.push(format!("wait {slot}"));
            self.waits.pop_front().unwrap_or(Ok(()))
        }

        fn acquire_next_image(&mut self, slot: usize, _timeout: u64) -> Result<(u32, bool), vk::Result> {
            self.log.push(format!("acquire {slot}"));
            self.acquires.pop_front().unwrap_or(Ok((0, false)))
        }

        fn record(&mut self, slot: usize, image_index: u32) -> Result<(), vk::Result> {
            self.log.push(format!("record {slot} {image_index}"));
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> Result<(), vk::Result> {
            self.log.push(format!("submit {slot} {image_index}"));
            self.submits.pop_front().unwrap_or(Ok(()))
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, vk::Result> {
            self.log.push(format!("present {slot} {image_index}"));
            self.presents.pop_front().unwrap_or(Ok(false))
        }
    }

    impl ScriptedEngine {
        fn presented(&self) -> usize {
            self.log.iter().filter(|line| line.starts_with("present")).count()
        }
    }

    #[test]
    fn happy_path_runs_steps_in_order() {
        let mut engine = ScriptedEngine::default();
        engine.acquires.push_back(Ok((2, false)));
        let mut frame = FrameState::new(2, 1_000_000);

        let outcome = frame.draw(&mut engine).unwrap();

        assert_eq!(outcome, FrameOutcome::Presented { image_index: 2 });
        assert_eq!(
            engine.log,
            vec!["wait 0", "acquire 0", "record 0 2", "submit 0 2", "present 0 2"]
        );
        assert_eq!(frame.image_index(), Some(2));
        assert_eq!(frame.phase(), FramePhase::Idle);
        assert!(!frame.rebuild_pending());
    }

    #[test]
    fn slots_cycle_through_frames_in_flight() {
        let mut engine = ScriptedEngine::default();
        let mut frame = FrameState::new(2, 1_000_000);

        frame.draw(&mut engine).unwrap();
        assert_eq!(frame.slot(), 1);
        frame.draw(&mut engine).unwrap();
        assert_eq!(frame.slot(), 0);
    }

    #[test]
    fn out_of_date_acquire_skips_present_and_requests_rebuild() {
        let mut engine = ScriptedEngine::default();
        engine.acquires.push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        let mut frame = FrameState::new(2, 1_000_000);

        let outcome = frame.draw(&mut engine).unwrap();

        assert_eq!(outcome, FrameOutcome::Skipped);
        assert!(frame.rebuild_pending());
        assert_eq!(engine.presented(), 0);
        assert!(!engine.log.iter().any(|line| line.starts_with("submit")));
        assert_eq!(frame.slot(), 0);
    }

    #[test]
    fn suboptimal_acquire_still_presents() {
        let mut engine = ScriptedEngine::default();
        engine.acquires.push_back(Ok((1, true)));
        let mut frame = FrameState::new(2, 1_000_000);

        let outcome = frame.draw(&mut engine).unwrap();

        assert_eq!(outcome, FrameOutcome::Presented { image_index: 1 });
        assert!(frame.rebuild_pending());
        assert_eq!(engine.presented(), 1);
    }

    #[test]
    fn stale_present_requests_rebuild_without_error() {
        for result in [Ok(true), Err(vk::Result::ERROR_OUT_OF_DATE_KHR)] {
            let mut engine = ScriptedEngine::default();
            engine.presents.push_back(result);
            let mut frame = FrameState::new(2, 1_000_000);

            assert!(frame.draw(&mut engine).is_ok());
            assert!(frame.rebuild_pending());
        }
    }

    #[test]
    fn acquire_timeout_skips_without_rebuild() {
        let mut engine = ScriptedEngine::default();
        engine.acquires.push_back(Err(vk::Result::TIMEOUT));
        let mut frame = FrameState::new(2, 1_000_000);

        assert_eq!(frame.draw(&mut engine).unwrap(), FrameOutcome::Skipped);
        assert!(!frame.rebuild_pending());
    }

    #[test]
    fn fence_timeout_skips_before_acquire() {
        let mut engine = ScriptedEngine::default();
        engine.waits.push_back(Err(vk::Result::TIMEOUT));
        let mut frame = FrameState::new(2, 1_000_000);

        assert_eq!(frame.draw(&mut engine).unwrap(), FrameOutcome::Skipped);
        assert_eq!(engine.log, vec!["wait 0"]);
    }

    #[test]
    fn device_lost_propagates() {
        let mut engine = ScriptedEngine::default();
        engine.submits.push_back(Err(vk::Result::ERROR_DEVICE_LOST));
        let mut frame = FrameState::new(2, 1_000_000);

        let err = frame.draw(&mut engine).unwrap_err();
        assert!(matches!(err, FrameError::Submit(vk::Result::ERROR_DEVICE_LOST)));
        assert_eq!(frame.phase(), FramePhase::Submitted);

        let mut engine = ScriptedEngine::default();
        engine.acquires.push_back(Err(vk::Result::ERROR_SURFACE_LOST_KHR));
        let err = frame.draw(&mut engine).unwrap_err();
        assert!(matches!(err, FrameError::Acquire(vk::Result::ERROR_SURFACE_LOST_KHR)));
        assert_eq!(frame.phase(), FramePhase::Acquiring);
    }

    #[test]
    fn complete_rebuild_resets_bookkeeping() {
        let mut engine = ScriptedEngine::default();
        engine.acquires.push_back(Ok((1, true)));
        let mut frame = FrameState::new(3, 1_000_000);

        frame.draw(&mut engine).unwrap();
        assert_eq!(frame.slot(), 1);
        assert!(frame.rebuild_pending());

        frame.complete_rebuild();
        assert_eq!(frame.slot(), 0);
        assert_eq!(frame.image_index(), None);
        assert!(!frame.rebuild_pending());
    }

    #[test]
    fn zero_frames_in_flight_is_treated_as_one() {
        let mut engine = ScriptedEngine::default();
        let mut frame = FrameState::new(0, 1_000_000);
        frame.draw(&mut engine).unwrap();
        assert_eq!(frame.slot(), 0);
    }

    #[test]
    fn failed_frame_reports_the_step_that_failed() {
        let mut frame = FrameState::new(2, 1_000_000);

        let mut engine = ScriptedEngine::default();
        engine.submits.push_back(Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
        frame.draw(&mut engine).unwrap_err();
        assert_eq!(frame.phase(), FramePhase::Submitted);

        let mut engine = ScriptedEngine::default();
        engine.presents.push_back(Err(vk::Result::ERROR_DEVICE_LOST));
        let err = frame.draw(&mut engine).unwrap_err();
        assert!(matches!(err, FrameError::Present(vk::Result::ERROR_DEVICE_LOST)));
        assert_eq!(frame.phase(), FramePhase::Presenting);
        // The submit went through, so the image index is known
        assert_eq!(frame.image_index(), Some(0));
    }
}
