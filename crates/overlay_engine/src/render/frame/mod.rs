//! # Frame Scheduling
//!
//! Drives one frame per [`FrameScheduler::tick`] through
//! `Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle`.
//!
//! The scheduler only decides *when* things happen; the GPU calls live
//! behind [`FrameBackend`], implemented by the Vulkan renderer and by a
//! scripted mock in the tests below.
//!
//! ## Ordering
//!
//! - Slot `i`'s fence is waited on before slot `i` is recorded again, so at
//!   most `slot_count` frames are ever in flight.
//! - Presentation waits on the render-finished semaphore signaled by the
//!   submit; submission itself never blocks.
//! - Swapchain recreation only happens at the start of a tick, never while
//!   a frame is between acquire and present.

use ash::vk;

use crate::render::effects::EffectPushConstants;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Where the scheduler is within the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames
    Idle,
    /// Waiting for the slot fence and a swapchain image
    Acquiring,
    /// Filling the slot's command buffer
    Recording,
    /// Commands handed to the queue
    Submitted,
    /// Image queued for presentation
    Presenting,
}

impl FrameState {
    /// Whether `next` may follow `self`
    ///
    /// Any state may fall back to `Idle` when a frame is dropped.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Acquiring)
                | (Self::Acquiring, Self::Recording)
                | (Self::Recording, Self::Submitted)
                | (Self::Submitted, Self::Presenting)
                | (_, Self::Idle)
        )
    }
}

/// Result of asking for the next swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready; `suboptimal` asks for recreation after this frame
    Acquired {
        /// Swapchain image index
        image_index: u32,
        /// Surface no longer matches the swapchain exactly
        suboptimal: bool,
    },
    /// Swapchain unusable; nothing was signaled
    OutOfDate,
    /// No image within the bounded wait
    Timeout,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented normally
    Presented,
    /// Presented, but the swapchain should be rebuilt
    Suboptimal,
    /// Not presented; the swapchain must be rebuilt
    OutOfDate,
}

/// Why a tick produced no presented frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Window has a zero-sized drawable area
    Minimized,
    /// Swapchain was out of date
    OutOfDate,
    /// Image acquisition timed out
    Timeout,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame reached the presentation engine
    Presented,
    /// The frame was dropped
    Skipped(SkipReason),
}

/// GPU operations the scheduler sequences
pub trait FrameBackend {
    /// Number of in-flight frame slots
    fn frame_slots(&self) -> usize;

    /// Block until the slot's previous submission has completed
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Acquire the next image, signaling the slot's image-available semaphore
    fn acquire(&mut self, slot: usize) -> VulkanResult<AcquireOutcome>;

    /// Record the slot's command buffer for `image_index`
    fn record(&mut self, slot: usize, image_index: u32, effects: &EffectPushConstants) -> VulkanResult<()>;

    /// Reset the slot fence and submit the slot's commands
    fn submit(&mut self, slot: usize) -> VulkanResult<()>;

    /// Present `image_index` after the slot's render-finished semaphore
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome>;

    /// Idle the device and rebuild every swapchain-dependent resource
    fn recreate_swapchain(&mut self, extent: (u32, u32)) -> VulkanResult<()>;
}

/// Counters reported at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that reached the presentation engine
    pub presented: u64,
    /// Frames abandoned after acquire began (out of date or timeout)
    pub dropped: u64,
    /// Completed swapchain recreations
    pub recreations: u64,
    /// Suboptimal acquire/present results
    pub suboptimal: u64,
}

impl std::fmt::Display for FrameStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} presented, {} dropped, {} swapchain recreations, {} suboptimal",
            self.presented, self.dropped, self.recreations, self.suboptimal
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameFailure {
    operation: &'static str,
    result: vk::Result,
}

/// Frame-loop state machine over a [`FrameBackend`]
#[derive(Debug)]
pub struct FrameScheduler {
    state: FrameState,
    slot_count: usize,
    current_slot: usize,
    extent: (u32, u32),
    recreate_pending: bool,
    last_failure: Option<FrameFailure>,
    in_flight: Vec<bool>,
    stats: FrameStats,
}

impl FrameScheduler {
    /// Scheduler for `slot_count` slots and the initial drawable extent
    pub fn new(slot_count: usize, extent: (u32, u32)) -> VulkanResult<Self> {
        if slot_count == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Frame scheduler needs at least one slot".to_string(),
            });
        }

        Ok(Self {
            state: FrameState::Idle,
            slot_count,
            current_slot: 0,
            extent,
            recreate_pending: false,
            last_failure: None,
            in_flight: vec![false; slot_count],
            stats: FrameStats::default(),
        })
    }

    /// Record a drawable-size change; recreation happens on the next tick
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        log::debug!("Drawable resized to {}x{}", width, height);
        self.extent = (width, height);
        self.recreate_pending = true;
        self.last_failure = None;
    }

    /// Run one frame
    ///
    /// `Ok` covers presented and dropped frames alike; `Err` is fatal.
    pub fn tick<B: FrameBackend>(&mut self, backend: &mut B, effects: &EffectPushConstants) -> VulkanResult<FrameOutcome> {
        if self.extent.0 == 0 || self.extent.1 == 0 {
            log::trace!("Drawable area is empty, skipping frame");
            return Ok(FrameOutcome::Skipped(SkipReason::Minimized));
        }

        if self.recreate_pending {
            backend.recreate_swapchain(self.extent)?;
            self.recreate_pending = false;
            self.stats.recreations += 1;
        }

        let result = self.run_frame(backend, effects);
        if result.is_err() {
            self.state = FrameState::Idle;
        }
        result
    }

    fn run_frame<B: FrameBackend>(&mut self, backend: &mut B, effects: &EffectPushConstants) -> VulkanResult<FrameOutcome> {
        let slot = self.current_slot;

        self.transition(FrameState::Acquiring);
        backend.wait_for_slot(slot)?;
        self.in_flight[slot] = false;

        let (image_index, recreate_after_present) = match backend.acquire(slot)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    self.stats.suboptimal += 1;
                }
                (image_index, suboptimal)
            }
            AcquireOutcome::OutOfDate => {
                log::warn!("Swapchain out of date on acquire, dropping frame");
                self.note_failure("acquire", vk::Result::ERROR_OUT_OF_DATE_KHR)?;
                return Ok(self.drop_frame(SkipReason::OutOfDate, true));
            }
            AcquireOutcome::Timeout => {
                log::warn!("Timed out acquiring a swapchain image, dropping frame");
                return Ok(self.drop_frame(SkipReason::Timeout, false));
            }
        };

        self.transition(FrameState::Recording);
        backend.record(slot, image_index, effects)?;

        self.transition(FrameState::Submitted);
        backend.submit(slot)?;
        self.in_flight[slot] = true;

        self.transition(FrameState::Presenting);
        let outcome = match backend.present(slot, image_index)? {
            PresentOutcome::Presented => {
                self.last_failure = None;
                self.recreate_pending |= recreate_after_present;
                self.stats.presented += 1;
                FrameOutcome::Presented
            }
            PresentOutcome::Suboptimal => {
                log::debug!("Swapchain suboptimal on present, recreating next frame");
                self.last_failure = None;
                self.recreate_pending = true;
                self.stats.presented += 1;
                self.stats.suboptimal += 1;
                FrameOutcome::Presented
            }
            PresentOutcome::OutOfDate => {
                log::warn!("Swapchain out of date on present");
                self.note_failure("present", vk::Result::ERROR_OUT_OF_DATE_KHR)?;
                self.recreate_pending = true;
                self.stats.dropped += 1;
                FrameOutcome::Skipped(SkipReason::OutOfDate)
            }
        };

        self.current_slot = (self.current_slot + 1) % self.slot_count;
        self.transition(FrameState::Idle);
        Ok(outcome)
    }

    fn drop_frame(&mut self, reason: SkipReason, recreate: bool) -> FrameOutcome {
        self.recreate_pending |= recreate;
        self.stats.dropped += 1;
        self.transition(FrameState::Idle);
        FrameOutcome::Skipped(reason)
    }

    fn note_failure(&mut self, operation: &'static str, result: vk::Result) -> VulkanResult<()> {
        let failure = FrameFailure { operation, result };
        if self.last_failure == Some(failure) {
            log::error!("{} failed twice in a row with {:?}", operation, result);
            return Err(VulkanError::SurfaceLost { operation, result });
        }
        self.last_failure = Some(failure);
        Ok(())
    }

    fn transition(&mut self, next: FrameState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid frame transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Current state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Slot the next frame will use
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Slots submitted and not yet waited on
    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.iter().filter(|&&busy| busy).count()
    }

    /// Whether a recreation will run at the start of the next tick
    pub fn recreate_pending(&self) -> bool {
        self.recreate_pending
    }

    /// Counters so far
    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}
