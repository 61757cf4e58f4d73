//! Frame pacing and the per-tick state machine
//!
//! [`FramePacer`] decides which frame slot the CPU may reuse next and whether
//! its completion fence has to be waited on first. A fence is only waited on
//! after a submission that signals it, so the first pass through the slots
//! never blocks.

use std::fmt;

/// Handed out by [`FramePacer::begin_frame`] for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTicket {
    /// In-flight slot whose fence, command context and uniform regions this tick uses
    pub slot: usize,
    /// The slot's fence guards an earlier submission and must be waited on
    pub wait_required: bool,
    /// Slot generation the ticket belongs to
    pub generation: u64,
}

/// Rotates through frame slots and remembers which ones have GPU work pending
#[derive(Debug, Clone)]
pub struct FramePacer {
    current: usize,
    submitted: Vec<bool>,
    generation: u64,
    frames_begun: u64,
}

impl FramePacer {
    /// Pace `slot_count` slots
    ///
    /// # Panics
    /// If `slot_count` is zero.
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count > 0, "frame pacer needs at least one slot");
        Self {
            current: 0,
            submitted: vec![false; slot_count],
            generation: 0,
            frames_begun: 0,
        }
    }

    /// Number of slots being paced
    pub fn slot_count(&self) -> usize {
        self.submitted.len()
    }

    /// Slot the next ticket will name
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Bumped by every [`reset`](Self::reset)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ticks begun since creation, across resets
    pub fn frames_begun(&self) -> u64 {
        self.frames_begun
    }

    /// Start a tick on the current slot
    pub fn begin_frame(&mut self) -> FrameTicket {
        self.frames_begun += 1;
        FrameTicket {
            slot: self.current,
            wait_required: self.submitted[self.current],
            generation: self.generation,
        }
    }

    /// The slot's fence was reset and no longer guards a submission
    pub fn mark_fence_reset(&mut self, ticket: &FrameTicket) {
        self.check(ticket);
        self.submitted[ticket.slot] = false;
    }

    /// Work signalling the slot's fence was submitted
    pub fn mark_submitted(&mut self, ticket: &FrameTicket) {
        self.check(ticket);
        self.submitted[ticket.slot] = true;
    }

    /// Whether the slot's fence guards a submission
    pub fn has_pending_work(&self, slot: usize) -> bool {
        self.submitted[slot]
    }

    /// Move to the next slot
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.submitted.len();
    }

    /// Start over with `slot_count` fresh slots; outstanding tickets become invalid
    pub fn reset(&mut self, slot_count: usize) {
        assert!(slot_count > 0, "frame pacer needs at least one slot");
        self.current = 0;
        self.submitted = vec![false; slot_count];
        self.generation += 1;
    }

    /// Whether `ticket` was issued for the current slot generation
    pub fn is_current(&self, ticket: &FrameTicket) -> bool {
        ticket.generation == self.generation && ticket.slot < self.submitted.len()
    }

    fn check(&self, ticket: &FrameTicket) {
        assert!(
            self.is_current(ticket),
            "frame ticket from generation {} used in generation {}",
            ticket.generation,
            self.generation
        );
    }
}

/// Where the render loop is within one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    /// Between ticks
    #[default]
    Idle,
    /// Waiting on the slot fence and acquiring an image
    Acquiring,
    /// Writing uniforms and recording commands
    Recording,
    /// Commands are queued on the graphics queue
    Submitted,
    /// Presentation has been requested
    Presenting,
}

impl FrameState {
    /// Whether the loop may move from `self` to `next`.
    ///
    /// Any state may fall back to `Idle` when the tick is abandoned.
    pub fn can_transition(self, next: Self) -> bool {
        use FrameState::*;
        matches!(
            (self, next),
            (Idle, Acquiring)
                | (Acquiring, Recording)
                | (Recording, Submitted)
                | (Submitted, Presenting)
                | (_, Idle)
        )
    }

    /// Move to `next`
    ///
    /// # Panics
    /// On a transition the loop never makes.
    pub fn transition(&mut self, next: Self) {
        assert!(
            self.can_transition(next),
            "invalid frame state transition {self} -> {next}"
        );
        *self = next;
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Recording => "recording",
            Self::Submitted => "submitted",
            Self::Presenting => "presenting",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_tick(pacer: &mut FramePacer) -> FrameTicket {
        let ticket = pacer.begin_frame();
        pacer.mark_fence_reset(&ticket);
        pacer.mark_submitted(&ticket);
        pacer.advance();
        ticket
    }

    #[test]
    fn two_slots_wait_only_on_reuse() {
        let mut pacer = FramePacer::new(2);

        let first = run_tick(&mut pacer);
        assert_eq!(first.slot, 0);
        assert!(!first.wait_required);

        let second = run_tick(&mut pacer);
        assert_eq!(second.slot, 1);
        assert!(!second.wait_required);

        let third = pacer.begin_frame();
        assert_eq!(third.slot, 0);
        assert!(third.wait_required);
    }

    #[test]
    fn no_wait_before_first_submission_for_any_slot_count() {
        for slots in 2..=5 {
            let mut pacer = FramePacer::new(slots);
            for tick in 0..slots * 3 {
                let ticket = run_tick(&mut pacer);
                assert_eq!(ticket.slot, tick % slots);
                assert_eq!(ticket.wait_required, tick >= slots);
            }
        }
    }

    #[test]
    fn skipped_tick_keeps_pending_submission() {
        let mut pacer = FramePacer::new(2);
        run_tick(&mut pacer);
        run_tick(&mut pacer);

        // acquire failed after the wait; fence stays signalled and guarded
        let ticket = pacer.begin_frame();
        assert!(ticket.wait_required);
        assert!(pacer.has_pending_work(ticket.slot));

        let retry = pacer.begin_frame();
        assert_eq!(retry.slot, ticket.slot);
        assert!(retry.wait_required);
    }

    #[test]
    fn reset_fence_without_submit_never_waits() {
        let mut pacer = FramePacer::new(2);
        run_tick(&mut pacer);
        run_tick(&mut pacer);

        let ticket = pacer.begin_frame();
        pacer.mark_fence_reset(&ticket);
        // submission failed here

        let retry = pacer.begin_frame();
        assert!(!retry.wait_required);
    }

    #[test]
    fn reset_starts_a_new_generation() {
        let mut pacer = FramePacer::new(2);
        let old = run_tick(&mut pacer);
        pacer.reset(3);

        assert!(!pacer.is_current(&old));
        let fresh = pacer.begin_frame();
        assert_eq!(fresh.slot, 0);
        assert!(!fresh.wait_required);
        assert_eq!(pacer.slot_count(), 3);
        assert_eq!(pacer.frames_begun(), 2);
    }

    #[test]
    #[should_panic(expected = "generation")]
    fn stale_ticket_is_rejected() {
        let mut pacer = FramePacer::new(2);
        let old = pacer.begin_frame();
        pacer.reset(2);
        pacer.mark_submitted(&old);
    }

    #[test]
    fn state_machine_follows_the_tick() {
        let mut state = FrameState::default();
        for next in [
            FrameState::Acquiring,
            FrameState::Recording,
            FrameState::Submitted,
            FrameState::Presenting,
            FrameState::Idle,
        ] {
            state.transition(next);
        }
        assert_eq!(state, FrameState::Idle);
        assert!(FrameState::Acquiring.can_transition(FrameState::Idle));
    }

    #[test]
    #[should_panic(expected = "idle -> recording")]
    fn recording_without_acquire_panics() {
        FrameState::Idle.transition(FrameState::Recording);
    }
}
