//! Pending steer / follow-up queues and turn selection.

use std::collections::VecDeque;

use helm_core::QueueMode;

use super::types::TurnKind;

/// Two FIFO queues plus their drain modes.
///
/// Steers always outrank follow-ups: a follow-up is only selected when no
/// steer is pending.
#[derive(Clone, Debug, Default)]
pub struct TurnQueue {
    steers: VecDeque<String>,
    follow_ups: VecDeque<String>,
    steering_mode: QueueMode,
    follow_up_mode: QueueMode,
}

impl TurnQueue {
    /// Empty queues with the given modes.
    pub fn new(steering_mode: QueueMode, follow_up_mode: QueueMode) -> Self {
        Self {
            steering_mode,
            follow_up_mode,
            ..Self::default()
        }
    }

    /// Queue a steer behind any already waiting.
    pub fn push_steer(&mut self, text: String) {
        self.steers.push_back(text);
    }

    /// Queue a follow-up behind any already waiting.
    pub fn push_follow_up(&mut self, text: String) {
        self.follow_ups.push_back(text);
    }

    /// Drop every pending entry.
    pub fn clear(&mut self) {
        self.steers.clear();
        self.follow_ups.clear();
    }

    /// `(steers, follow_ups)` currently waiting.
    pub fn pending(&self) -> (usize, usize) {
        (self.steers.len(), self.follow_ups.len())
    }

    pub fn is_empty(&self) -> bool {
        self.steers.is_empty() && self.follow_ups.is_empty()
    }

    pub fn steering_mode(&self) -> QueueMode {
        self.steering_mode
    }

    pub fn follow_up_mode(&self) -> QueueMode {
        self.follow_up_mode
    }

    pub fn set_steering_mode(&mut self, mode: QueueMode) {
        self.steering_mode = mode;
    }

    pub fn set_follow_up_mode(&mut self, mode: QueueMode) {
        self.follow_up_mode = mode;
    }

    /// Take the input for the next turn, if any.
    ///
    /// In batch mode every pending entry of the selected queue is joined with
    /// `'\n'` into one turn.
    pub fn next_turn(&mut self) -> Option<(TurnKind, String)> {
        if let Some(text) = drain(&mut self.steers, self.steering_mode) {
            return Some((TurnKind::Steer, text));
        }
        drain(&mut self.follow_ups, self.follow_up_mode).map(|text| (TurnKind::FollowUp, text))
    }
}

fn drain(queue: &mut VecDeque<String>, mode: QueueMode) -> Option<String> {
    match mode {
        QueueMode::Sequential => queue.pop_front(),
        QueueMode::BatchAll => {
            if queue.is_empty() {
                return None;
            }
            let batch: Vec<String> = queue.drain(..).collect();
            Some(batch.join("\n"))
        }
    }
}
