use bevy::prelude::*;
use constants::streaming::{MAX_CONCURRENT_LOADS, MIN_CONCURRENT_LOADS};
use std::collections::{HashSet, VecDeque};

use crate::engine::assets::texture_files::MapKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    High,
    Normal,
}

/// Handle for one unit of fetch + decode work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct LoadJob {
    pub url: String,
    pub kind: MapKind,
}

/// Bounded-concurrency admission control for texture fetch and decode.
///
/// High priority work is queued ahead of normal work but never preempts
/// running jobs. Within one priority class jobs run in submission order.
/// The queue is unbounded and nothing is ever dropped.
#[derive(Resource, Debug)]
pub struct LoadScheduler {
    queue: VecDeque<(LoadTicket, Priority, LoadJob)>,
    running: HashSet<LoadTicket>,
    bound: usize,
    next_ticket: u64,
}

impl Default for LoadScheduler {
    fn default() -> Self {
        Self::new(MAX_CONCURRENT_LOADS)
    }
}

impl LoadScheduler {
    pub fn new(bound: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            running: HashSet::new(),
            bound: bound.clamp(MIN_CONCURRENT_LOADS, MAX_CONCURRENT_LOADS),
            next_ticket: 0,
        }
    }

    pub fn submit(&mut self, job: LoadJob, priority: Priority) -> LoadTicket {
        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        self.enqueue(ticket, priority, job);
        ticket
    }

    fn enqueue(&mut self, ticket: LoadTicket, priority: Priority, job: LoadJob) {
        match priority {
            Priority::High => {
                let position = self
                    .queue
                    .iter()
                    .position(|(_, queued, _)| *queued != Priority::High)
                    .unwrap_or(self.queue.len());
                self.queue.insert(position, (ticket, priority, job));
            }
            Priority::Normal => self.queue.push_back((ticket, priority, job)),
        }
    }

    /// Move a queued job into a more urgent class, behind the jobs already
    /// there. Running or unknown tickets are left alone.
    pub fn promote(&mut self, ticket: LoadTicket, priority: Priority) -> bool {
        let Some(index) = self
            .queue
            .iter()
            .position(|(queued, current, _)| *queued == ticket && priority < *current)
        else {
            return false;
        };
        let Some((ticket, _, job)) = self.queue.remove(index) else {
            return false;
        };
        self.enqueue(ticket, priority, job);
        true
    }

    /// Pop as many queued jobs as the current bound allows.
    pub fn admit(&mut self) -> Vec<(LoadTicket, LoadJob)> {
        let mut admitted = Vec::new();
        while self.running.len() < self.bound {
            let Some((ticket, _, job)) = self.queue.pop_front() else {
                break;
            };
            self.running.insert(ticket);
            admitted.push((ticket, job));
        }
        admitted
    }

    /// Release the slot held by a running job. Unknown tickets are ignored.
    pub fn finish(&mut self, ticket: LoadTicket) -> bool {
        self.running.remove(&ticket)
    }

    /// Lowering the bound never cancels running work; it only delays admission.
    pub fn set_bound(&mut self, bound: usize) {
        let bound = bound.clamp(MIN_CONCURRENT_LOADS, MAX_CONCURRENT_LOADS);
        if bound != self.bound {
            info!("[TEX] Load concurrency {} -> {}", self.bound, bound);
            self.bound = bound;
        }
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
