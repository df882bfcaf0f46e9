//! Cooperative termination detection.
//!
//! A rank idle for longer than the timeout posts "finished" in rank 0's
//! region of the finish window; new work retracts it. Rank 0 declares
//! global termination once every flag is set and the global sent and
//! received record counters agree before and after reading the flags, then
//! posts the decision in every other rank's region.

use super::{window::RmaWindow, Cluster};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct TerminationDetector<'a> {
    rank: usize,
    finish: &'a RmaWindow,
    cluster: &'a Cluster,
    timeout: Duration,
    idle_since: Option<Instant>,
    has_finish: bool,
}

impl<'a> TerminationDetector<'a> {
    pub fn new(rank: usize, finish: &'a RmaWindow, cluster: &'a Cluster, timeout: Duration) -> Self {
        TerminationDetector {
            rank,
            finish,
            cluster,
            timeout,
            idle_since: None,
            has_finish: false,
        }
    }

    /// Called while this rank has nothing to do. Returns true once the
    /// whole cluster is known to be done.
    pub fn idle(&mut self) -> bool {
        let now = Instant::now();
        match self.idle_since {
            None => {
                self.idle_since = Some(now);
                return false;
            }
            Some(since) if now.duration_since(since) <= self.timeout => return false,
            Some(_) => {}
        }
        if !self.has_finish {
            self.has_finish = true;
            self.finish.put_one(0, self.rank, 1);
        }
        if self.rank != 0 {
            return self.finish.get_one(self.rank, 0) != 0;
        }

        let world = self.cluster.world_size();
        let (sent, received) = self.cluster.counters();
        let flags = self.finish.get(0, 0, world);
        let (sent_after, received_after) = self.cluster.counters();
        let all_finished = flags.iter().all(|&f| f != 0);
        if all_finished && sent == received && sent_after == received_after && sent == sent_after {
            debug!(sent, "global termination");
            for rank in 1..world {
                self.finish.put_one(rank, 0, 1);
            }
            return true;
        }
        false
    }

    /// Work showed up: retract the "finished" flag.
    pub fn wake(&mut self) {
        self.idle_since = None;
        if self.has_finish {
            self.finish.put_one(0, self.rank, 0);
            self.has_finish = false;
        }
    }
}
