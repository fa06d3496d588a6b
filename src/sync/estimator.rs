use std::collections::VecDeque;

/// One request/response exchange. All timestamps are epoch milliseconds.
///
/// `t0`: client send, `t1`: server receive, `t2`: server send,
/// `t3`: client receive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    pub t0: f64,
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
}

impl ClockSample {
    pub fn new(t0: f64, t1: f64, t2: f64, t3: f64) -> Self {
        Self { t0, t1, t2, t3 }
    }

    /// Network round trip, excluding the server's processing time.
    pub fn round_trip_ms(&self) -> f64 {
        (self.t3 - self.t0) - (self.t2 - self.t1)
    }

    /// Server clock minus client clock.
    pub fn offset_ms(&self) -> f64 {
        ((self.t1 - self.t0) + (self.t2 - self.t3)) / 2.0
    }
}

/// Rolling average over the most recent `capacity` samples.
#[derive(Debug, Clone)]
pub struct ClockEstimator {
    window: VecDeque<ClockSample>,
    capacity: usize,
    synced: bool,
}

impl ClockEstimator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            synced: false,
        }
    }

    pub fn record(&mut self, sample: ClockSample) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        if self.window.len() == self.capacity {
            self.synced = true;
        }
    }

    /// True once the window has filled at least once.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn average_offset_ms(&self) -> Option<f64> {
        self.average(ClockSample::offset_ms)
    }

    pub fn average_round_trip_ms(&self) -> Option<f64> {
        self.average(ClockSample::round_trip_ms)
    }

    /// Converts a server timestamp into the local clock's frame.
    pub fn to_local_ms(&self, server_ms: f64) -> f64 {
        server_ms - self.average_offset_ms().unwrap_or(0.0)
    }

    /// Milliseconds the client should wait, from `local_now_ms`, before
    /// executing something the server scheduled at `server_ms`.
    pub fn wait_until_ms(&self, server_ms: f64, local_now_ms: f64) -> f64 {
        (self.to_local_ms(server_ms) - local_now_ms).max(0.0)
    }

    fn average(&self, f: impl Fn(&ClockSample) -> f64) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().map(f).sum::<f64>() / self.window.len() as f64)
    }
}
