//! Tempo map: converts 16th-note ticks to seconds across live tempo changes

/// Ticks per beat (one tick is a 16th note)
pub const TICKS_PER_BEAT: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoSegment {
    start_tick: u64,
    start_time: f64,
    bpm: f64,
}

impl TempoSegment {
    fn seconds_per_tick(&self) -> f64 {
        seconds_per_tick(self.bpm)
    }
}

/// Duration of one tick at the given tempo
pub fn seconds_per_tick(bpm: f64) -> f64 {
    60.0 / bpm / TICKS_PER_BEAT as f64
}

/// Piecewise-constant tempo timeline starting at tick 0, time 0
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    /// Sorted by `start_tick`, never empty
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    pub fn new(bpm: f64) -> Self {
        Self {
            segments: vec![TempoSegment { start_tick: 0, start_time: 0.0, bpm }],
        }
    }

    fn segment_for_tick(&self, tick: u64) -> &TempoSegment {
        let idx = self.segments.partition_point(|s| s.start_tick <= tick);
        &self.segments[idx.saturating_sub(1)]
    }

    fn segment_for_time(&self, time: f64) -> &TempoSegment {
        let idx = self.segments.partition_point(|s| s.start_time <= time);
        &self.segments[idx.saturating_sub(1)]
    }

    /// Seconds from tick 0 to the start of `tick`
    pub fn time_at(&self, tick: u64) -> f64 {
        let seg = self.segment_for_tick(tick);
        seg.start_time + (tick - seg.start_tick) as f64 * seg.seconds_per_tick()
    }

    /// Fractional tick position at `time`; negative times clamp to 0
    pub fn tick_at(&self, time: f64) -> f64 {
        if time <= 0.0 {
            return 0.0;
        }
        let seg = self.segment_for_time(time);
        seg.start_tick as f64 + (time - seg.start_time) / seg.seconds_per_tick()
    }

    pub fn bpm_at(&self, tick: u64) -> f64 {
        self.segment_for_tick(tick).bpm
    }

    /// Switch to `bpm` from `from_tick` onward.
    ///
    /// Everything before `from_tick` keeps its timing; segments that started
    /// at or after it are replaced.
    pub fn change_tempo(&mut self, from_tick: u64, bpm: f64) {
        let start_time = self.time_at(from_tick);
        self.segments.retain(|s| s.start_tick < from_tick);
        self.segments.push(TempoSegment { start_tick: from_tick, start_time, bpm });
    }
}
