//! Combines per-phase progress into one 0–100 percentage per job.

/// Weights of the fetch and transcode phases; they sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseWeights {
    pub fetch: f64,
    pub transcode: f64,
}

impl PhaseWeights {
    /// Fetch then transcode, each half of the bar.
    pub const TWO_PHASE: PhaseWeights = PhaseWeights {
        fetch: 0.5,
        transcode: 0.5,
    };

    /// Only the fetch is counted (the remux pass is too quick to matter).
    pub const FETCH_ONLY: PhaseWeights = PhaseWeights {
        fetch: 1.0,
        transcode: 0.0,
    };
}

/// Tracks the latest value of each phase and reports a monotonic unified percent.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    weights: PhaseWeights,
    fetch: f64,
    transcode: f64,
    reported: f64,
}

impl ProgressAggregator {
    pub fn new(weights: PhaseWeights) -> Self {
        Self {
            weights,
            fetch: 0.0,
            transcode: 0.0,
            reported: 0.0,
        }
    }

    /// Resumed job: reports never drop below the percent persisted at stop time.
    pub fn with_floor(weights: PhaseWeights, floor: f64) -> Self {
        Self {
            reported: clamp_percent(floor),
            ..Self::new(weights)
        }
    }

    pub fn weights(&self) -> PhaseWeights {
        self.weights
    }

    /// Records a fetch-phase percent; returns the unified percent.
    pub fn fetch_tick(&mut self, percent: f64) -> f64 {
        self.fetch = clamp_percent(percent);
        self.report()
    }

    /// Records a transcode-phase percent; returns the unified percent.
    pub fn transcode_tick(&mut self, percent: f64) -> f64 {
        self.transcode = clamp_percent(percent);
        self.report()
    }

    /// Marks the fetch phase done (the tool may exit without printing 100%).
    pub fn finish_fetch(&mut self) -> f64 {
        self.fetch_tick(100.0)
    }

    /// Last reported unified percent.
    pub fn percent(&self) -> f64 {
        self.reported
    }

    fn report(&mut self) -> f64 {
        let unified = self.fetch * self.weights.fetch + self.transcode * self.weights.transcode;
        self.reported = self.reported.max(clamp_percent(unified));
        self.reported
    }
}

fn clamp_percent(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn two_phase_fetch_ticks_are_halved() {
        let mut agg = ProgressAggregator::new(PhaseWeights::TWO_PHASE);
        assert!(close(agg.fetch_tick(10.0), 5.0));
        assert!(close(agg.fetch_tick(50.0), 25.0));
        assert!(close(agg.fetch_tick(100.0), 50.0));
    }

    #[test]
    fn transcode_half_after_fetch_gives_75() {
        let mut agg = ProgressAggregator::new(PhaseWeights::TWO_PHASE);
        agg.fetch_tick(100.0);
        assert!(close(agg.transcode_tick(50.0), 75.0));
        assert!(close(agg.transcode_tick(100.0), 100.0));
    }

    #[test]
    fn fetch_only_uses_full_range() {
        let mut agg = ProgressAggregator::new(PhaseWeights::FETCH_ONLY);
        assert!(close(agg.fetch_tick(40.0), 40.0));
        assert!(close(agg.transcode_tick(100.0), 40.0));
    }

    #[test]
    fn reports_never_go_backwards() {
        let mut agg = ProgressAggregator::new(PhaseWeights::FETCH_ONLY);
        agg.fetch_tick(60.0);
        assert!(close(agg.fetch_tick(10.0), 60.0));
        assert!(close(agg.fetch_tick(60.0), 60.0));
        assert!(close(agg.percent(), 60.0));
    }

    #[test]
    fn floor_holds_until_overtaken() {
        let mut agg = ProgressAggregator::with_floor(PhaseWeights::TWO_PHASE, 75.0);
        agg.finish_fetch();
        assert!(close(agg.transcode_tick(20.0), 75.0));
        assert!(close(agg.transcode_tick(80.0), 90.0));
    }

    #[test]
    fn out_of_range_ticks_are_clamped() {
        let mut agg = ProgressAggregator::new(PhaseWeights::TWO_PHASE);
        assert!(close(agg.fetch_tick(250.0), 50.0));
        assert!(close(agg.transcode_tick(-5.0), 50.0));
        assert!(close(agg.transcode_tick(f64::NAN), 50.0));
    }
}
