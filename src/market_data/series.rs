use tracing::debug;

use super::kline::Kline;
use crate::types::StreamKey;

// ---------------------------------------------------------------------------
// Series -- ordered bars for one chart
// ---------------------------------------------------------------------------

/// What [`Series::merge`] did with an incoming bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Same open time as the trailing bar: the in-progress bar was revised.
    Replaced,
    /// Newer open time: appended as a new bar.
    Appended,
    /// Older than the trailing bar: ignored.
    Stale,
}

/// Ordered kline sequence for one `(symbol, interval)`.
///
/// Append-only in time except for the trailing bar, which live updates may
/// revise in place. The oldest bars are trimmed once `max_bars` is exceeded.
#[derive(Debug, Clone)]
pub struct Series {
    key: StreamKey,
    bars: Vec<Kline>,
    max_bars: usize,
}

impl Series {
    pub fn new(key: StreamKey, max_bars: usize) -> Self {
        Self {
            key,
            bars: Vec::new(),
            max_bars: max_bars.max(1),
        }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn bars(&self) -> &[Kline] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Kline> {
        self.bars.last()
    }

    /// Replace the contents with a historical fetch, verbatim.
    pub fn bootstrap(&mut self, bars: Vec<Kline>) {
        self.bars = bars;
        self.trim();
        debug!(key = %self.key, bars = self.bars.len(), "series bootstrapped");
    }

    /// Merge one live bar.
    pub fn merge(&mut self, kline: Kline) -> MergeOutcome {
        let last_time = self.bars.last().map(|k| k.time);
        let outcome = match last_time {
            Some(t) if t == kline.time => {
                if let Some(last) = self.bars.last_mut() {
                    *last = kline;
                }
                MergeOutcome::Replaced
            }
            Some(t) if kline.time < t => MergeOutcome::Stale,
            _ => {
                self.bars.push(kline);
                self.trim();
                MergeOutcome::Appended
            }
        };

        if outcome == MergeOutcome::Stale {
            debug!(
                key = %self.key,
                time = kline.time,
                "ignoring live bar older than the trailing bar"
            );
        }
        outcome
    }

    fn trim(&mut self) {
        if self.bars.len() > self.max_bars {
            let excess = self.bars.len() - self.max_bars;
            self.bars.drain(..excess);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Interval;

    fn bar(time: i64, close: f64) -> Kline {
        Kline {
            time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    fn series(max: usize) -> Series {
        Series::new(StreamKey::new("BTCUSDT", Interval::M1), max)
    }

    #[test]
    fn bootstrap_is_verbatim() {
        let mut s = series(100);
        let bars = vec![bar(0, 10.0), bar(60, 11.0), bar(120, 9.0)];
        s.bootstrap(bars.clone());
        assert_eq!(s.bars(), bars.as_slice());
    }

    #[test]
    fn same_time_replaces_trailing_bar() {
        let mut s = series(100);
        s.bootstrap(vec![bar(0, 10.0), bar(60, 11.0)]);

        assert_eq!(s.merge(bar(60, 11.5)), MergeOutcome::Replaced);
        assert_eq!(s.merge(bar(60, 11.5)), MergeOutcome::Replaced);
        assert_eq!(s.len(), 2);

        let revised = Kline {
            volume: 99.0,
            ..bar(60, 12.0)
        };
        s.merge(revised);
        assert_eq!(s.len(), 2);
        assert_eq!(s.last(), Some(&revised));
    }

    #[test]
    fn new_time_appends() {
        let mut s = series(100);
        s.bootstrap(vec![bar(0, 10.0)]);
        assert_eq!(s.merge(bar(60, 10.5)), MergeOutcome::Appended);
        assert_eq!(s.len(), 2);
        assert_eq!(s.last().map(|k| k.time), Some(60));
    }

    #[test]
    fn merge_into_empty_appends() {
        let mut s = series(100);
        assert_eq!(s.merge(bar(0, 10.0)), MergeOutcome::Appended);
        assert_eq!(s.len(), 1);
    }

    fn closes(s: &Series) -> Vec<f64> {
        s.bars().iter().map(|k| k.close).collect()
    }

    #[test]
    fn older_bar_is_stale() {
        let mut s = series(100);
        s.bootstrap(vec![bar(0, 10.0), bar(60, 11.0)]);
        assert_eq!(s.merge(bar(0, 50.0)), MergeOutcome::Stale);
        assert_eq!(closes(&s), vec![10.0, 11.0]);
    }

    #[test]
    fn trims_oldest_past_capacity() {
        let mut s = series(3);
        for i in 0..5 {
            s.merge(bar(i * 60, 100.0 + i as f64));
        }
        assert_eq!(s.len(), 3);
        assert_eq!(closes(&s), vec![102.0, 103.0, 104.0]);
    }
}
