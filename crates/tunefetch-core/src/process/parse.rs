//! Progress markers in fetch/transcode tool output.

/// Phase tag the fetch tool prints before its percentage.
pub const FETCH_PHASE_TAG: &str = "[download]";

/// Parses `"[download]  42.7% of ..."` into `42.7`.
pub fn parse_fetch_percent(line: &str) -> Option<f64> {
    parse_tagged_percent(line, FETCH_PHASE_TAG)
}

/// Parses `"<tag> NN.N%"`: the first whitespace token after `tag` ending in `%`.
pub fn parse_tagged_percent(line: &str, tag: &str) -> Option<f64> {
    let start = line.find(tag)? + tag.len();
    let token = line[start..].split_whitespace().next()?;
    let number = token.strip_suffix('%')?;
    let value: f64 = number.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// Parses `HH:MM:SS.ss` (hours may exceed two digits) into seconds.
pub fn parse_clock(s: &str) -> Option<f64> {
    let mut parts = s.trim().split(':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let sec: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || h < 0.0 || !(0.0..60.0).contains(&m) || !(0.0..60.0).contains(&sec) {
        return None;
    }
    Some(h * 3600.0 + m * 60.0 + sec)
}

/// Parses the input duration from `"  Duration: 00:03:12.45, start: ..."`.
pub fn parse_duration(line: &str) -> Option<f64> {
    let start = line.find("Duration:")? + "Duration:".len();
    let rest = line[start..].trim_start();
    let token = rest.split(|c: char| c == ',' || c.is_whitespace()).next()?;
    parse_clock(token)
}

/// Parses the position from a stats line `"... time=00:01:02.50 bitrate=..."`.
/// Keys that merely end in `time=` (e.g. `out_time=`) are not matched.
pub fn parse_time(line: &str) -> Option<f64> {
    for (idx, _) in line.match_indices("time=") {
        let standalone = line[..idx]
            .chars()
            .next_back()
            .map(|c| c.is_whitespace())
            .unwrap_or(true);
        if !standalone {
            continue;
        }
        let rest = &line[idx + "time=".len()..];
        let token = rest.split_whitespace().next()?;
        return parse_clock(token);
    }
    None
}

/// Turns transcode output into a 0–100 percent: the duration is captured once,
/// every later `time=` is divided by it.
#[derive(Debug, Clone, Default)]
pub struct TranscodeTracker {
    duration: Option<f64>,
}

impl TranscodeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Feeds one output line; returns a percent when the line carries a position.
    pub fn observe(&mut self, line: &str) -> Option<f64> {
        if self.duration.is_none() {
            if let Some(d) = parse_duration(line).filter(|d| *d > 0.0) {
                self.duration = Some(d);
                return None;
            }
        }
        let duration = self.duration?;
        let current = parse_time(line)?;
        Some((current / duration * 100.0).clamp(0.0, 100.0))
    }
}
