//! Resolution Resolver
//!
//! Maps a chart resolution token to a bucket width and to the token the
//! upstream data API expects.
//!
//! | Token | Width | Upstream |
//! |-------|-------|----------|
//! | `1S` | 1s | `1s` |
//! | `1` `5` `15` `30` | minutes | `1m` `5m` `15m` `30m` |
//! | `60` `240` `360` `720` | hours | `1h` `4h` `6h` `12h` |
//! | `1440`, `D`, `1D` | 1 day | `1d` |
//!
//! Also accepted: `<n>S`, `<n>H`, `<n>D`, `<n>W`, and bare numbers below 60
//! (minutes). Anything else, including a count whose width does not fit in
//! signed unix seconds, resolves to one hour.

/// Resolutions the feed advertises to charting consumers.
pub const SUPPORTED_RESOLUTIONS: [&str; 10] = [
    "1S", "1", "5", "15", "30", "60", "240", "360", "720", "1440",
];

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

/// Bucket geometry for one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionSpec {
    bucket_width_secs: u64,
    upstream: String,
}

impl ResolutionSpec {
    /// `n` units of `unit_secs`, or `None` when the width overflows.
    fn scaled(n: u64, unit_secs: u64, suffix: char) -> Option<Self> {
        let width = n
            .checked_mul(unit_secs)
            .filter(|width| i64::try_from(*width).is_ok())?;
        Some(Self::new(width, format!("{n}{suffix}")))
    }

    fn hours(n: u64) -> Self {
        Self::new(n * HOUR, format!("{n}h"))
    }

    const fn new(bucket_width_secs: u64, upstream: String) -> Self {
        Self {
            bucket_width_secs,
            upstream,
        }
    }

    /// Bucket width in seconds.
    #[must_use]
    pub const fn bucket_width_secs(&self) -> u64 {
        self.bucket_width_secs
    }

    /// Token understood by the upstream data API.
    #[must_use]
    pub fn upstream_token(&self) -> &str {
        &self.upstream
    }

    /// Whether buckets are narrower than a minute.
    #[must_use]
    pub const fn is_sub_minute(&self) -> bool {
        self.bucket_width_secs < MINUTE
    }

    /// Start of the bucket containing `now` (unix seconds).
    ///
    /// Sub-minute resolutions use `now` itself.
    #[must_use]
    pub fn bucket_start(&self, now: i64) -> i64 {
        if self.is_sub_minute() {
            return now;
        }
        let width = i64::try_from(self.bucket_width_secs).unwrap_or(i64::MAX);
        now.div_euclid(width) * width
    }

    /// Width as a signed offset for cutoff arithmetic.
    #[must_use]
    pub fn width_i64(&self) -> i64 {
        i64::try_from(self.bucket_width_secs).unwrap_or(i64::MAX)
    }
}

/// Resolve a resolution token. Never fails.
#[must_use]
pub fn resolve(token: &str) -> ResolutionSpec {
    let token = token.trim();

    match token {
        "1" | "5" | "15" | "30" => return minutes(parse_count(token)),
        "60" => return ResolutionSpec::hours(1),
        "240" => return ResolutionSpec::hours(4),
        "360" => return ResolutionSpec::hours(6),
        "720" => return ResolutionSpec::hours(12),
        "1440" | "D" | "1D" => return days(1),
        "W" | "1W" => return weeks(1),
        _ => {}
    }

    if let Ok(n) = token.parse::<u64>() {
        return if (1..60).contains(&n) {
            minutes(n)
        } else {
            fallback()
        };
    }

    let Some(unit) = token.chars().last() else {
        return fallback();
    };
    let count = &token[..token.len() - unit.len_utf8()];
    let Some(n) = count.parse::<u64>().ok().filter(|n| *n > 0) else {
        return fallback();
    };

    let spec = match unit.to_ascii_uppercase() {
        'S' => ResolutionSpec::scaled(n, 1, 's'),
        'H' => ResolutionSpec::scaled(n, HOUR, 'h'),
        'D' => ResolutionSpec::scaled(n, DAY, 'd'),
        'W' => ResolutionSpec::scaled(n, WEEK, 'w'),
        _ => None,
    };
    spec.unwrap_or_else(fallback)
}

fn minutes(n: u64) -> ResolutionSpec {
    ResolutionSpec::new(n * MINUTE, format!("{n}m"))
}

fn days(n: u64) -> ResolutionSpec {
    ResolutionSpec::new(n * DAY, format!("{n}d"))
}

fn weeks(n: u64) -> ResolutionSpec {
    ResolutionSpec::new(n * WEEK, format!("{n}w"))
}

fn parse_count(token: &str) -> u64 {
    token.parse().unwrap_or(1)
}

fn fallback() -> ResolutionSpec {
    tracing::debug!("unrecognized resolution, using 1h buckets");
    ResolutionSpec::hours(1)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("1S", 1, "1s" ; "one second")]
    #[test_case("1", 60, "1m" ; "one minute")]
    #[test_case("5", 300, "5m" ; "five minutes")]
    #[test_case("15", 900, "15m" ; "fifteen minutes")]
    #[test_case("30", 1800, "30m" ; "thirty minutes")]
    #[test_case("60", 3600, "1h" ; "one hour")]
    #[test_case("240", 14_400, "4h" ; "four hours")]
    #[test_case("360", 21_600, "6h" ; "six hours")]
    #[test_case("720", 43_200, "12h" ; "twelve hours")]
    #[test_case("1440", 86_400, "1d" ; "one day")]
    fn advertised_resolutions(token: &str, width: u64, upstream: &str) {
        let spec = resolve(token);
        assert_eq!(spec.bucket_width_secs(), width);
        assert_eq!(spec.upstream_token(), upstream);
    }

    #[test_case("D", 86_400 ; "bare day")]
    #[test_case("3D", 259_200 ; "three days")]
    #[test_case("W", 604_800 ; "bare week")]
    #[test_case("2W", 1_209_600 ; "two weeks")]
    #[test_case("2H", 7200 ; "two hours")]
    #[test_case("10S", 10 ; "ten seconds")]
    #[test_case("3", 180 ; "unlisted minutes")]
    #[test_case("45", 2700 ; "unlisted minutes under an hour")]
    fn other_markers(token: &str, width: u64) {
        assert_eq!(resolve(token).bucket_width_secs(), width);
    }

    #[test_case("" ; "empty")]
    #[test_case("0" ; "zero")]
    #[test_case("90" ; "unlisted numeric above an hour")]
    #[test_case("abc" ; "garbage")]
    #[test_case("0S" ; "zero seconds")]
    #[test_case("5X" ; "unknown unit")]
    #[test_case("99999999999999999H" ; "hour count overflows")]
    #[test_case("18446744073709551615W" ; "week count overflows")]
    #[test_case("9223372036854775808S" ; "seconds beyond signed range")]
    fn falls_back_to_one_hour(token: &str) {
        let spec = resolve(token);
        assert_eq!(spec.bucket_width_secs(), 3600);
        assert_eq!(spec.upstream_token(), "1h");
    }

    #[test]
    fn every_advertised_resolution_resolves_explicitly() {
        for token in SUPPORTED_RESOLUTIONS {
            let spec = resolve(token);
            assert!(spec.bucket_width_secs() > 0, "{token}");
        }
    }

    #[test]
    fn bucket_start_floors_to_width() {
        let hourly = resolve("60");
        assert_eq!(hourly.bucket_start(7_199), 3_600);
        assert_eq!(hourly.bucket_start(7_200), 7_200);
    }

    #[test]
    fn sub_minute_bucket_is_now() {
        let secondly = resolve("1S");
        assert!(secondly.is_sub_minute());
        assert_eq!(secondly.bucket_start(1_700_000_001), 1_700_000_001);
        assert!(!resolve("1").is_sub_minute());
    }
}
