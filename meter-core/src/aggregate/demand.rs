use std::collections::BTreeMap;

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use crate::domain::Reading;

pub const HOURLY_SPAN: Duration = Duration::hours(24);
pub const DAILY_SPAN: Duration = Duration::days(30);
pub const REALTIME_SPAN: Duration = Duration::hours(6);
/// Upper bound on points in the real-time series.
pub const REALTIME_POINTS: usize = 100;

/// The three chart views served by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandView {
    /// Hour-of-day profile over the trailing 24 hours.
    Hourly,
    /// Calendar-day profile over the trailing 30 days.
    Daily,
    /// Raw points over the trailing 6 hours.
    Realtime,
}

impl DemandView {
    pub fn span(self) -> Duration {
        match self {
            DemandView::Hourly => HOURLY_SPAN,
            DemandView::Daily => DAILY_SPAN,
            DemandView::Realtime => REALTIME_SPAN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DemandView::Hourly => "hourly",
            DemandView::Daily => "daily",
            DemandView::Realtime => "realtime",
        }
    }

    /// Store query bounds covering `[now - span, now]`; the upper bound is
    /// exclusive in `ReadingStore::window`, hence the extra nanosecond.
    pub fn bounds(self, now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
        (now - self.span(), now + Duration::NANOSECOND)
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BucketLabel {
    Hour {
        #[serde(rename = "hora")]
        hour: String,
    },
    Date {
        #[serde(rename = "data")]
        display: String,
        #[serde(rename = "data_iso")]
        iso: String,
    },
}

/// Statistics for one time window. Values are rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandBucket {
    #[serde(flatten)]
    pub label: BucketLabel,
    #[serde(rename = "demanda_media")]
    pub average: f64,
    #[serde(rename = "demanda_maxima")]
    pub max: f64,
    #[serde(rename = "demanda_minima")]
    pub min: f64,
    #[serde(rename = "registros")]
    pub count: u32,
}

/// Figures across the non-empty buckets of a profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandStats {
    #[serde(rename = "media_geral")]
    pub average: f64,
    #[serde(rename = "maxima_geral")]
    pub max: f64,
    #[serde(rename = "minima_geral")]
    pub min: f64,
    /// Exposed under a view-specific key by the caller.
    #[serde(skip)]
    pub buckets_with_data: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemandProfile {
    pub buckets: Vec<DemandBucket>,
    pub stats: DemandStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandPoint {
    /// Local wall-clock time, `HH:MM:SS`.
    #[serde(rename = "timestamp")]
    pub label: String,
    #[serde(rename = "timestamp_iso", with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    #[serde(rename = "demanda")]
    pub demand: f64,
    #[serde(rename = "demanda_maxima")]
    pub max_demand: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeDemand {
    /// Oldest first.
    pub points: Vec<DemandPoint>,
    pub current: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    max: f64,
    min: Option<f64>,
    count: u32,
}

impl Accumulator {
    fn add(&mut self, v: f64) {
        self.sum += v;
        self.max = self.max.max(v);
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.count += 1;
    }

    fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / f64::from(self.count)
        }
    }

    fn bucket(&self, label: BucketLabel) -> DemandBucket {
        DemandBucket {
            label,
            average: round2(self.average()),
            max: round2(self.max),
            min: round2(self.min.unwrap_or(0.0)),
            count: self.count,
        }
    }
}

fn overall<'a>(accs: impl Iterator<Item = &'a Accumulator>) -> DemandStats {
    let mut with_data = 0usize;
    let mut avg_sum = 0.0;
    let mut max: f64 = 0.0;
    let mut min: Option<f64> = None;

    for acc in accs {
        max = max.max(acc.max);
        let avg = acc.average();
        if avg > 0.0 {
            with_data += 1;
            avg_sum += avg;
            if let Some(m) = acc.min {
                min = Some(min.map_or(m, |cur| cur.min(m)));
            }
        }
    }

    let average = if with_data > 0 {
        avg_sum / with_data as f64
    } else {
        0.0
    };

    DemandStats {
        average: round2(average),
        max: round2(max),
        min: round2(min.unwrap_or(0.0)),
        buckets_with_data: with_data,
    }
}

/// Readings inside `[since, now]` with a strictly positive active demand.
fn qualifying(
    readings: &[Reading],
    since: OffsetDateTime,
    now: OffsetDateTime,
) -> impl Iterator<Item = (&Reading, f64)> + '_ {
    readings
        .iter()
        .filter(move |r| r.created_at >= since && r.created_at <= now)
        .filter_map(|r| r.demand().filter(|d| *d > 0.0).map(|d| (r, d)))
}

fn date_labels(date: Date) -> BucketLabel {
    let (year, month, day) = (date.year(), u8::from(date.month()), date.day());
    BucketLabel::Date {
        display: format!("{day:02}/{month:02}/{year}"),
        iso: format!("{year:04}-{month:02}-{day:02}"),
    }
}

/// Hour-of-day profile over the trailing 24 hours. Always 24 buckets,
/// `"00:00"` through `"23:00"`, in `offset` local time.
pub fn hourly_profile(readings: &[Reading], now: OffsetDateTime, offset: UtcOffset) -> DemandProfile {
    let mut hours = [Accumulator::default(); 24];
    for (reading, demand) in qualifying(readings, now - HOURLY_SPAN, now) {
        let hour = reading.created_at.to_offset(offset).hour();
        hours[usize::from(hour)].add(demand);
    }

    DemandProfile {
        stats: overall(hours.iter()),
        buckets: hours
            .iter()
            .enumerate()
            .map(|(h, acc)| {
                acc.bucket(BucketLabel::Hour {
                    hour: format!("{h:02}:00"),
                })
            })
            .collect(),
    }
}

/// Calendar-day profile over the trailing 30 days. Only days with data
/// appear, ascending.
pub fn daily_profile(readings: &[Reading], now: OffsetDateTime, offset: UtcOffset) -> DemandProfile {
    let mut days: BTreeMap<Date, Accumulator> = BTreeMap::new();
    for (reading, demand) in qualifying(readings, now - DAILY_SPAN, now) {
        let date = reading.created_at.to_offset(offset).date();
        days.entry(date).or_default().add(demand);
    }

    DemandProfile {
        stats: overall(days.values()),
        buckets: days
            .iter()
            .map(|(date, acc)| acc.bucket(date_labels(*date)))
            .collect(),
    }
}

/// The latest qualifying readings of the trailing 6 hours, oldest first.
pub fn realtime_series(readings: &[Reading], now: OffsetDateTime, offset: UtcOffset) -> RealtimeDemand {
    let mut matched: Vec<(&Reading, f64)> =
        qualifying(readings, now - REALTIME_SPAN, now).collect();
    matched.sort_by_key(|(r, _)| r.created_at);
    let tail = &matched[matched.len().saturating_sub(REALTIME_POINTS)..];

    let points = tail
        .iter()
        .map(|(r, demand)| {
            let local = r.created_at.to_offset(offset);
            DemandPoint {
                label: format!(
                    "{:02}:{:02}:{:02}",
                    local.hour(),
                    local.minute(),
                    local.second()
                ),
                at: r.created_at,
                demand: round2(*demand),
                max_demand: round2(r.measurements.max_active_demand.unwrap_or(0.0)),
            }
        })
        .collect();

    let current = tail.last().map_or(0.0, |(_, d)| *d);
    let max = tail.iter().map(|(_, d)| *d).fold(0.0, f64::max);

    RealtimeDemand {
        points,
        current: round2(current),
        max: round2(max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::reading_at;
    use time::macros::{datetime, offset};

    const NOW: OffsetDateTime = datetime!(2024-05-10 15:30:00 UTC);

    #[test]
    fn hourly_always_has_24_labelled_buckets() {
        let readings = vec![reading_at(NOW - Duration::hours(1), Some(100.0))];
        let profile = hourly_profile(&readings, NOW, UtcOffset::UTC);

        assert_eq!(profile.buckets.len(), 24);
        for (h, bucket) in profile.buckets.iter().enumerate() {
            assert_eq!(
                bucket.label,
                BucketLabel::Hour {
                    hour: format!("{h:02}:00")
                }
            );
        }

        let empty = hourly_profile(&[], NOW, UtcOffset::UTC);
        assert_eq!(empty.buckets.len(), 24);
        assert!(empty.buckets.iter().all(|b| b.count == 0 && b.average == 0.0));
        assert_eq!(empty.stats.average, 0.0);
        assert_eq!(empty.stats.max, 0.0);
        assert_eq!(empty.stats.min, 0.0);
    }

    #[test]
    fn single_reading_bucket_is_its_value() {
        let readings = vec![reading_at(datetime!(2024-05-10 14:10:00 UTC), Some(732.456))];
        let profile = hourly_profile(&readings, NOW, UtcOffset::UTC);

        let b = &profile.buckets[14];
        assert_eq!((b.average, b.max, b.min, b.count), (732.46, 732.46, 732.46, 1));
    }

    #[test]
    fn bucket_min_is_seeded_from_first_value() {
        let readings = vec![
            reading_at(datetime!(2024-05-10 09:01:00 UTC), Some(5.0)),
            reading_at(datetime!(2024-05-10 09:02:00 UTC), Some(1.0)),
            reading_at(datetime!(2024-05-10 09:03:00 UTC), Some(9.0)),
        ];
        let profile = hourly_profile(&readings, NOW, UtcOffset::UTC);

        let b = &profile.buckets[9];
        assert_eq!((b.average, b.max, b.min, b.count), (5.0, 9.0, 1.0, 3));
        assert_eq!(profile.stats.min, 1.0);
    }

    #[test]
    fn non_positive_or_missing_demand_is_ignored() {
        let readings: Vec<Reading> = (0..24)
            .flat_map(|h| {
                let at = NOW - Duration::hours(h) - Duration::minutes(1);
                [
                    reading_at(at, Some(0.0)),
                    reading_at(at, Some(-12.0)),
                    reading_at(at, None),
                ]
            })
            .collect();

        let profile = hourly_profile(&readings, NOW, UtcOffset::UTC);
        assert!(profile.buckets.iter().all(|b| b.count == 0 && b.max == 0.0));
        assert_eq!(profile.stats.average, 0.0);
        assert_eq!(profile.stats.max, 0.0);
        assert_eq!(profile.stats.min, 0.0);
        assert_eq!(profile.stats.buckets_with_data, 0);

        assert!(daily_profile(&readings, NOW, UtcOffset::UTC).buckets.is_empty());
        assert!(realtime_series(&readings, NOW, UtcOffset::UTC).points.is_empty());
    }

    #[test]
    fn hourly_excludes_readings_older_than_a_day() {
        let readings = vec![
            reading_at(NOW - Duration::hours(25), Some(999.0)),
            reading_at(NOW - Duration::hours(2), Some(10.0)),
        ];
        let profile = hourly_profile(&readings, NOW, UtcOffset::UTC);

        assert_eq!(profile.stats.max, 10.0);
        assert_eq!(profile.buckets.iter().map(|b| b.count).sum::<u32>(), 1);
    }

    #[test]
    fn hourly_groups_by_local_hour() {
        let readings = vec![reading_at(datetime!(2024-05-10 02:15:00 UTC), Some(50.0))];
        let profile = hourly_profile(&readings, NOW, offset!(-3));

        assert_eq!(profile.buckets[23].count, 1);
        assert_eq!(profile.buckets[2].count, 0);
    }

    #[test]
    fn overall_stats_span_non_empty_buckets() {
        let readings = vec![
            reading_at(datetime!(2024-05-10 08:00:00 UTC), Some(100.0)),
            reading_at(datetime!(2024-05-10 08:30:00 UTC), Some(300.0)),
            reading_at(datetime!(2024-05-10 12:00:00 UTC), Some(50.0)),
        ];
        let stats = hourly_profile(&readings, NOW, UtcOffset::UTC).stats;

        // Mean of bucket means (200 and 50), not of readings.
        assert_eq!(stats.average, 125.0);
        assert_eq!(stats.max, 300.0);
        assert_eq!(stats.min, 50.0);
        assert_eq!(stats.buckets_with_data, 2);
    }

    #[test]
    fn overall_average_uses_unrounded_bucket_means() {
        let readings = vec![
            reading_at(datetime!(2024-05-10 08:00:00 UTC), Some(1.0044)),
            reading_at(datetime!(2024-05-10 09:00:00 UTC), Some(1.0044)),
            reading_at(datetime!(2024-05-10 10:00:00 UTC), Some(1.0044)),
            reading_at(datetime!(2024-05-10 11:00:00 UTC), Some(1.0099)),
        ];
        let profile = hourly_profile(&readings, NOW, UtcOffset::UTC);

        assert_eq!(profile.buckets[8].average, 1.0);
        assert_eq!(profile.buckets[11].average, 1.01);
        // 1.005775 before rounding; averaging the rounded buckets gives 1.0025.
        assert_eq!(profile.stats.average, 1.01);
    }

    #[test]
    fn daily_has_one_bucket_per_date_ascending() {
        let readings = vec![
            reading_at(datetime!(2024-05-01 10:00:00 UTC), Some(10.0)),
            reading_at(datetime!(2024-05-01 11:00:00 UTC), Some(30.0)),
            reading_at(datetime!(2024-05-04 10:00:00 UTC), Some(5.0)),
            reading_at(datetime!(2024-05-09 10:00:00 UTC), Some(7.0)),
        ];
        let profile = daily_profile(&readings, NOW, UtcOffset::UTC);

        let labels: Vec<BucketLabel> = profile.buckets.iter().map(|b| b.label.clone()).collect();
        assert_eq!(
            labels,
            vec![
                BucketLabel::Date {
                    display: "01/05/2024".to_string(),
                    iso: "2024-05-01".to_string()
                },
                BucketLabel::Date {
                    display: "04/05/2024".to_string(),
                    iso: "2024-05-04".to_string()
                },
                BucketLabel::Date {
                    display: "09/05/2024".to_string(),
                    iso: "2024-05-09".to_string()
                },
            ]
        );
        assert_eq!(profile.buckets[0].average, 20.0);
        assert_eq!(profile.stats.buckets_with_data, 3);
        assert_eq!(profile.stats.min, 5.0);
    }

    #[test]
    fn daily_drops_readings_older_than_30_days() {
        let readings = vec![reading_at(NOW - Duration::days(31), Some(10.0))];
        assert!(daily_profile(&readings, NOW, UtcOffset::UTC).buckets.is_empty());
    }

    #[test]
    fn realtime_keeps_latest_hundred_in_order() {
        let first = NOW - Duration::minutes(150);
        let readings: Vec<Reading> = (0..150)
            .map(|i| reading_at(first + Duration::minutes(i), Some((i + 1) as f64)))
            .collect();

        let series = realtime_series(&readings, NOW, UtcOffset::UTC);

        assert_eq!(series.points.len(), 100);
        assert_eq!(series.points[0].demand, 51.0);
        assert_eq!(series.points[99].demand, 150.0);
        assert!(series.points.windows(2).all(|w| w[0].at <= w[1].at));
        assert_eq!(series.current, 150.0);
        assert_eq!(series.max, 150.0);
    }

    #[test]
    fn realtime_point_carries_local_label_and_max_demand() {
        let mut reading = reading_at(datetime!(2024-05-10 15:00:05 UTC), Some(10.0));
        reading.measurements.max_active_demand = Some(12.346);
        let series = realtime_series(&[reading], NOW, offset!(-3));

        assert_eq!(series.points[0].label, "12:00:05");
        assert_eq!(series.points[0].max_demand, 12.35);
    }

    #[test]
    fn realtime_empty_window() {
        let readings = vec![reading_at(NOW - Duration::hours(7), Some(10.0))];
        let series = realtime_series(&readings, NOW, UtcOffset::UTC);

        assert!(series.points.is_empty());
        assert_eq!(series.current, 0.0);
        assert_eq!(series.max, 0.0);
    }

    #[test]
    fn bounds_include_now() {
        let (since, until) = DemandView::Hourly.bounds(NOW);
        assert_eq!(since, NOW - Duration::hours(24));
        assert!(NOW < until);
    }

    #[test]
    fn bucket_serializes_with_dashboard_keys() {
        let readings = vec![reading_at(datetime!(2024-05-09 10:00:00 UTC), Some(10.0))];
        let profile = daily_profile(&readings, NOW, UtcOffset::UTC);

        let v = serde_json::to_value(&profile.buckets[0]).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "data": "09/05/2024",
                "data_iso": "2024-05-09",
                "demanda_media": 10.0,
                "demanda_maxima": 10.0,
                "demanda_minima": 10.0,
                "registros": 1
            })
        );
    }
}
