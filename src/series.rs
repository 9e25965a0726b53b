//! Daily-series builder: one weather observation per day of each location's range.
//!
//! Each day is an independent task. Tasks share one semaphore, so the number of
//! requests in flight across all locations never exceeds the configured
//! concurrency. Day tasks are spawned through a window of the same width, so a
//! long range never queues more than that many tasks per location. Results are
//! slotted back by `(location index, day index)`.

use crate::config::{FailurePolicy, RunSettings};
use crate::error::{PipelineError, WeatherError};
use crate::location::{LocationRecord, ResolvedLocation};
use crate::services::geocoding_api::Coordinates;
use crate::services::weather_api::{DailySummary, WeatherApi};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

pub const SECONDS_PER_DAY: i64 = 86_400;

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// One day of weather metrics for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyObservation {
    pub location_id: String,
    pub day: NaiveDate,
    pub metrics: Map<String, Value>,
}

impl DailyObservation {
    pub fn new(location_id: impl Into<String>, timestamp: i64, summary: DailySummary) -> Self {
        Self {
            location_id: location_id.into(),
            day: local_day(timestamp, summary.utc_offset_seconds),
            metrics: summary.metrics,
        }
    }

    /// The metric as a number, if present and numeric.
    pub fn numeric(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).and_then(Value::as_f64)
    }
}

/// Timestamps `start, start + 1 day, ...` up to and including `end_date`.
pub fn day_timestamps(record: &LocationRecord) -> impl Iterator<Item = i64> + use<> {
    (record.start_date..=record.end_date).step_by(SECONDS_PER_DAY as usize)
}

/// Number of days [`day_timestamps`] yields for `record`.
pub fn day_count(record: &LocationRecord) -> usize {
    ((record.end_date - record.start_date) / SECONDS_PER_DAY + 1) as usize
}

/// Calendar date of `timestamp` at the observation's local offset, UTC when unknown.
pub fn local_day(timestamp: i64, utc_offset_seconds: Option<i32>) -> NaiveDate {
    let utc = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_default();
    match utc_offset_seconds.and_then(FixedOffset::east_opt) {
        Some(offset) => utc.with_timezone(&offset).date_naive(),
        None => utc.date_naive(),
    }
}

pub struct SeriesBuilder<W> {
    weather: Arc<W>,
    permits: Arc<Semaphore>,
    window: usize,
    retries: u32,
    on_error: FailurePolicy,
}

// Clones share the client and the semaphore; `W` need not be `Clone`.
impl<W> Clone for SeriesBuilder<W> {
    fn clone(&self) -> Self {
        Self {
            weather: Arc::clone(&self.weather),
            permits: Arc::clone(&self.permits),
            window: self.window,
            retries: self.retries,
            on_error: self.on_error,
        }
    }
}

impl<W: WeatherApi + 'static> SeriesBuilder<W> {
    pub fn new(weather: Arc<W>, settings: &RunSettings) -> Self {
        Self {
            weather,
            permits: Arc::new(Semaphore::new(settings.concurrency.max(1))),
            window: settings.concurrency.max(1),
            retries: settings.retries,
            on_error: settings.on_error,
        }
    }

    /// Fetches every day in the location's range, in chronological order.
    ///
    /// A location without coordinates yields an empty series and no requests.
    /// Under [`FailurePolicy::Abort`] the first failed day cancels the rest
    /// and is returned; under [`FailurePolicy::Skip`] it is logged and left out.
    #[tracing::instrument(skip_all, fields(location_id = %location.id()))]
    pub async fn build_series(
        &self,
        location: &ResolvedLocation,
    ) -> Result<Vec<DailyObservation>, PipelineError> {
        let Some(coordinates) = location.coordinates else {
            warn!(
                postal_code = %location.record.postal_code,
                "No coordinates for location, skipping weather fetch"
            );
            return Ok(Vec::new());
        };

        // At most `window` day tasks exist at once; the next day is spawned as one finishes.
        let mut days = day_timestamps(&location.record).enumerate();
        let mut tasks = JoinSet::new();
        let mut fetched: Vec<(usize, DailyObservation)> = Vec::new();
        loop {
            while tasks.len() < self.window {
                let Some((idx, timestamp)) = days.next() else {
                    break;
                };
                let this = self.clone();
                tasks.spawn(async move { (idx, timestamp, this.fetch_day(coordinates, timestamp).await) });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (idx, timestamp, result) = joined.unwrap_or_else(propagate_panic);
            match result {
                Ok(summary) => {
                    fetched.push((idx, DailyObservation::new(location.id(), timestamp, summary)));
                }
                Err(source) => {
                    let err = PipelineError::WeatherService {
                        location_id: location.id().to_string(),
                        timestamp,
                        source,
                    };
                    match self.on_error {
                        // Dropping `tasks` aborts the in-flight requests.
                        FailurePolicy::Abort => return Err(err),
                        FailurePolicy::Skip => {
                            warn!(timestamp, error = %err, "Skipping failed day");
                        }
                    }
                }
            }
        }

        fetched.sort_by_key(|(idx, _)| *idx);
        let series: Vec<DailyObservation> = fetched.into_iter().map(|(_, obs)| obs).collect();
        debug!(rows = series.len(), "Series built");
        Ok(series)
    }

    /// Builds the series of every location concurrently. The outer vector
    /// follows the order of `locations`.
    pub async fn build_all(
        &self,
        locations: &[ResolvedLocation],
    ) -> Result<Vec<Vec<DailyObservation>>, PipelineError> {
        let mut tasks = JoinSet::new();
        for (idx, location) in locations.iter().cloned().enumerate() {
            let this = self.clone();
            tasks.spawn(async move { (idx, this.build_series(&location).await) });
        }

        let mut slots: Vec<Vec<DailyObservation>> = vec![Vec::new(); locations.len()];
        while let Some(joined) = tasks.join_next().await {
            let (idx, result) = joined.unwrap_or_else(propagate_panic);
            slots[idx] = result?;
        }

        info!(
            locations = slots.len(),
            rows = slots.iter().map(Vec::len).sum::<usize>(),
            "Weather series fetched"
        );
        Ok(slots)
    }

    async fn fetch_day(
        &self,
        coordinates: Coordinates,
        timestamp: i64,
    ) -> Result<DailySummary, WeatherError> {
        let mut attempt = 0;
        loop {
            let result = {
                // The semaphore is never closed; a missing permit only means no bound.
                let _permit = self.permits.acquire().await.ok();
                self.weather.daily_summary(coordinates, timestamp).await
            };

            match result {
                Ok(summary) => return Ok(summary),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(timestamp, attempt, error = %e, "Weather request failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn propagate_panic<T>(err: JoinError) -> T {
    std::panic::resume_unwind(err.into_panic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DAY0: i64 = 1491350400; // 2017-04-05T00:00:00Z

    /// Answers with `precipProbability` from a table, failing for listed
    /// timestamps a given number of times.
    #[derive(Default)]
    struct FakeWeather {
        values: HashMap<i64, f64>,
        failures: Mutex<HashMap<i64, usize>>,
        calls: AtomicUsize,
        reverse_delay: bool,
        peak_tasks: AtomicUsize,
    }

    #[async_trait]
    impl WeatherApi for FakeWeather {
        async fn daily_summary(
            &self,
            _coordinates: Coordinates,
            timestamp: i64,
        ) -> Result<DailySummary, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let alive = tokio::runtime::Handle::current().metrics().num_alive_tasks();
            self.peak_tasks.fetch_max(alive, Ordering::SeqCst);
            if self.reverse_delay {
                let later = (DAY0 + 10 * SECONDS_PER_DAY - timestamp) / SECONDS_PER_DAY;
                tokio::time::sleep(Duration::from_millis(later as u64 * 5)).await;
            }
            if let Some(left) = self.failures.lock().unwrap().get_mut(&timestamp) {
                if *left > 0 {
                    *left -= 1;
                    return Err(WeatherError::Status {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        body: String::new(),
                    });
                }
            }
            let mut metrics = Map::new();
            metrics.insert("time".into(), json!(timestamp));
            if let Some(v) = self.values.get(&timestamp) {
                metrics.insert("precipProbability".into(), json!(v));
            }
            Ok(DailySummary {
                metrics,
                utc_offset_seconds: Some(0),
            })
        }
    }

    fn location(id: &str, days: i64, coordinates: Option<Coordinates>) -> ResolvedLocation {
        LocationRecord {
            id: id.into(),
            postal_code: "10001".into(),
            start_date: DAY0,
            end_date: DAY0 + (days - 1) * SECONDS_PER_DAY,
        }
        .resolve(coordinates)
    }

    const HERE: Option<Coordinates> = Some(Coordinates { lat: 40.0, lng: -74.0 });

    fn settings(on_error: FailurePolicy, retries: u32) -> RunSettings {
        RunSettings {
            on_error,
            retries,
            concurrency: 4,
            ..RunSettings::default()
        }
    }

    #[test]
    fn test_day_timestamps_inclusive() {
        let rec = location("A", 3, None).record;
        let days: Vec<i64> = day_timestamps(&rec).collect();
        assert_eq!(days, vec![DAY0, DAY0 + 86400, DAY0 + 2 * 86400]);
        assert_eq!(day_count(&rec), 3);
    }

    #[test]
    fn test_partial_trailing_day_is_not_stepped_into() {
        let rec = LocationRecord {
            id: "A".into(),
            postal_code: "1".into(),
            start_date: DAY0,
            end_date: DAY0 + SECONDS_PER_DAY + 3600,
        };
        assert_eq!(day_timestamps(&rec).count(), 2);
        assert_eq!(day_count(&rec), 2);
    }

    #[test]
    fn test_local_day_uses_offset() {
        // 2017-04-05T02:00Z is still April 4th in New York.
        let ts = DAY0 + 2 * 3600;
        assert_eq!(local_day(ts, None), NaiveDate::from_ymd_opt(2017, 4, 5).unwrap());
        assert_eq!(
            local_day(ts, Some(-4 * 3600)),
            NaiveDate::from_ymd_opt(2017, 4, 4).unwrap()
        );
    }

    #[tokio::test]
    async fn test_one_observation_per_day_in_order() {
        let weather = Arc::new(FakeWeather {
            values: HashMap::from([(DAY0, 0.2), (DAY0 + SECONDS_PER_DAY, 0.5)]),
            reverse_delay: true,
            ..Default::default()
        });
        let builder = SeriesBuilder::new(weather.clone(), &settings(FailurePolicy::Abort, 0));

        let series = builder.build_series(&location("A", 5, HERE)).await.unwrap();

        assert_eq!(series.len(), 5);
        assert!(series.windows(2).all(|w| w[0].day < w[1].day));
        assert!(series.iter().all(|o| o.location_id == "A"));
        assert_eq!(series[0].numeric("precipProbability"), Some(0.2));
        assert_eq!(series[1].numeric("precipProbability"), Some(0.5));
        assert_eq!(series[2].numeric("precipProbability"), None);
        assert_eq!(weather.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_no_coordinates_makes_no_calls() {
        let weather = Arc::new(FakeWeather::default());
        let builder = SeriesBuilder::new(weather.clone(), &settings(FailurePolicy::Abort, 0));

        let series = builder.build_series(&location("A", 3, None)).await.unwrap();

        assert!(series.is_empty());
        assert_eq!(weather.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abort_policy_fails_whole_series() {
        let weather = Arc::new(FakeWeather {
            failures: Mutex::new(HashMap::from([(DAY0 + SECONDS_PER_DAY, usize::MAX)])),
            ..Default::default()
        });
        let builder = SeriesBuilder::new(weather, &settings(FailurePolicy::Abort, 0));

        let err = builder.build_series(&location("A", 3, HERE)).await.unwrap_err();
        match err {
            PipelineError::WeatherService {
                location_id,
                timestamp,
                ..
            } => {
                assert_eq!(location_id, "A");
                assert_eq!(timestamp, DAY0 + SECONDS_PER_DAY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_skip_policy_drops_failed_day() {
        let weather = Arc::new(FakeWeather {
            failures: Mutex::new(HashMap::from([(DAY0 + SECONDS_PER_DAY, usize::MAX)])),
            ..Default::default()
        });
        let builder = SeriesBuilder::new(weather, &settings(FailurePolicy::Skip, 0));

        let series = builder.build_series(&location("A", 3, HERE)).await.unwrap();
        let days: Vec<NaiveDate> = series.iter().map(|o| o.day).collect();
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2017, 4, 5).unwrap(),
                NaiveDate::from_ymd_opt(2017, 4, 7).unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_retries_recover_transient_failure() {
        let weather = Arc::new(FakeWeather {
            failures: Mutex::new(HashMap::from([(DAY0, 2)])),
            ..Default::default()
        });
        let builder = SeriesBuilder::new(weather.clone(), &settings(FailurePolicy::Abort, 2));

        let series = builder.build_series(&location("A", 1, HERE)).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(weather.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_build_all_keeps_location_order() {
        let weather = Arc::new(FakeWeather {
            reverse_delay: true,
            ..Default::default()
        });
        let builder = SeriesBuilder::new(weather, &settings(FailurePolicy::Abort, 0));
        let locations = vec![location("B", 2, HERE), location("A", 1, HERE), location("C", 2, None)];

        let all = builder.build_all(&locations).await.unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(all[0].len(), 2);
        assert_eq!(all[0][0].location_id, "B");
        assert_eq!(all[1][0].location_id, "A");
        assert!(all[2].is_empty());
    }

    #[tokio::test]
    async fn test_long_range_spawns_through_window() {
        let weather = Arc::new(FakeWeather::default());
        let settings = RunSettings {
            concurrency: 2,
            ..RunSettings::default()
        };
        let builder = SeriesBuilder::new(weather.clone(), &settings);

        let series = builder.build_series(&location("A", 400, HERE)).await.unwrap();

        assert_eq!(series.len(), 400);
        assert!(series.windows(2).all(|w| w[0].day < w[1].day));
        assert_eq!(weather.calls.load(Ordering::SeqCst), 400);
        let peak = weather.peak_tasks.load(Ordering::SeqCst);
        assert!(peak <= 2, "{peak} day tasks alive at once");
    }
}
