//! Price calendars and the cheapest round-trip window search.

use crate::error::{Result, VenteError};
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date supplied by a caller.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
        VenteError::Validation(format!(
            "Invalid date format: '{}'. Please use YYYY-MM-DD.",
            raw
        ))
    })
}

/// One calendar entry as reported upstream.
///
/// The date is kept as the raw upstream string; it is only parsed when the
/// day is folded into a [`PriceMap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: String,
    /// `None` means no quote for that day.
    pub price: Option<f64>,
    pub group: Option<String>,
}

impl CalendarDay {
    pub fn new(date: impl Into<String>, price: Option<f64>) -> Self {
        Self {
            date: date.into(),
            price,
            group: None,
        }
    }

    /// Parse an upstream `{"day", "price", "group"}` object.
    pub fn from_json(value: &Value) -> Option<Self> {
        let date = value.get("day")?.as_str()?.to_string();
        let price = value
            .get("price")
            .and_then(|p| p.as_f64())
            .filter(|p| p.is_finite());
        let group = value
            .get("group")
            .and_then(|g| g.as_str())
            .filter(|g| !g.is_empty())
            .map(str::to_string);
        Some(Self { date, price, group })
    }
}

/// Parse the `flights.days` array of a price calendar response.
pub fn parse_calendar_days(body: &Value) -> Vec<CalendarDay> {
    body.get("flights")
        .and_then(|f| f.get("days"))
        .and_then(|d| d.as_array())
        .map(|days| days.iter().filter_map(CalendarDay::from_json).collect())
        .unwrap_or_default()
}

/// Capability that fetches a one-way price calendar for a route.
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn fetch_calendar(&self, origin_id: &str, destination_id: &str)
        -> Result<Vec<CalendarDay>>;
}

/// Date to price lookup built from a calendar, keeping only quoted days.
///
/// Iteration is in ascending date order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceMap {
    prices: BTreeMap<NaiveDate, f64>,
    rejected: usize,
}

impl PriceMap {
    /// Build from calendar days. Unpriced days are dropped; days whose date
    /// does not parse are dropped and counted in [`PriceMap::rejected`].
    pub fn from_days(days: &[CalendarDay]) -> Self {
        let mut map = PriceMap::default();
        for day in days {
            let Some(price) = day.price else { continue };
            match NaiveDate::parse_from_str(&day.date, DATE_FORMAT) {
                Ok(date) => {
                    map.prices.insert(date, price);
                }
                Err(_) => {
                    warn!("Skipping calendar day with malformed date '{}'", day.date);
                    map.rejected += 1;
                }
            }
        }
        map
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.prices.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Number of priced entries dropped for a malformed date.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.prices.iter().map(|(d, p)| (*d, *p))
    }
}

impl FromIterator<(NaiveDate, f64)> for PriceMap {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, f64)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
            rejected: 0,
        }
    }
}

/// The cheapest aligned outbound/return pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundTripWindow {
    pub outbound_date: NaiveDate,
    pub return_date: NaiveDate,
    pub outbound_price: f64,
    pub return_price: f64,
    pub total_price: f64,
}

/// Result of a round-trip window search.
#[derive(Debug, Clone, PartialEq)]
pub enum CalendarMatch {
    Found(RoundTripWindow),
    /// At least one direction has no quoted day at all.
    NoPricingData,
    /// Both directions have quotes but none line up for the trip length.
    NoTripsForDuration { trip_duration_days: i64 },
}

/// Find the outbound date minimising `outbound + return` where the return
/// date is exactly `trip_duration_days` later and both days are quoted.
///
/// One pass over the outbound days in ascending date order; on equal totals
/// the earliest outbound date wins.
pub fn find_cheapest_round_trip(
    outbound: &PriceMap,
    inbound: &PriceMap,
    trip_duration_days: i64,
) -> Result<CalendarMatch> {
    let offset = u64::try_from(trip_duration_days)
        .ok()
        .filter(|d| *d > 0)
        .ok_or_else(|| {
            VenteError::Validation("Trip duration must be a positive number of days.".to_string())
        })?;

    if outbound.is_empty() || inbound.is_empty() {
        return Ok(CalendarMatch::NoPricingData);
    }

    let mut best: Option<RoundTripWindow> = None;
    for (outbound_date, outbound_price) in outbound.iter() {
        let Some(return_date) = outbound_date.checked_add_days(Days::new(offset)) else {
            continue;
        };
        let Some(return_price) = inbound.get(return_date) else {
            continue;
        };

        let total_price = outbound_price + return_price;
        if best.as_ref().map_or(true, |b| total_price < b.total_price) {
            best = Some(RoundTripWindow {
                outbound_date,
                return_date,
                outbound_price,
                return_price,
                total_price,
            });
        }
    }

    Ok(match best {
        Some(window) => {
            debug!(
                outbound = %window.outbound_date,
                inbound = %window.return_date,
                total = window.total_price,
                "Cheapest window found"
            );
            CalendarMatch::Found(window)
        }
        None => CalendarMatch::NoTripsForDuration { trip_duration_days },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn map(entries: &[(&str, f64)]) -> PriceMap {
        entries.iter().map(|(d, p)| (date(d), *p)).collect()
    }

    #[test]
    fn test_cheapest_window_example() {
        let outbound = map(&[("2024-12-20", 100.0), ("2024-12-21", 80.0)]);
        let inbound = map(&[("2024-12-27", 90.0), ("2024-12-28", 70.0)]);

        let result = find_cheapest_round_trip(&outbound, &inbound, 7).unwrap();
        assert_eq!(
            result,
            CalendarMatch::Found(RoundTripWindow {
                outbound_date: date("2024-12-21"),
                return_date: date("2024-12-28"),
                outbound_price: 80.0,
                return_price: 70.0,
                total_price: 150.0,
            })
        );
    }

    #[test]
    fn test_repeated_runs_agree() {
        let outbound = map(&[("2025-03-01", 50.0), ("2025-03-02", 60.0), ("2025-03-03", 40.0)]);
        let inbound = map(&[("2025-03-04", 60.0), ("2025-03-05", 50.0), ("2025-03-06", 70.0)]);

        let first = find_cheapest_round_trip(&outbound, &inbound, 3).unwrap();
        for _ in 0..5 {
            assert_eq!(find_cheapest_round_trip(&outbound, &inbound, 3).unwrap(), first);
        }
    }

    #[test]
    fn test_ties_go_to_earliest_outbound_date() {
        let outbound = map(&[("2025-01-10", 50.0), ("2025-01-05", 50.0)]);
        let inbound = map(&[("2025-01-12", 50.0), ("2025-01-17", 50.0)]);

        match find_cheapest_round_trip(&outbound, &inbound, 7).unwrap() {
            CalendarMatch::Found(w) => assert_eq!(w.outbound_date, date("2025-01-05")),
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_offset_crosses_month_and_year_boundaries() {
        let outbound = map(&[("2024-02-26", 30.0), ("2024-12-29", 20.0)]);
        let inbound = map(&[("2024-03-04", 30.0), ("2025-01-05", 60.0)]);

        match find_cheapest_round_trip(&outbound, &inbound, 7).unwrap() {
            CalendarMatch::Found(w) => {
                assert_eq!(w.outbound_date, date("2024-02-26"));
                assert_eq!(w.return_date, date("2024-03-04"));
                assert_eq!(w.total_price, 60.0);
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_maps_mean_no_pricing_data() {
        let some = map(&[("2024-12-20", 100.0)]);
        let empty = PriceMap::default();

        assert_eq!(
            find_cheapest_round_trip(&empty, &some, 7).unwrap(),
            CalendarMatch::NoPricingData
        );
        assert_eq!(
            find_cheapest_round_trip(&some, &empty, 7).unwrap(),
            CalendarMatch::NoPricingData
        );
    }

    #[test]
    fn test_unaligned_maps_mean_no_trips() {
        let outbound = map(&[("2024-12-20", 100.0)]);
        let inbound = map(&[("2024-12-21", 100.0)]);

        assert_eq!(
            find_cheapest_round_trip(&outbound, &inbound, 7).unwrap(),
            CalendarMatch::NoTripsForDuration {
                trip_duration_days: 7
            }
        );
    }

    #[test]
    fn test_non_positive_duration_is_rejected() {
        let some = map(&[("2024-12-20", 100.0)]);
        for days in [0, -3] {
            let err = find_cheapest_round_trip(&some, &some, days).unwrap_err();
            assert!(matches!(err, VenteError::Validation(_)));
        }
    }

    #[test]
    fn test_price_map_drops_unpriced_and_malformed_days() {
        let days = vec![
            CalendarDay::new("2024-12-20", Some(100.0)),
            CalendarDay::new("2024-12-21", None),
            CalendarDay::new("20-12-2024", Some(5.0)),
            CalendarDay::new("2024-02-30", Some(5.0)),
        ];

        let prices = PriceMap::from_days(&days);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices.rejected(), 2);
        assert_eq!(prices.get(date("2024-12-20")), Some(100.0));
        assert_eq!(prices.get(date("2024-12-21")), None);
    }

    #[test]
    fn test_parse_calendar_response() {
        let body = json!({
            "flights": {
                "days": [
                    {"day": "2024-12-20", "price": 89.0, "group": "low"},
                    {"day": "2024-12-21", "price": null, "group": ""},
                    {"price": 10.0}
                ]
            }
        });

        let days = parse_calendar_days(&body);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].group.as_deref(), Some("low"));
        assert_eq!(days[1].price, None);
        assert_eq!(days[1].group, None);

        assert!(parse_calendar_days(&json!({})).is_empty());
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("2024-12-25").is_ok());
        assert!(matches!(
            parse_date("25/12/2024"),
            Err(VenteError::Validation(_))
        ));
    }
}
