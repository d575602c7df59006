//! Itinerary data model and lenient parsing of upstream results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A quoted price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    /// Numeric amount.
    pub amount: f64,
    /// Currency code the amount is quoted in.
    pub currency: String,
    /// Display string supplied by the upstream, if any.
    pub formatted: Option<String>,
}

impl Price {
    /// Display form: the upstream's own formatting, else `amount currency`.
    pub fn display(&self) -> String {
        self.formatted
            .clone()
            .unwrap_or_else(|| format!("{:.2} {}", self.amount, self.currency))
    }
}

/// One directional leg of an itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub duration_minutes: Option<f64>,
    pub stop_count: Option<u32>,
}

/// A priced, timed travel option. Immutable snapshot of one search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub id: Option<String>,
    pub price: Option<Price>,
    /// Upstream ranking signal.
    pub score: Option<f64>,
    pub legs: Vec<Leg>,
    pub booking_link: Option<String>,
}

impl Itinerary {
    /// Total duration, defined only for outbound + return pairs.
    ///
    /// `None` when the itinerary does not have exactly two legs or when a leg
    /// duration is missing.
    pub fn total_duration_minutes(&self) -> Option<f64> {
        if self.legs.len() != 2 {
            return None;
        }
        self.legs
            .iter()
            .map(|leg| leg.duration_minutes)
            .sum::<Option<f64>>()
    }

    /// Price used for ordering; missing prices sort last.
    pub fn price_key(&self) -> f64 {
        self.price.as_ref().map_or(f64::INFINITY, |p| p.amount)
    }

    /// Duration used for ordering; undefined durations sort last.
    pub fn duration_key(&self) -> f64 {
        self.total_duration_minutes().unwrap_or(f64::INFINITY)
    }

    /// Score used for ordering; missing scores count as zero.
    pub fn score_key(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }

    /// Parse one upstream result. Never fails: missing or malformed numeric
    /// fields become `None` and rank as the worst value on their axis.
    pub fn from_json(value: &Value, base_url: &str, currency: &str) -> Self {
        let price = value.get("price").and_then(|p| {
            let amount = p.get("raw").and_then(lenient_f64)?;
            Some(Price {
                amount,
                currency: currency.to_string(),
                formatted: p
                    .get("formatted")
                    .and_then(|f| f.as_str())
                    .map(str::to_string),
            })
        });

        let legs = value
            .get("legs")
            .and_then(|l| l.as_array())
            .map(|legs| {
                legs.iter()
                    .map(|leg| Leg {
                        duration_minutes: leg
                            .get("durationInMinutes")
                            .and_then(lenient_f64)
                            .filter(|d| *d >= 0.0),
                        stop_count: leg
                            .get("stopCount")
                            .and_then(|s| s.as_u64())
                            .and_then(|s| u32::try_from(s).ok()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let booking_link = value
            .get("pricingOptions")
            .and_then(|o| o.get(0))
            .and_then(|o| o.get("items"))
            .and_then(|i| i.get(0))
            .and_then(|i| i.get("url"))
            .and_then(|u| u.as_str())
            .filter(|u| !u.is_empty())
            .map(|u| {
                if u.starts_with("http") {
                    u.to_string()
                } else {
                    format!("{}{}", base_url.trim_end_matches('/'), u)
                }
            });

        Self {
            id: value.get("id").and_then(|i| i.as_str()).map(str::to_string),
            price,
            score: value.get("score").and_then(lenient_f64),
            legs,
            booking_link,
        }
    }
}

/// Parse every entry of a results array, keeping malformed ones.
pub fn parse_itineraries(results: &[Value], base_url: &str, currency: &str) -> Vec<Itinerary> {
    let itineraries: Vec<Itinerary> = results
        .iter()
        .map(|r| Itinerary::from_json(r, base_url, currency))
        .collect();

    let unpriced = itineraries.iter().filter(|i| i.price.is_none()).count();
    if unpriced > 0 {
        warn!(
            "{} of {} itineraries have no usable price",
            unpriced,
            itineraries.len()
        );
    }

    itineraries
}

/// Accept finite numbers and numeric strings.
fn lenient_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}
