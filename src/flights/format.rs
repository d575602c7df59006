//! Plain-text rendering of flight results for the chat host.

use super::calendar::{CalendarDay, CalendarMatch};
use super::itinerary::Itinerary;
use super::ranker::{RankingCategory, Rankings};
use super::skyscanner::SearchResults;

/// `Hh MMm`, or `N/A` for unknown, negative, or infinite values.
pub fn minutes_to_hm(minutes: Option<f64>) -> String {
    match minutes {
        Some(m) if m.is_finite() && m >= 0.0 => {
            let total = m as u64;
            format!("{}h {:02}m", total / 60, total % 60)
        }
        _ => "N/A".to_string(),
    }
}

fn itinerary_lines(itinerary: &Itinerary, rank: usize) -> Vec<String> {
    let price = itinerary
        .price
        .as_ref()
        .map_or_else(|| "N/A".to_string(), |p| p.display());
    let score = itinerary
        .score
        .map_or_else(|| "N/A".to_string(), |s| format!("{:.3}", s));

    let mut lines = vec![
        format!("  Option {}:", rank),
        format!("    Price: {}", price),
        format!(
            "    Total Duration: {}",
            minutes_to_hm(itinerary.total_duration_minutes())
        ),
        format!("    Skyscanner Score: {}", score),
        format!(
            "    Deeplink: {}",
            itinerary.booking_link.as_deref().unwrap_or("N/A")
        ),
    ];

    if itinerary.legs.len() == 2 {
        for (idx, leg) in itinerary.legs.iter().enumerate() {
            let kind = if idx == 0 { "Outbound" } else { "Return" };
            let stops = leg
                .stop_count
                .map_or_else(|| "N/A".to_string(), |s| s.to_string());
            lines.push(format!(
                "    {} Leg: Duration: {}, Stops: {}",
                kind,
                minutes_to_hm(leg.duration_minutes),
                stops
            ));
        }
    }
    lines.push(String::new());
    lines
}

/// Summary header followed by one section per ranking category.
pub fn format_search_results(
    results: &SearchResults,
    rankings: &Rankings<'_>,
    top_n: usize,
) -> String {
    let mut lines = vec![format!(
        "Flight Search Summary (Total found: {}):\n",
        results.total_results
    )];

    for category in RankingCategory::ALL {
        lines.push(format!("--- {} ---", category.title(top_n)));
        let view = rankings.view(category);
        if view.is_no_results() {
            lines.push("  No flights found for this category.".to_string());
        } else {
            for (idx, itinerary) in view.entries().iter().enumerate() {
                lines.extend(itinerary_lines(itinerary, idx + 1));
            }
        }
        lines.push(String::new());
    }

    lines.join("\n").trim_end().to_string()
}

/// Results of a search that stopped before completing, under a notice
/// naming why.
pub fn format_incomplete_search(
    results: &SearchResults,
    rankings: &Rankings<'_>,
    top_n: usize,
    reason: &str,
) -> String {
    format!(
        "Search may be incomplete ({}). Showing the results received so far.\n\n{}",
        reason,
        format_search_results(results, rankings, top_n)
    )
}

/// Every calendar day, quoted or not.
pub fn format_price_calendar(
    origin_name: &str,
    destination_name: &str,
    days: &[CalendarDay],
    currency: &str,
) -> String {
    let mut lines = vec![format!(
        "Flight Price Calendar for {} to {} (Prices in {}):\n",
        origin_name, destination_name, currency
    )];
    for day in days {
        let group = day.group.as_deref().unwrap_or("N/A");
        match day.price {
            Some(price) => lines.push(format!(
                "  - {}: {:.2} {} (Group: {})",
                day.date, price, currency, group
            )),
            None => lines.push(format!(
                "  - {}: No price information (Group: {})",
                day.date, group
            )),
        }
    }
    lines.join("\n")
}

/// The cheapest window, or why there is none.
pub fn format_round_trip(result: &CalendarMatch, trip_duration_days: i64, currency: &str) -> String {
    match result {
        CalendarMatch::Found(window) => [
            format!(
                "Cheapest Indicative Price for a {}-day Round Trip:",
                trip_duration_days
            ),
            format!("  - Outbound Date: {}", window.outbound_date),
            format!("  - Return Date:   {}", window.return_date),
            format!(
                "  - Total Indicative Price: {:.2} {}",
                window.total_price, currency
            ),
        ]
        .join("\n"),
        CalendarMatch::NoPricingData => {
            "No pricing information available in the calendar to find a cheap trip.".to_string()
        }
        CalendarMatch::NoTripsForDuration { trip_duration_days } => format!(
            "Could not find any available round-trip options for a {}-day trip within the calendar's date range.",
            trip_duration_days
        ),
    }
}

/// Attribution line appended when citations are enabled.
pub fn attribution(base_url: &str) -> String {
    format!("Data provided by Skyscanner ({})", base_url)
}
