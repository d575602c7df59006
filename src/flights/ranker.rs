//! Top-N views of a flight result set under independent sort orders.
//!
//! All three orderings are stable: entries that compare equal keep their
//! relative input order, so the same result set always yields the same views.

use super::itinerary::Itinerary;
use std::cmp::Ordering;

/// Default number of entries per view.
pub const DEFAULT_TOP_N: usize = 3;

/// The ranking axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingCategory {
    Cheapest,
    Fastest,
    Recommended,
}

impl RankingCategory {
    pub const ALL: [RankingCategory; 3] = [
        RankingCategory::Cheapest,
        RankingCategory::Fastest,
        RankingCategory::Recommended,
    ];

    pub fn title(&self, top_n: usize) -> String {
        match self {
            RankingCategory::Cheapest => format!("Top {} Cheapest Flights", top_n),
            RankingCategory::Fastest => format!("Top {} Fastest Flights", top_n),
            RankingCategory::Recommended => {
                format!("Top {} Recommended Flights (by Skyscanner score)", top_n)
            }
        }
    }
}

/// One ranked view, or an explicit marker for an empty result set.
#[derive(Debug, Clone, PartialEq)]
pub enum RankedView<'a> {
    Ranked(Vec<&'a Itinerary>),
    NoResults,
}

impl<'a> RankedView<'a> {
    fn from_sorted(mut sorted: Vec<&'a Itinerary>, top_n: usize) -> Self {
        if sorted.is_empty() {
            return RankedView::NoResults;
        }
        sorted.truncate(top_n);
        RankedView::Ranked(sorted)
    }

    pub fn entries(&self) -> &[&'a Itinerary] {
        match self {
            RankedView::Ranked(entries) => entries,
            RankedView::NoResults => &[],
        }
    }

    pub fn is_no_results(&self) -> bool {
        matches!(self, RankedView::NoResults)
    }
}

/// All three views over one result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Rankings<'a> {
    pub cheapest: RankedView<'a>,
    pub fastest: RankedView<'a>,
    pub recommended: RankedView<'a>,
}

impl<'a> Rankings<'a> {
    pub fn view(&self, category: RankingCategory) -> &RankedView<'a> {
        match category {
            RankingCategory::Cheapest => &self.cheapest,
            RankingCategory::Fastest => &self.fastest,
            RankingCategory::Recommended => &self.recommended,
        }
    }
}

/// Rank a result set on every axis.
pub fn rank(itineraries: &[Itinerary], top_n: usize) -> Rankings<'_> {
    Rankings {
        cheapest: by_price(itineraries, top_n),
        fastest: by_duration(itineraries, top_n),
        recommended: by_score(itineraries, top_n),
    }
}

/// Ascending price. Unpriced itineraries last.
pub fn by_price(itineraries: &[Itinerary], top_n: usize) -> RankedView<'_> {
    let mut sorted: Vec<&Itinerary> = itineraries.iter().collect();
    sorted.sort_by(|a, b| a.price_key().total_cmp(&b.price_key()));
    RankedView::from_sorted(sorted, top_n)
}

/// Ascending total duration.
///
/// Only two-leg itineraries have a total duration; every other itinerary
/// sorts after all two-leg ones, whatever their numeric values.
pub fn by_duration(itineraries: &[Itinerary], top_n: usize) -> RankedView<'_> {
    let mut sorted: Vec<&Itinerary> = itineraries.iter().collect();
    sorted.sort_by(|a, b| {
        let a_round_trip = a.legs.len() == 2;
        let b_round_trip = b.legs.len() == 2;
        b_round_trip
            .cmp(&a_round_trip)
            .then_with(|| a.duration_key().total_cmp(&b.duration_key()))
    });
    RankedView::from_sorted(sorted, top_n)
}

/// Descending score; a missing score counts as zero.
pub fn by_score(itineraries: &[Itinerary], top_n: usize) -> RankedView<'_> {
    let mut sorted: Vec<&Itinerary> = itineraries.iter().collect();
    sorted.sort_by(|a, b| match b.score_key().total_cmp(&a.score_key()) {
        // -0.0 and 0.0 are the same score.
        Ordering::Less | Ordering::Greater if b.score_key() == a.score_key() => Ordering::Equal,
        ord => ord,
    });
    RankedView::from_sorted(sorted, top_n)
}
