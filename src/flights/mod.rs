//! Flight search: itineraries, ranking, price calendars.

pub mod calendar;
pub mod format;
pub mod itinerary;
pub mod ranker;
pub mod skyscanner;

pub use calendar::{
    find_cheapest_round_trip, parse_date, CalendarDay, CalendarMatch, CalendarService, PriceMap,
    RoundTripWindow,
};
pub use itinerary::{Itinerary, Leg, Price};
pub use ranker::{rank, RankedView, RankingCategory, Rankings};
pub use skyscanner::{
    PlaceDetails, RoundTripQuery, SearchResponse, SearchResults, SearchSession, SkyscannerClient,
};
