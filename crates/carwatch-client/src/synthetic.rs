use carwatch_core::models::{CandidateListing, SearchSpec};
use chrono::Utc;

const SYNTHETIC_COUNT: usize = 5;

/// Deterministic-shape fake listings for demos and development.
///
/// Values are random but always inside the search's bounds, so every
/// result survives the pipeline's bounds filter.
#[derive(Debug, Clone, Default)]
pub struct SyntheticGenerator;

impl SyntheticGenerator {
    pub fn generate(&self, search: &SearchSpec) -> Vec<CandidateListing> {
        let year_min = search.year_min.unwrap_or(2010.min(search.year_max.unwrap_or(i32::MAX)));
        let (year_lo, year_hi) = bounds(year_min, search.year_max.unwrap_or(year_min.max(2023)));
        let price_min = search.price_min.unwrap_or(5_000.min(search.price_max.unwrap_or(u32::MAX)));
        let (price_lo, price_hi) = bounds(price_min, search.price_max.unwrap_or(price_min.max(30_000)));
        let mileage_hi = search.mileage_max.unwrap_or(150_000);
        let (mileage_lo, mileage_hi) = bounds(10_000.min(mileage_hi), mileage_hi);
        let location = if search.location.is_empty() {
            None
        } else {
            Some(search.location.text.clone())
        };
        let query = search.query_text();

        (1..=SYNTHETIC_COUNT)
            .map(|i| {
                let year = rand::random_range(year_lo..=year_hi);
                let price = rand::random_range(price_lo..=price_hi);
                let mileage = rand::random_range(mileage_lo..=mileage_hi);
                let title = format!("{year} {query} - Test {i}");

                let mut listing = CandidateListing::new(title, format!("${price}"), "synthetic", Utc::now())
                    .with_year(year.to_string())
                    .with_mileage(format!("{mileage} miles"))
                    .with_url(format!("https://example.com/listing/synthetic-{i}"));
                listing.location = location.clone();
                listing
            })
            .collect()
    }
}

/// Order a possibly inverted pair.
fn bounds<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if a <= b { (a, b) } else { (b, a) }
}
