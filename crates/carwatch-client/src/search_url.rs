//! Search URL builders for the primary marketplace and the classifieds site.

use carwatch_core::models::{Coordinates, SearchSpec};
use url::form_urlencoded::Serializer;

pub const MARKETPLACE_BASE_URL: &str = "https://www.facebook.com";

/// Marketplace vehicle category.
const VEHICLE_CATEGORY_ID: &str = "807311116002614";

const METERS_PER_MILE: f64 = 1609.34;

/// Known cities for location → coordinate resolution. The first entry is
/// the fallback for anything unrecognized.
const KNOWN_CITIES: &[(&str, Coordinates)] = &[
    ("Miami, FL", Coordinates { lat: 25.7617, lng: -80.1918 }),
    ("Orlando, FL", Coordinates { lat: 28.5383, lng: -81.3792 }),
    ("Tampa, FL", Coordinates { lat: 27.9506, lng: -82.4572 }),
    ("Fort Lauderdale, FL", Coordinates { lat: 26.1224, lng: -80.1373 }),
    ("Jacksonville, FL", Coordinates { lat: 30.3322, lng: -81.6557 }),
];

pub fn classifieds_base_url(site: &str) -> String {
    format!("https://{site}.craigslist.org")
}

/// Coordinates for a search's location.
///
/// Uses resolved coordinates when present, then an exact or partial match
/// against the known-city table, then the default city.
pub fn resolve_coordinates(search: &SearchSpec) -> Coordinates {
    if let Some(coords) = search.location.coordinates {
        return coords;
    }
    let text = search.location.text.trim().to_lowercase();
    let city_of = |name: &str| name.split(',').next().unwrap_or(name).trim().to_lowercase();

    KNOWN_CITIES
        .iter()
        .find(|(name, _)| name.to_lowercase() == text)
        .or_else(|| {
            KNOWN_CITIES
                .iter()
                .find(|(name, _)| name.to_lowercase().contains(&text) || text.contains(&city_of(name)))
        })
        .map_or(KNOWN_CITIES[0].1, |(_, coords)| *coords)
}

pub fn radius_meters(miles: u32) -> u32 {
    (f64::from(miles) * METERS_PER_MILE) as u32
}

fn append_location(query: &mut Serializer<'_, String>, search: &SearchSpec) {
    if search.location.is_empty() && search.location.coordinates.is_none() {
        return;
    }
    let coords = resolve_coordinates(search);
    query
        .append_pair("latitude", &coords.lat.to_string())
        .append_pair("longitude", &coords.lng.to_string())
        .append_pair("radius", &radius_meters(search.radius_miles).to_string());
}

fn append_opt<T: ToString>(query: &mut Serializer<'_, String>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        query.append_pair(key, &value.to_string());
    }
}

/// Marketplace URL variants, in the order they should be tried.
///
/// 1. Keyword search in the vehicle category, newest first, all filters
/// 2. Alternate parameter names, best match, price filters only
/// 3. Vehicle category browse (city-specific path when the city has one)
pub fn marketplace_urls(base: &str, search: &SearchSpec) -> Vec<String> {
    let base = base.trim_end_matches('/');
    let query_text = search.query_text();

    let mut v1 = Serializer::new(String::new());
    v1.append_pair("query", &query_text)
        .append_pair("category_id", VEHICLE_CATEGORY_ID)
        .append_pair("sortBy", "creation_time_descend");
    append_location(&mut v1, search);
    append_opt(&mut v1, "maxPrice", search.price_max);
    append_opt(&mut v1, "minPrice", search.price_min);
    append_opt(&mut v1, "minYear", search.year_min);
    append_opt(&mut v1, "maxYear", search.year_max);

    let alt_query = if search.make.is_none() && search.model.is_none() {
        "vehicle".to_string()
    } else {
        query_text.clone()
    };
    let mut v2 = Serializer::new(String::new());
    v2.append_pair("q", &alt_query)
        .append_pair("category_id", VEHICLE_CATEGORY_ID)
        .append_pair("sortBy", "best_match");
    append_location(&mut v2, search);
    append_opt(&mut v2, "priceMax", search.price_max);
    append_opt(&mut v2, "priceMin", search.price_min);

    let mut v3 = Serializer::new(String::new());
    v3.append_pair("query", &query_text)
        .append_pair("sortBy", "creation_time_descend");
    append_location(&mut v3, search);
    append_opt(&mut v3, "maxPrice", search.price_max);
    append_opt(&mut v3, "minPrice", search.price_min);
    let browse_path = if search.location.text.to_lowercase().contains("miami") {
        "marketplace/miami/vehicles"
    } else {
        "marketplace/category/vehicles"
    };

    vec![
        format!("{base}/marketplace/search/?{}", v1.finish()),
        format!("{base}/marketplace/search/?{}", v2.finish()),
        format!("{base}/{browse_path}/?{}", v3.finish()),
    ]
}

/// Classifieds "cars & trucks" search, newest first.
pub fn classifieds_url(base: &str, search: &SearchSpec) -> String {
    let base = base.trim_end_matches('/');
    let mut query = Serializer::new(String::new());
    query.append_pair("query", &search.query_text());
    append_opt(&mut query, "min_price", search.price_min);
    append_opt(&mut query, "max_price", search.price_max);
    append_opt(&mut query, "min_auto_year", search.year_min);
    append_opt(&mut query, "max_auto_year", search.year_max);
    append_opt(&mut query, "max_auto_miles", search.mileage_max);
    query
        .append_pair("search_distance", &search.radius_miles.to_string())
        .append_pair("sort", "date");
    format!("{base}/search/cta?{}", query.finish())
}

#[cfg(test)]
mod tests {
    use carwatch_core::models::{Location, Tier};

    use super::*;

    fn civic() -> SearchSpec {
        SearchSpec::new(Tier::Pro)
            .with_vehicle("Honda", "Civic")
            .with_years(Some(2018), None)
            .with_prices(Some(10_000), Some(25_000))
            .with_location(Location::new("Miami, FL"), 25)
    }

    #[test]
    fn builds_three_marketplace_variants_in_order() {
        let urls = marketplace_urls(MARKETPLACE_BASE_URL, &civic());
        assert_eq!(urls.len(), 3);
        assert_eq!(
            urls[0],
            "https://www.facebook.com/marketplace/search/?query=Honda+Civic&category_id=807311116002614\
             &sortBy=creation_time_descend&latitude=25.7617&longitude=-80.1918&radius=40233\
             &maxPrice=25000&minPrice=10000&minYear=2018"
        );
        assert!(urls[1].contains("q=Honda+Civic"));
        assert!(urls[1].contains("sortBy=best_match"));
        assert!(urls[1].contains("priceMax=25000"));
        assert!(urls[2].starts_with("https://www.facebook.com/marketplace/miami/vehicles/?"));
    }

    #[test]
    fn open_search_uses_generic_terms() {
        let urls = marketplace_urls(MARKETPLACE_BASE_URL, &SearchSpec::new(Tier::Free));
        assert!(urls[0].contains("query=car&"));
        assert!(urls[1].contains("q=vehicle&"));
        assert!(!urls[0].contains("latitude"));
        assert!(urls[2].contains("/marketplace/category/vehicles/"));
    }

    #[test]
    fn resolves_partial_and_unknown_locations() {
        let tampa = SearchSpec::new(Tier::Free).with_location(Location::new("tampa"), 10);
        assert_eq!(resolve_coordinates(&tampa).lat, 27.9506);

        let qualified = SearchSpec::new(Tier::Free).with_location(Location::new("Orlando, Florida"), 10);
        assert_eq!(resolve_coordinates(&qualified).lat, 28.5383);

        let unknown = SearchSpec::new(Tier::Free).with_location(Location::new("Boise, ID"), 10);
        assert_eq!(resolve_coordinates(&unknown).lat, 25.7617);
    }

    #[test]
    fn explicit_coordinates_win() {
        let mut search = SearchSpec::new(Tier::Free);
        search.location = Location {
            text: "somewhere".into(),
            coordinates: Some(Coordinates { lat: 40.0, lng: -75.0 }),
        };
        assert_eq!(resolve_coordinates(&search).lat, 40.0);
    }

    #[test]
    fn radius_converts_miles_to_meters() {
        assert_eq!(radius_meters(25), 40233);
        assert_eq!(radius_meters(0), 0);
    }

    #[test]
    fn classifieds_url_carries_filters() {
        let search = civic().with_mileage_max(80_000);
        let url = classifieds_url(&classifieds_base_url("miami"), &search);
        assert_eq!(
            url,
            "https://miami.craigslist.org/search/cta?query=Honda+Civic&min_price=10000&max_price=25000\
             &min_auto_year=2018&max_auto_miles=80000&search_distance=25&sort=date"
        );
    }
}
