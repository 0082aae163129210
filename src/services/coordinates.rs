use crate::db::models::City;
use crate::errors::CollectorError;
use crate::helpers::f64_to_decimal_full;
use crate::services::openweather::WeatherApi;

/// Fill in missing coordinates on `city` from the geocoding endpoint.
///
/// Only the in-memory value is changed; persisting it is the caller's job.
/// A city that already has both coordinates is returned untouched.
pub async fn resolve_coordinates(
    api: &dyn WeatherApi,
    city: &mut City,
    limit: u32,
) -> Result<(), CollectorError> {
    if city.coordinates().is_some() {
        return Ok(());
    }

    let places = api
        .geocode(&city.name, city.country_code.as_deref(), limit)
        .await?;

    let Some(place) = places.first() else {
        return Err(CollectorError::NoData(format!(
            "no geocoding results for {}",
            city
        )));
    };

    if places.len() > 1 {
        tracing::warn!(
            "Geocoding {} returned {} results, using the first ({}, {})",
            city,
            places.len(),
            place.lat,
            place.lon
        );
    }

    city.latitude = Some(f64_to_decimal_full(place.lat));
    city.longitude = Some(f64_to_decimal_full(place.lon));
    tracing::debug!("Resolved {} to ({}, {})", city, place.lat, place.lon);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::{city, place, FakeWeatherApi};

    #[tokio::test]
    async fn test_resolves_single_match() {
        let api = FakeWeatherApi::new().with_places("Bern", vec![place("Bern", 46.948, 7.4474)]);
        let mut bern = city("Bern", None);

        resolve_coordinates(&api, &mut bern, 10).await.unwrap();

        let (lat, lon) = bern.coordinates().unwrap();
        assert!((lat - 46.948).abs() < 1e-9);
        assert!((lon - 7.4474).abs() < 1e-9);
        assert_eq!(api.geocode_calls(), 1);
    }

    #[tokio::test]
    async fn test_multiple_matches_take_first() {
        let api = FakeWeatherApi::new().with_places(
            "Springfield",
            vec![
                place("Springfield", 39.7817, -89.6501),
                place("Springfield", 42.1015, -72.5898),
            ],
        );
        let mut springfield = city("Springfield", None);

        resolve_coordinates(&api, &mut springfield, 10).await.unwrap();

        let (lat, _) = springfield.coordinates().unwrap();
        assert!((lat - 39.7817).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_match_is_no_data() {
        let api = FakeWeatherApi::new();
        let mut nowhere = city("Nowhere", None);

        let err = resolve_coordinates(&api, &mut nowhere, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, CollectorError::NoData(_)));
        assert!(nowhere.coordinates().is_none());
    }

    #[tokio::test]
    async fn test_known_coordinates_skip_the_lookup() {
        let api = FakeWeatherApi::new().with_places("Zurich", vec![place("Zurich", 0.0, 0.0)]);
        let mut zurich = city("Zurich", Some((47.3769, 8.5417)));

        resolve_coordinates(&api, &mut zurich, 10).await.unwrap();

        assert_eq!(api.geocode_calls(), 0);
        let (lat, _) = zurich.coordinates().unwrap();
        assert!((lat - 47.3769).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_geocoding_failure_propagates_unchanged() {
        let api = FakeWeatherApi::new().fail_geocode_with_status(429);
        let mut bern = city("Bern", None);

        let err = resolve_coordinates(&api, &mut bern, 10).await.unwrap_err();
        assert!(matches!(err, CollectorError::Response { status: 429, .. }));
    }
}
