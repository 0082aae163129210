use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::models::{City, CityAverage, CityLatest, NewCity, NewMeasurement};
use crate::helpers::opt_f64_to_decimal_full;

/// List all cities eligible for collection, in a stable order.
pub async fn list_tracked_cities(pool: &PgPool) -> Result<Vec<City>, sqlx::Error> {
    sqlx::query_as::<_, City>(
        "SELECT id, name, country, country_code, latitude, longitude, population, tracked
         FROM cities
         WHERE tracked
         ORDER BY population DESC NULLS LAST, name",
    )
    .fetch_all(pool)
    .await
}

/// Write resolved coordinates back onto a city row.
pub async fn update_city_coordinates(
    conn: &mut PgConnection,
    city: &City,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE cities
         SET latitude = $2, longitude = $3, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(city.id)
    .bind(city.latitude)
    .bind(city.longitude)
    .execute(conn)
    .await?;
    Ok(())
}

/// Insert a measurement together with its core reading and residual payload.
pub async fn insert_measurement(
    conn: &mut PgConnection,
    measurement: &NewMeasurement,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO measurements (id, city_id, observed_at, created_at)
         VALUES ($1, $2, $3, NOW())",
    )
    .bind(measurement.id)
    .bind(measurement.city_id)
    .bind(measurement.observed_at)
    .execute(&mut *conn)
    .await?;

    let reading = &measurement.reading;
    sqlx::query(
        "INSERT INTO core_readings (
            measurement_id, temp, feels_like, temp_min, temp_max,
            pressure, humidity, sea_level, grnd_level
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(measurement.id)
    .bind(reading.temp)
    .bind(reading.feels_like)
    .bind(reading.temp_min)
    .bind(reading.temp_max)
    .bind(reading.pressure)
    .bind(reading.humidity)
    .bind(reading.sea_level)
    .bind(reading.grnd_level)
    .execute(&mut *conn)
    .await?;

    sqlx::query("INSERT INTO residual_payloads (measurement_id, data) VALUES ($1, $2)")
        .bind(measurement.id)
        .bind(sqlx::types::Json(&measurement.residual.0))
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Insert a city from the bootstrap file or the city directory.
pub async fn insert_city(conn: &mut PgConnection, city: &NewCity) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO cities (
            id, name, country, country_code, latitude, longitude, population,
            tracked, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, NOW())
        RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(&city.name)
    .bind(&city.country)
    .bind(&city.country_code)
    .bind(opt_f64_to_decimal_full(city.latitude))
    .bind(opt_f64_to_decimal_full(city.longitude))
    .bind(city.population)
    .fetch_one(conn)
    .await
}

/// Delete every city; measurements and their sub-records follow by cascade.
pub async fn delete_all_cities(conn: &mut PgConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cities").execute(conn).await?;
    Ok(result.rows_affected())
}

pub async fn count_cities(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cities")
        .fetch_one(pool)
        .await
}

pub async fn count_measurements(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM measurements")
        .fetch_one(pool)
        .await
}

/// Average temperature per city, only for cities with at least one measurement.
pub async fn temperature_averages(pool: &PgPool) -> Result<Vec<CityAverage>, sqlx::Error> {
    sqlx::query_as::<_, CityAverage>(
        "SELECT c.id AS city_id,
                c.name AS city_name,
                AVG(r.temp) AS average_temp,
                COUNT(m.id) AS measurement_count,
                MIN(m.observed_at) AS first_observed_at,
                MAX(m.observed_at) AS last_observed_at
         FROM cities c
         JOIN measurements m ON m.city_id = c.id
         JOIN core_readings r ON r.measurement_id = m.id
         GROUP BY c.id, c.name
         ORDER BY c.name",
    )
    .fetch_all(pool)
    .await
}

/// Latest stored temperature per city (by insertion, then observation time).
pub async fn latest_temperatures(pool: &PgPool) -> Result<Vec<CityLatest>, sqlx::Error> {
    sqlx::query_as::<_, CityLatest>(
        "SELECT city_id, city_name, temp, observed_at FROM (
             SELECT DISTINCT ON (c.id)
                    c.id AS city_id,
                    c.name AS city_name,
                    r.temp,
                    m.observed_at
             FROM cities c
             JOIN measurements m ON m.city_id = c.id
             JOIN core_readings r ON r.measurement_id = m.id
             ORDER BY c.id, m.created_at DESC, m.observed_at DESC
         ) latest
         ORDER BY city_name",
    )
    .fetch_all(pool)
    .await
}
