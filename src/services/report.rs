//! Plain-text reports over the stored measurements.

use crate::db::store::Store;
use crate::errors::CollectorError;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub average: bool,
    pub latest: bool,
}

pub async fn build_report(store: &dyn Store, options: ReportOptions) -> Result<String, CollectorError> {
    let cities = store.count_cities().await?;
    let measurements = store.count_measurements().await?;

    let mut report = format!(
        "Collector storing {} weather measurements for {} cities.\n",
        measurements, cities
    );

    if options.average {
        report.push_str("\nAverage temperature per city:\n");
        for row in store.temperature_averages().await? {
            report.push_str(&format!(
                "  {:<24} {:>7.2} °C  ({} measurements, {} .. {})\n",
                row.city_name,
                row.average_temp,
                row.measurement_count,
                row.first_observed_at.format("%Y-%m-%d %H:%M"),
                row.last_observed_at.format("%Y-%m-%d %H:%M"),
            ));
        }
    }

    if options.latest {
        report.push_str("\nLatest temperature per city:\n");
        for row in store.latest_temperatures().await? {
            report.push_str(&format!(
                "  {:<24} {:>7.2} °C  (observed {})\n",
                row.city_name,
                row.temp,
                row.observed_at.format("%Y-%m-%d %H:%M"),
            ));
        }
    }

    Ok(report)
}
