//! Seeding the `cities` table from a JSON file or the city directory.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use crate::db::models::NewCity;
use crate::db::store::Store;
use crate::errors::CollectorError;
use crate::services::geodb::CityDirectory;

pub struct CityBootstrap {
    store: Arc<dyn Store>,
    directory: Arc<dyn CityDirectory>,
    cities_file: PathBuf,
    cities_amount: usize,
}

impl CityBootstrap {
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn CityDirectory>,
        cities_file: impl Into<PathBuf>,
        cities_amount: usize,
    ) -> Self {
        Self {
            store,
            directory,
            cities_file: cities_file.into(),
            cities_amount,
        }
    }

    /// Import the cities listed in the cities file.
    ///
    /// A missing file or an empty list is `NoData`; anything that is not a
    /// JSON array of cities is `Schema`.
    pub async fn init_from_file(&self, replace: bool) -> Result<usize, CollectorError> {
        let path = self.cities_file.display();
        let contents = match tokio::fs::read_to_string(&self.cities_file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CollectorError::NoData(format!("cities file {} not found", path)));
            }
            Err(e) => return Err(e.into()),
        };

        let cities: Vec<NewCity> = serde_json::from_str(&contents)
            .map_err(|e| CollectorError::Schema(format!("cities file {}: {}", path, e)))?;
        if cities.is_empty() {
            return Err(CollectorError::NoData(format!("cities file {} is empty", path)));
        }

        let inserted = self.store.insert_cities(&cities, replace).await?;
        tracing::info!("Imported {} cities from {}", inserted, path);
        Ok(inserted)
    }

    /// Fetch the most populous cities, save them to the cities file and
    /// import them.
    pub async fn fetch_from_directory(&self, replace: bool) -> Result<usize, CollectorError> {
        let cities = self.directory.fetch_cities(self.cities_amount).await?;
        if cities.is_empty() {
            return Err(CollectorError::NoData("city directory returned no cities".to_string()));
        }

        let json = serde_json::to_string_pretty(&cities)
            .map_err(|e| CollectorError::Schema(e.to_string()))?;
        tokio::fs::write(&self.cities_file, json).await?;
        tracing::info!(
            "Saved {} cities to {}",
            cities.len(),
            self.cities_file.display()
        );

        let inserted = self.store.insert_cities(&cities, replace).await?;
        tracing::info!("Imported {} cities from the city directory", inserted);
        Ok(inserted)
    }

    /// File first; the directory only when the file has nothing to offer.
    pub async fn bootstrap(&self, replace: bool) -> Result<usize, CollectorError> {
        match self.init_from_file(replace).await {
            Err(CollectorError::NoData(reason)) => {
                tracing::info!("{}, fetching cities from the city directory", reason);
                self.fetch_from_directory(replace).await
            }
            other => other,
        }
    }
}
