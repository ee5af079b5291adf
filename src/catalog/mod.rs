//! Read-only access to the station roster and per-product layer metadata.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use validator::Validate;

use crate::config::Settings;
use crate::error::Result;
use crate::models::{Layer, Product, Station};

pub struct CatalogClient {
    http: reqwest::Client,
    stations_url: String,
    product_base: String,
}

impl CatalogClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            stations_url: settings.catalog.stations_url.clone(),
            product_base: format!("{}/product", settings.remote.base_url),
        }
    }

    /// Fetch the current station roster. Extra columns in the catalog CSV are
    /// ignored; coordinate ranges are validated before the roster is used.
    pub async fn fetch_stations(&self) -> Result<Vec<Station>> {
        let body = self
            .http
            .get(&self.stations_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_stations(body.as_bytes())
    }

    /// Fetch the layer metadata for one product.
    pub async fn fetch_product(&self, product: &str) -> Result<Product> {
        let url = format!("{}/{}", self.product_base, product);
        let layers: BTreeMap<String, Layer> = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Product::new(product.to_string(), layers))
    }
}

/// Parse a tabular station list with at least `station`, `latitude` and
/// `longitude` columns.
pub fn parse_stations<R: Read>(reader: R) -> Result<Vec<Station>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut stations = Vec::new();
    for record in rdr.deserialize::<Station>() {
        let station = record?;
        station.validate()?;
        stations.push(station);
    }
    Ok(stations)
}

/// Run-scoped memoization of product metadata. Filled on first use, immutable
/// for the rest of the run.
pub struct ProductCache<'a> {
    client: &'a CatalogClient,
    cache: HashMap<String, Product>,
}

impl<'a> ProductCache<'a> {
    pub fn new(client: &'a CatalogClient) -> Self {
        Self {
            client,
            cache: HashMap::new(),
        }
    }

    pub async fn get(&mut self, product: &str) -> Result<&Product> {
        match self.cache.entry(product.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let fetched = self.client.fetch_product(product).await?;
                Ok(entry.insert(fetched))
            }
        }
    }

    /// Prefetch a set of products and expose the plain map. Planning and
    /// normalization take `&HashMap` so tests can inject fixture metadata.
    pub async fn fetch_all(&mut self, products: &[String]) -> Result<&HashMap<String, Product>> {
        for p in products {
            self.get(p).await?;
        }
        Ok(&self.cache)
    }
}
