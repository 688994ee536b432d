use serde_aux::field_attributes::deserialize_string_from_number;
use url::Url;

/// Body of `GET /catalog/list/all`.
#[derive(Debug, serde::Deserialize)]
pub struct CatalogResponse {
    list: Vec<CityRecord>,
}

#[derive(Debug, serde::Deserialize)]
struct CityRecord {
    city_name: String,
    results: serde_json::Value,
}

#[derive(Debug, serde::Deserialize)]
struct ListingRecord {
    name: String,
    #[serde(deserialize_with = "deserialize_string_from_number")]
    price: String,
    available_date: String,
    url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Listings of {city} do not match the expected schema.")]
    InvalidListings {
        city: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Listing {title:?} in {city} has an invalid detail url {url:?}.")]
    InvalidDetailUrl {
        city: String,
        title: String,
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCity {
    pub name: String,
    pub listings: CityListings,
}

/// The registry answers with either a list of listings or a marker value
/// (`"none"`, `null`, a message string) when a city has nothing on offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CityListings {
    Available(Vec<Listing>),
    Unavailable,
}

impl CityListings {
    pub fn as_slice(&self) -> &[Listing] {
        match self {
            CityListings::Available(listings) => listings,
            CityListings::Unavailable => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub title: String,
    pub price: String,
    pub available_date: String,
    pub detail_url: Url,
}

impl CatalogResponse {
    pub fn into_cities(self) -> Result<Vec<CatalogCity>, CatalogError> {
        self.list.into_iter().map(CatalogCity::try_from).collect()
    }
}

impl TryFrom<CityRecord> for CatalogCity {
    type Error = CatalogError;

    fn try_from(record: CityRecord) -> Result<Self, Self::Error> {
        let CityRecord { city_name, results } = record;

        let listings = match results {
            serde_json::Value::Array(_) => {
                let records: Vec<ListingRecord> = match serde_json::from_value(results) {
                    Ok(records) => records,
                    Err(source) => {
                        return Err(CatalogError::InvalidListings {
                            city: city_name,
                            source,
                        });
                    }
                };
                let listings = records
                    .into_iter()
                    .map(|r| Listing::parse(&city_name, r))
                    .collect::<Result<Vec<_>, _>>()?;
                CityListings::Available(listings)
            }
            _ => CityListings::Unavailable,
        };

        Ok(Self {
            name: city_name,
            listings,
        })
    }
}

impl Listing {
    fn parse(city: &str, record: ListingRecord) -> Result<Self, CatalogError> {
        let detail_url = match Url::parse(&record.url) {
            Ok(url) => url,
            Err(source) => {
                return Err(CatalogError::InvalidDetailUrl {
                    city: city.to_owned(),
                    title: record.name,
                    url: record.url,
                    source,
                });
            }
        };

        Ok(Self {
            title: record.name,
            price: record.price,
            available_date: record.available_date,
            detail_url,
        })
    }
}
