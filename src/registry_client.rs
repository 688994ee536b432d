use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use url::Url;

use crate::domain::{
    CatalogCity, CatalogError, CatalogResponse, RecipientId, Subscriber, SubscriberList,
};
use crate::retry::{RetryPolicy, Retryable, with_retry};

/// HTTP client for the service that owns the subscriber registry and the
/// listing catalog.
#[derive(Clone, Debug)]
pub struct RegistryClient {
    http_client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{resource} was not found on the registry.")]
    NotFound { resource: String },
    #[error("The registry answered {status} for {resource}: {body}")]
    Status {
        resource: String,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to reach the registry for {resource}.")]
    Transport {
        resource: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("The registry reply for {resource} does not match the expected schema.")]
    Decode {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{resource} is not a valid registry resource.")]
    InvalidResource {
        resource: String,
        #[source]
        source: url::ParseError,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl Retryable for RegistryError {
    fn is_transient(&self) -> bool {
        match self {
            RegistryError::Transport { .. } => true,
            RegistryError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

/// Result of asking the registry to drop a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyAbsent,
}

impl RegistryClient {
    pub fn new(base_url: Url, timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: with_trailing_slash(base_url),
            retry,
        })
    }

    /// Performs one logical request, retrying transient failures.
    ///
    /// A 404 is reported as [`RegistryError::NotFound`] straight away. Empty
    /// success bodies decode to `null`.
    #[tracing::instrument(name = "Calling the registry", skip(self, body))]
    pub async fn fetch(
        &self,
        method: Method,
        resource: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, RegistryError> {
        let url = self
            .base_url
            .join(resource)
            .map_err(|source| RegistryError::InvalidResource {
                resource: resource.to_owned(),
                source,
            })?;

        with_retry(&self.retry, || self.attempt(method.clone(), url.clone(), resource, body)).await
    }

    async fn attempt(
        &self,
        method: Method,
        url: Url,
        resource: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, RegistryError> {
        let transport = |source: reqwest::Error| RegistryError::Transport {
            resource: resource.to_owned(),
            source,
        };

        let mut request = self.http_client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound {
                resource: resource.to_owned(),
            });
        }
        let text = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(RegistryError::Status {
                resource: resource.to_owned(),
                status,
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|source| RegistryError::Decode {
            resource: resource.to_owned(),
            source,
        })
    }

    async fn fetch_as<T: serde::de::DeserializeOwned>(&self, resource: &str) -> Result<T, RegistryError> {
        let value = self.fetch(Method::GET, resource, None).await?;
        serde_json::from_value(value).map_err(|source| RegistryError::Decode {
            resource: resource.to_owned(),
            source,
        })
    }

    #[tracing::instrument(name = "Fetching subscribers", skip(self))]
    pub async fn list_subscribers(&self) -> Result<Vec<Subscriber>, RegistryError> {
        let list: SubscriberList = self.fetch_as("subscribers/list").await?;
        Ok(list.into_subscribers())
    }

    #[tracing::instrument(name = "Looking up subscriber", skip(self))]
    pub async fn get_subscriber(
        &self,
        recipient: RecipientId,
    ) -> Result<Option<Subscriber>, RegistryError> {
        match self.fetch_as(&format!("subscribers/{recipient}")).await {
            Ok(subscriber) => Ok(Some(subscriber)),
            Err(RegistryError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(name = "Registering subscriber", skip(self))]
    pub async fn register_subscriber(&self, recipient: RecipientId) -> Result<(), RegistryError> {
        let body = serde_json::json!({ "recipient_id": recipient });
        self.fetch(Method::POST, "subscribers/register", Some(&body))
            .await?;
        Ok(())
    }

    #[tracing::instrument(name = "Removing subscriber", skip(self))]
    pub async fn remove_subscriber(&self, recipient: RecipientId) -> Result<Removal, RegistryError> {
        match self
            .fetch(Method::DELETE, &format!("subscribers/{recipient}"), None)
            .await
        {
            Ok(_) => Ok(Removal::Removed),
            Err(RegistryError::NotFound { .. }) => Ok(Removal::AlreadyAbsent),
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(name = "Fetching catalog", skip(self))]
    pub async fn fetch_catalog(&self) -> Result<Vec<CatalogCity>, RegistryError> {
        let catalog: CatalogResponse = self.fetch_as("catalog/list/all").await?;
        Ok(catalog.into_cities()?)
    }
}

pub(crate) fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
