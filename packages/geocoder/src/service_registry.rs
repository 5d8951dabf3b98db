//! Reverse-geocoding providers defined as TOML.
//!
//! The shipped definitions live in `services/*.toml` and are embedded at
//! compile time. [`ServiceRegistry::embedded`] parses them, and
//! [`ServiceRegistry::select`] picks the one to resolve with.

use std::sync::Arc;

use serde::Deserialize;

use crate::fcc::FccAreaLookup;
use crate::nominatim::NominatimReverseLookup;
use crate::{GeocodeError, RegionLookup};

/// Environment variable consulted when no provider is given on the
/// command line.
pub const PROVIDER_ENV_VAR: &str = "MONARCH_MAP_GEOCODER";

const EMBEDDED: &[(&str, &str)] = &[
    ("fcc", include_str!("../services/fcc.toml")),
    ("nominatim", include_str!("../services/nominatim.toml")),
];

/// One provider definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeocodingService {
    /// Identifier used by `--provider` and [`PROVIDER_ENV_VAR`].
    pub id: String,
    /// Display name.
    pub name: String,
    /// Disabled services are listed but never selected.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Lower is preferred.
    pub priority: u32,
    /// Endpoint settings, tagged by `type`.
    pub provider: ProviderConfig,
}

/// Endpoint settings per provider kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// FCC Census Area API.
    Fcc {
        /// Endpoint URL.
        base_url: String,
    },
    /// Nominatim reverse endpoint.
    Nominatim {
        /// Endpoint URL.
        base_url: String,
        /// Minimum spacing between calls in milliseconds.
        rate_limit_ms: u64,
    },
}

const fn enabled_by_default() -> bool {
    true
}

impl GeocodingService {
    /// Endpoint URL of whichever provider this is.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::Fcc { base_url } | ProviderConfig::Nominatim { base_url, .. } => {
                base_url
            }
        }
    }

    /// Builds the [`RegionLookup`] client for this service.
    #[must_use]
    pub fn build_lookup(&self, client: reqwest::Client) -> Arc<dyn RegionLookup> {
        match &self.provider {
            ProviderConfig::Fcc { base_url } => Arc::new(FccAreaLookup::new(client, base_url)),
            ProviderConfig::Nominatim {
                base_url,
                rate_limit_ms,
            } => Arc::new(NominatimReverseLookup::new(
                client,
                base_url,
                *rate_limit_ms,
            )),
        }
    }
}

/// Parsed provider definitions, ordered by priority.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Vec<GeocodingService>,
}

impl ServiceRegistry {
    /// Parses the definitions shipped with the crate.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::ServiceConfig`] if an embedded file is
    /// malformed.
    pub fn embedded() -> Result<Self, GeocodeError> {
        Self::from_definitions(EMBEDDED.iter().copied())
    }

    /// Parses `(id, toml)` definitions.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::ServiceConfig`] naming the first definition
    /// that fails to parse.
    pub fn from_definitions<'a>(
        definitions: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, GeocodeError> {
        let mut services = definitions
            .into_iter()
            .map(|(id, text)| {
                toml::de::from_str::<GeocodingService>(text).map_err(|e| {
                    GeocodeError::ServiceConfig {
                        id: id.to_string(),
                        message: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        services.sort_by_key(|s| s.priority);
        Ok(Self { services })
    }

    /// Every definition, enabled or not, by priority.
    #[must_use]
    pub fn services(&self) -> &[GeocodingService] {
        &self.services
    }

    /// Enabled definitions by priority.
    pub fn enabled(&self) -> impl Iterator<Item = &GeocodingService> {
        self.services.iter().filter(|s| s.enabled)
    }

    /// Picks the service to resolve with: `choice` if given, else
    /// [`PROVIDER_ENV_VAR`], else the highest-priority enabled service.
    #[must_use]
    pub fn select(&self, choice: Option<&str>) -> Option<&GeocodingService> {
        let from_env = std::env::var(PROVIDER_ENV_VAR).ok();
        self.select_from(choice.or(from_env.as_deref()))
    }

    /// Like [`Self::select`] with the environment already consulted.
    /// Returns `None` if the requested id is unknown or disabled.
    #[must_use]
    pub fn select_from(&self, choice: Option<&str>) -> Option<&GeocodingService> {
        let Some(id) = choice.map(str::trim).filter(|id| !id.is_empty()) else {
            return self.enabled().next();
        };

        let found = self.enabled().find(|s| s.id == id);
        if found.is_none() {
            log::warn!(
                "No enabled geocoding service {id:?}. Available: {}",
                self.enabled()
                    .map(|s| s.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        found
    }
}
