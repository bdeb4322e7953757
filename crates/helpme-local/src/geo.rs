//! Geocoding (Nominatim), routing (MapQuest) and great-circle distance.

use helpme_core::{Error, Geocoder, Location, Result, Route, RouteProvider, TravelMode};
use serde::Deserialize;
use std::time::Duration;

use crate::env;

pub const NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
pub const MAPQUEST_ENDPOINT: &str = "https://www.mapquestapi.com/directions/v1/route";
/// Nominatim's usage policy requires an identifying agent.
pub const GEOCODER_USER_AGENT: &str = "HelpMeGPT";

const EARTH_RADIUS_MILES: f64 = 3958.7613;
const GEO_TIMEOUT: Duration = Duration::from_secs(15);

/// Great-circle distance in miles.
pub fn haversine_miles(a: &Location, b: &Location) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().min(1.0).asin()
}

pub fn format_distance(a: &Location, b: &Location) -> String {
    format!(
        "The distance between {} and {} is {:.1} miles.",
        a.name,
        b.name,
        haversine_miles(a, b)
    )
}

pub fn format_directions(origin: &str, destination: &str, route: &Route) -> String {
    let mut lines = vec![
        format!("Directions from {origin} to {destination}:"),
        format!("Total Distance: {:.1} miles", route.distance_miles),
        format!("Estimated Time: {}", route.formatted_time),
        "\nStep by Step Directions:".to_string(),
    ];
    for (i, step) in route.steps.iter().enumerate() {
        lines.push(format!("{}. {step}", i + 1));
    }
    lines.join("\n")
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: env("HELPME_NOMINATIM_ENDPOINT")
                .unwrap_or_else(|| NOMINATIM_ENDPOINT.to_string()),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: String,
    lat: String,
    lon: String,
}

#[async_trait::async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<Location>> {
        let resp = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::USER_AGENT, GEOCODER_USER_AGENT)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .timeout(GEO_TIMEOUT)
            .send()
            .await
            .map_err(crate::map_reqwest_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("nominatim HTTP {status}")));
        }
        let places: Vec<NominatimPlace> = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        let Some(p) = places.into_iter().next() else {
            return Ok(None);
        };
        let parse = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|e| Error::Upstream(format!("nominatim coordinate {s:?}: {e}")))
        };
        Ok(Some(Location {
            name: query.to_string(),
            address: p.display_name,
            latitude: parse(&p.lat)?,
            longitude: parse(&p.lon)?,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct MapQuestRouter {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl MapQuestRouter {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            endpoint: MAPQUEST_ENDPOINT.to_string(),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let key = env("HELPME_MAPQUEST_API_KEY")
            .or_else(|| env("MAPQUEST_API_KEY"))
            .ok_or_else(|| {
                Error::NotConfigured(
                    "missing HELPME_MAPQUEST_API_KEY (or MAPQUEST_API_KEY)".to_string(),
                )
            })?;
        Ok(Self::new(client, key))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn route_type(mode: TravelMode) -> &'static str {
        match mode {
            TravelMode::Driving => "fastest",
            TravelMode::Walking => "pedestrian",
            TravelMode::Bicycle => "bicycle",
        }
    }
}

#[derive(Debug, Deserialize)]
struct MapQuestResponse {
    info: MapQuestInfo,
    #[serde(default)]
    route: Option<MapQuestRoute>,
}

#[derive(Debug, Deserialize)]
struct MapQuestInfo {
    statuscode: i64,
    #[serde(default)]
    messages: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapQuestRoute {
    distance: f64,
    formatted_time: String,
    #[serde(default)]
    legs: Vec<MapQuestLeg>,
}

#[derive(Debug, Deserialize)]
struct MapQuestLeg {
    #[serde(default)]
    maneuvers: Vec<MapQuestManeuver>,
}

#[derive(Debug, Deserialize)]
struct MapQuestManeuver {
    narrative: String,
}

#[async_trait::async_trait]
impl RouteProvider for MapQuestRouter {
    async fn route(
        &self,
        origin: &Location,
        destination: &Location,
        mode: TravelMode,
    ) -> Result<Route> {
        let payload = serde_json::json!({
            "locations": [origin.address, destination.address],
            "options": {
                "routeType": Self::route_type(mode),
                "narrativeType": "text",
                "unit": "m",
                "enhancedNarrative": true,
                "avoidTimedConditions": true,
            }
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .timeout(GEO_TIMEOUT)
            .send()
            .await
            .map_err(crate::map_reqwest_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("mapquest HTTP {status}")));
        }
        let parsed: MapQuestResponse = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        if parsed.info.statuscode != 0 {
            return Err(Error::NotFound(format!(
                "Couldn't calculate directions. Please check the addresses. ({})",
                parsed.info.messages.join("; ")
            )));
        }
        let route = parsed
            .route
            .ok_or_else(|| Error::Upstream("mapquest response without route".to_string()))?;
        let steps = route
            .legs
            .into_iter()
            .next()
            .map(|leg| leg.maneuvers.into_iter().map(|m| m.narrative).collect())
            .unwrap_or_default();
        Ok(Route {
            distance_miles: route.distance,
            formatted_time: route.formatted_time,
            steps,
        })
    }
}
