use serde::Deserialize;
use serde_json::Number;
use tracing::info;

use crate::tools::http::join_url;
use crate::tools::{HttpFetcher, ToolAdapter, ToolError, ToolKind};

/// Current conditions from Open-Meteo: geocode the city, then read `current_weather`.
pub struct WeatherTool {
    http: HttpFetcher,
    geocoding_url: String,
    forecast_url: String,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    results: Option<Vec<GeoPlace>>,
}

#[derive(Debug, Deserialize)]
struct GeoPlace {
    latitude: f64,
    longitude: f64,
    name: String,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

// Kept as JSON numbers so they print exactly as the API sent them.
#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: Number,
    windspeed: Number,
}

impl WeatherTool {
    pub fn new(http: HttpFetcher, geocoding_url: &str, forecast_url: &str) -> Self {
        Self {
            http,
            geocoding_url: geocoding_url.to_string(),
            forecast_url: forecast_url.to_string(),
        }
    }

    async fn lookup(&self, city: &str) -> Result<String, ToolError> {
        let geo: GeoResponse = self
            .http
            .get_json(
                &join_url(&self.geocoding_url, "v1/search"),
                &[
                    ("name", city),
                    ("count", "1"),
                    ("language", "en"),
                    ("format", "json"),
                ],
            )
            .await?;

        let place = geo
            .results
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| {
                ToolError::NotFound(format!(
                    "Sorry, I couldn't find the city '{city}'. Please check the spelling."
                ))
            })?;

        let lat = place.latitude.to_string();
        let lon = place.longitude.to_string();
        let forecast: ForecastResponse = self
            .http
            .get_json(
                &join_url(&self.forecast_url, "v1/forecast"),
                &[
                    ("latitude", lat.as_str()),
                    ("longitude", lon.as_str()),
                    ("current_weather", "true"),
                ],
            )
            .await?;

        let w = forecast.current_weather;
        Ok(format!(
            "The current weather in {}, {} is:\n- **Temperature:** {}°C\n- **Wind Speed:** {} km/h",
            place.name,
            place.country.unwrap_or_default(),
            w.temperature,
            w.windspeed
        ))
    }
}

#[async_trait::async_trait]
impl ToolAdapter for WeatherTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Weather
    }

    async fn call(&self, query: Option<&str>) -> String {
        let city = query.unwrap_or_default().trim();
        info!(city, "weather lookup");
        match self.lookup(city).await {
            Ok(text) => text,
            Err(e) => e.into_reply("fetch the weather"),
        }
    }
}
