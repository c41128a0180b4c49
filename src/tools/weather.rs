//! 天气工具（OpenWeatherMap）：当前天气与 5 天预报

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::params::{get_json, pick, pick_or, required_str, skip_cache, str_or};
use crate::tools::registry::unknown_action;
use crate::tools::{CacheKey, Fetched, ResultCache, Tool, ToolAction, ToolParameter, ToolResult};

pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5";

const CURRENT_TTL: Duration = Duration::from_secs(600);
const FORECAST_TTL: Duration = Duration::from_secs(1800);
/// 预报接口为 3 小时粒度，每 8 条取 1 条即每天一条
const ENTRIES_PER_DAY: usize = 8;
const MAX_FORECAST_DAYS: usize = 5;

pub struct WeatherTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cache: Arc<ResultCache>,
}

impl WeatherTool {
    pub fn new(api_key: Option<String>, cache: Arc<ResultCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_WEATHER_URL.to_string(),
            api_key,
            cache,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn unit_symbol(units: &str) -> &'static str {
        match units {
            "imperial" => "°F",
            "kelvin" => "K",
            _ => "°C",
        }
    }

    /// OpenWeatherMap 用 "standard" 表示开尔文
    fn api_units(units: &str) -> &str {
        if units == "kelvin" {
            "standard"
        } else {
            units
        }
    }

    async fn fetch(&self, endpoint: &str, city: &str, units: &str) -> Result<Value, String> {
        let request = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_deref().unwrap_or_default()),
                ("units", Self::api_units(units)),
            ]);
        get_json(request).await
    }

    async fn current_weather(&self, params: &Map<String, Value>) -> Result<Fetched<Value>, String> {
        let city = required_str(params, "city")?;
        let units = str_or(params, "units", "metric");
        let key = CacheKey::new("weather.get_current_weather")
            .kwarg("city", &city)
            .kwarg("units", &units);

        self.cache
            .get_or_fetch(&key, Some(CURRENT_TTL), skip_cache(params), || async move {
                let data = self.fetch("weather", &city, &units).await?;
                let symbol = Self::unit_symbol(&units);
                let visibility_m = pick_or(&data, "/visibility", json!(0)).as_f64().unwrap_or(0.0);
                let result = json!({
                    "city": pick(&data, "/name")?,
                    "country": pick(&data, "/sys/country")?,
                    "temperature": pick(&data, "/main/temp")?,
                    "feels_like": pick(&data, "/main/feels_like")?,
                    "temp_min": pick(&data, "/main/temp_min")?,
                    "temp_max": pick(&data, "/main/temp_max")?,
                    "unit": symbol,
                    "humidity": pick(&data, "/main/humidity")?,
                    "pressure": pick(&data, "/main/pressure")?,
                    "condition": pick(&data, "/weather/0/main")?,
                    "description": pick(&data, "/weather/0/description")?,
                    "wind_speed": pick(&data, "/wind/speed")?,
                    "wind_direction": pick_or(&data, "/wind/deg", json!(0)),
                    "clouds": pick(&data, "/clouds/all")?,
                    "visibility": visibility_m / 1000.0,
                    "sunrise": pick(&data, "/sys/sunrise")?,
                    "sunset": pick(&data, "/sys/sunset")?,
                });
                tracing::info!(city = %city, temperature = %result["temperature"], unit = symbol, "Retrieved weather");
                Ok::<Value, String>(result)
            })
            .await
    }

    async fn forecast(&self, params: &Map<String, Value>) -> Result<Fetched<Value>, String> {
        let city = required_str(params, "city")?;
        let units = str_or(params, "units", "metric");
        let key = CacheKey::new("weather.get_forecast")
            .kwarg("city", &city)
            .kwarg("units", &units);

        self.cache
            .get_or_fetch(&key, Some(FORECAST_TTL), skip_cache(params), || async move {
                let data = self.fetch("forecast", &city, &units).await?;
                let items = pick(&data, "/list")?;
                let items = items.as_array().cloned().unwrap_or_default();

                let mut forecasts = Vec::new();
                for item in items.iter().step_by(ENTRIES_PER_DAY).take(MAX_FORECAST_DAYS) {
                    forecasts.push(json!({
                        "datetime": pick(item, "/dt_txt")?,
                        "temperature": pick(item, "/main/temp")?,
                        "feels_like": pick(item, "/main/feels_like")?,
                        "humidity": pick(item, "/main/humidity")?,
                        "condition": pick(item, "/weather/0/main")?,
                        "description": pick(item, "/weather/0/description")?,
                        "wind_speed": pick(item, "/wind/speed")?,
                        "clouds": pick(item, "/clouds/all")?,
                    }));
                }

                Ok::<Value, String>(json!({
                    "city": pick(&data, "/city/name")?,
                    "country": pick(&data, "/city/country")?,
                    "unit": Self::unit_symbol(&units),
                    "forecast_days": forecasts.len(),
                    "forecasts": forecasts,
                }))
            })
            .await
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Get current weather conditions and forecasts for any city"
    }

    fn actions(&self) -> Vec<ToolAction> {
        let units = || {
            ToolParameter::optional("units", "string", "Temperature units")
                .with_default(json!("metric"))
                .with_enum(&["metric", "imperial", "kelvin"])
        };
        vec![
            ToolAction::new(
                "get_current_weather",
                "Get current weather for a city",
                vec![
                    ToolParameter::required("city", "string", "City name (e.g., 'London', 'New York', 'Tokyo')"),
                    units(),
                ],
            ),
            ToolAction::new(
                "get_forecast",
                "Get 5-day weather forecast for a city",
                vec![ToolParameter::required("city", "string", "City name"), units()],
            ),
        ]
    }

    async fn execute(&self, action: &str, parameters: &Map<String, Value>) -> ToolResult {
        let start = Instant::now();
        let outcome = match action {
            "get_current_weather" => self.current_weather(parameters).await,
            "get_forecast" => self.forecast(parameters).await,
            _ => return unknown_action(&self.actions(), action).with_elapsed(start),
        };
        match outcome {
            Ok(fetched) => ToolResult::success(fetched.value)
                .with_cached(fetched.cached)
                .with_elapsed(start),
            Err(e) => {
                tracing::warn!(action, error = %e, "Weather API error");
                ToolResult::failure(e).with_elapsed(start)
            }
        }
    }
}
