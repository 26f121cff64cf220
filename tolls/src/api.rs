use anyhow::Result;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;

const API_KEY_VAR: &str = "TOLLGURU_API_KEY";
const API_URL_VAR: &str = "TOLLGURU_API_URL";
const DEFAULT_API_URL: &str = "https://apis.tollguru.com/toll/v2";
const DEFAULT_VEHICLE_TYPE: &str = "5AxlesTruck";
const DEFAULT_MAP_PROVIDER: &str = "osrm";

/// Something that can price the tolls along one trip.
pub trait TollApi: Sync {
    /// Takes the trip as exported CSV and returns the body of the service's answer, untouched.
    fn submit(&self, trip_csv: Vec<u8>) -> Result<String>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct TollGuruConfig {
    pub api_url: String,
    pub api_key: String,
    pub vehicle_type: String,
    pub map_provider: String,
}

impl TollGuruConfig {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            api_url,
            api_key,
            vehicle_type: DEFAULT_VEHICLE_TYPE.to_string(),
            map_provider: DEFAULT_MAP_PROVIDER.to_string(),
        }
    }

    /// The key is required; the URL falls back to the public endpoint.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("{API_KEY_VAR} must be set"))?;
        let api_url = std::env::var(API_URL_VAR).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Ok(Self::new(api_url, api_key))
    }

    pub fn upload_endpoint(&self) -> String {
        format!(
            "{}/gps-tracks-csv-upload",
            self.api_url.trim_end_matches('/')
        )
    }
}

pub struct TollGuru {
    config: TollGuruConfig,
    client: Client,
}

impl TollGuru {
    pub fn new(config: TollGuruConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tolls/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client })
    }
}

impl TollApi for TollGuru {
    fn submit(&self, trip_csv: Vec<u8>) -> Result<String> {
        let resp = self
            .client
            .post(self.config.upload_endpoint())
            .query(&[
                ("mapProvider", &self.config.map_provider),
                ("vehicleType", &self.config.vehicle_type),
            ])
            .header("x-api-key", &self.config.api_key)
            .header(CONTENT_TYPE, "text/csv")
            .body(trip_csv)
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            debug!("Toll service answered {status}");
        }
        // Error responses are still JSON documents worth keeping, so the status isn't checked
        Ok(resp.text()?)
    }
}
