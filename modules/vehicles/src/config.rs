use crate::generation::DEFAULT_GENERATION_PERIOD;
use std::env;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bus_type: String,
    pub nats_url: String,
    pub host: String,
    pub port: u16,
    /// Consumer identity on the durable event log; events this service
    /// appends with this key are auto-acknowledged for its own consumer
    pub service_key: String,
    pub generation_period_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let bus_type = env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string());

        let nats_url =
            env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8092".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let service_key = env::var("SERVICE_KEY").unwrap_or_else(|_| "vehicles".to_string());

        let generation_period_ms: u64 = env::var("GENERATION_PERIOD_MS")
            .unwrap_or_else(|_| DEFAULT_GENERATION_PERIOD.as_millis().to_string())
            .parse()
            .map_err(|_| "GENERATION_PERIOD_MS must be a valid u64".to_string())?;

        Ok(Config {
            bus_type,
            nats_url,
            host,
            port,
            service_key,
            generation_period_ms,
        })
    }
}
