// Configuration Management for the Momentum Scanner

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Configuration Structures
// ============================================================================

/// Market-data provider endpoints and connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub rest_base_url: String,
    pub ws_url: String,

    /// Channel subscribed after authentication (per-minute aggregates, all symbols)
    pub subscription: String,

    // Connection settings
    pub request_timeout_seconds: u64,
    pub ws_connect_timeout_secs: u64,

    /// 0 keeps the single-connection behavior; >0 enables bounded reconnects
    pub max_reconnect_attempts: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            rest_base_url: "https://api.polygon.io".to_string(),
            ws_url: "wss://socket.polygon.io/stocks".to_string(),
            subscription: "AM.*".to_string(),
            request_timeout_seconds: 10,
            ws_connect_timeout_secs: 10,
            max_reconnect_attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub json_logs: bool,
    /// Number of gainers listed in the end-of-run report
    pub top_gainers_report: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            json_logs: false,
            top_gainers_report: 10,
        }
    }
}

// ============================================================================
// Configuration Summary
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub rest_base_url: String,
    pub ws_url: String,
    pub subscription: String,
    pub has_api_key: bool,
    pub max_reconnect_attempts: u32,
    pub log_level: String,
}

// ============================================================================
// Configuration Manager
// ============================================================================

pub struct ConfigManager {
    provider: Arc<RwLock<ProviderConfig>>,
    monitoring: Arc<RwLock<MonitoringConfig>>,
}

impl ConfigManager {
    pub fn new(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut manager = Self {
            provider: Arc::new(RwLock::new(ProviderConfig::default())),
            monitoring: Arc::new(RwLock::new(MonitoringConfig::default())),
        };

        if let Some(path) = config_path {
            manager.load_from_file(path)?;
        }

        manager.load_from_env();

        info!("Configuration initialized");
        Ok(manager)
    }

    /// Load configuration from JSON file
    pub fn load_from_file(&mut self, config_path: &str) -> Result<(), ConfigError> {
        let path = Path::new(config_path);
        if !path.exists() {
            warn!(path = config_path, "Config file not found");
            return Ok(());
        }

        let content = fs::read_to_string(path)?;
        let config_data: HashMap<String, serde_json::Value> = serde_json::from_str(&content)?;

        if let Some(provider_data) = config_data.get("provider") {
            let provider = serde_json::from_value::<ProviderConfig>(provider_data.clone())?;
            *self.provider.write() = provider;
        }

        if let Some(monitoring_data) = config_data.get("monitoring") {
            let monitoring = serde_json::from_value::<MonitoringConfig>(monitoring_data.clone())?;
            *self.monitoring.write() = monitoring;
        }

        info!(path = config_path, "Configuration loaded");
        Ok(())
    }

    /// Secrets and deployment overrides from the environment
    pub fn load_from_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("POLYGON_API_KEY") {
            self.provider.write().api_key = api_key;
        }
        if let Some(url) = lookup("POLYGON_REST_URL") {
            self.provider.write().rest_base_url = url;
        }
        if let Some(url) = lookup("POLYGON_WS_URL") {
            self.provider.write().ws_url = url;
        }
        if let Some(level) = lookup("SCANNER_LOG_LEVEL") {
            self.monitoring.write().log_level = level;
        }
    }

    /// Save configuration to JSON file (excludes secrets)
    pub fn save_to_file(&self, config_path: &str) -> Result<(), ConfigError> {
        let provider = self.provider.read();
        let monitoring = self.monitoring.read();

        let mut provider_map = HashMap::new();
        provider_map.insert("rest_base_url", serde_json::json!(provider.rest_base_url));
        provider_map.insert("ws_url", serde_json::json!(provider.ws_url));
        provider_map.insert("subscription", serde_json::json!(provider.subscription));
        provider_map.insert("request_timeout_seconds", serde_json::json!(provider.request_timeout_seconds));
        provider_map.insert("ws_connect_timeout_secs", serde_json::json!(provider.ws_connect_timeout_secs));
        provider_map.insert("max_reconnect_attempts", serde_json::json!(provider.max_reconnect_attempts));

        let mut config_map = HashMap::new();
        config_map.insert("provider", serde_json::json!(provider_map));
        config_map.insert("monitoring", serde_json::to_value(&*monitoring)?);

        if let Some(parent) = Path::new(config_path).parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&config_map)?;
        fs::write(config_path, json)?;

        info!(path = config_path, "Configuration saved");
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<bool, ConfigError> {
        let mut errors = Vec::new();
        let provider = self.provider.read();

        if provider.api_key.is_empty() {
            errors.push("POLYGON_API_KEY is required".to_string());
        }
        if provider.rest_base_url.is_empty() {
            errors.push("provider.rest_base_url must not be empty".to_string());
        }
        if provider.ws_url.is_empty() {
            errors.push("provider.ws_url must not be empty".to_string());
        }
        if provider.subscription.is_empty() {
            errors.push("provider.subscription must not be empty".to_string());
        }
        if provider.request_timeout_seconds == 0 {
            errors.push("provider.request_timeout_seconds must be > 0".to_string());
        }

        if !errors.is_empty() {
            for error in &errors {
                warn!(error = %error, "Config validation error");
            }
            return Ok(false);
        }

        info!("Configuration validated successfully");
        Ok(true)
    }

    pub fn get_summary(&self) -> ConfigSummary {
        let provider = self.provider.read();
        let monitoring = self.monitoring.read();

        ConfigSummary {
            rest_base_url: provider.rest_base_url.clone(),
            ws_url: provider.ws_url.clone(),
            subscription: provider.subscription.clone(),
            has_api_key: !provider.api_key.is_empty(),
            max_reconnect_attempts: provider.max_reconnect_attempts,
            log_level: monitoring.log_level.clone(),
        }
    }

    pub fn provider(&self) -> ProviderConfig {
        self.provider.read().clone()
    }

    pub fn monitoring(&self) -> MonitoringConfig {
        self.monitoring.read().clone()
    }
}
