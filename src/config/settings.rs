use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
    pub upload_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "data/whisperbox.db".to_string(),
            upload_dir: "uploads".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    // 托管支付网关地址（卡支付页面由网关托管）
    pub base_url: String,
    pub secret_key: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            base_url: "https://checkout.example.com".to_string(),
            secret_key: None,
            success_url: "http://localhost:8000/user/payment/success?session_id={CHECKOUT_SESSION_ID}"
                .to_string(),
            cancel_url: "http://localhost:8000/user/payment/failure".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = Self::find_config_file()?;
        let config_content = std::fs::read_to_string(&config_path)?;
        let settings: Settings = toml::from_str(&config_content)?;
        Ok(settings)
    }

    fn find_config_file() -> Result<String, Box<dyn std::error::Error>> {
        let possible_names = ["custom-config.toml", "config.toml"];

        for name in &possible_names {
            if Path::new(name).exists() {
                return Ok(name.to_string());
            }
        }

        Err("Configuration file not found. Please create custom-config.toml or config.toml".into())
    }
}
