use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub dataset_path: PathBuf,
    pub static_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_raw =
            env::var("TAG_TRENDS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_normalized = bind_raw
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .to_string();
        let bind_addr = bind_normalized
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let dataset_path = PathBuf::from(
            env::var("TAG_TRENDS_DATASET_PATH").unwrap_or_else(|_| "data/tags.xlsx".to_string()),
        );

        let static_dir = PathBuf::from(
            env::var("TAG_TRENDS_STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
        );

        Ok(Self {
            bind_addr,
            dataset_path,
            static_dir,
        })
    }
}
