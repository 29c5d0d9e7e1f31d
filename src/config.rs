use serde::Deserialize;

/// Server settings, read from `Rocket.toml` and `ROCKET_*` environment variables.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub database_path: String,
    pub objectives_table: String,
    pub items_table: String,
    pub max_batch: usize,
    pub max_payload_bytes: u64,
    /// Rows returned by one partition query. There is no follow-up page.
    pub query_page_size: u32,
    pub object_store_root: String,
    pub service_name: String,
    pub max_attachment_kib: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            database_path: "objectives.db".to_string(),
            objectives_table: "objectives".to_string(),
            items_table: "objective_items".to_string(),
            max_batch: 100,
            max_payload_bytes: 100_000,
            query_page_size: 1000,
            object_store_root: "storage".to_string(),
            service_name: "ObjectivesServer".to_string(),
            max_attachment_kib: 2048,
        }
    }
}

impl Config {
    pub fn tables(&self) -> TableNames {
        TableNames {
            objectives: self.objectives_table.clone(),
            items: self.items_table.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub objectives: String,
    pub items: String,
}

impl Default for TableNames {
    fn default() -> TableNames {
        Config::default().tables()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::figment::providers::Serialized;
    use rocket::figment::Figment;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: Config = Figment::new()
            .merge(Serialized::default("max_batch", 10))
            .merge(Serialized::default("items_table", "items_v2"))
            .extract()
            .unwrap();

        assert_eq!(config.max_batch, 10);
        assert_eq!(config.tables().items, "items_v2");
        assert_eq!(config.tables().objectives, "objectives");
        assert_eq!(config.max_payload_bytes, 100_000);
    }
}
