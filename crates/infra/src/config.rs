use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub log_level: String,
    pub database_path: String,
    pub history_limit: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("log_level", "info")?
            .set_default("database_path", "dropoff.db")?
            .set_default("history_limit", 10)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(app_env: &str) -> AppConfig {
        AppConfig {
            app_env: app_env.into(),
            log_level: "info".into(),
            database_path: ":memory:".into(),
            history_limit: 10,
        }
    }

    #[test]
    fn production_is_case_insensitive() {
        assert!(config("Production").is_production());
        assert!(!config("development").is_production());
    }
}
