use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_database_path());

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_path,
            log_level,
        }
    }
}

pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("com.kartei.app")
        .join("kartei.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_points_at_the_app_database() {
        let path = default_database_path();
        assert_eq!(path.file_name().unwrap(), "kartei.db");
    }
}
