use std::env;

/// Controls whether cached HTTP bodies are purged after a successful run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Number of entries accumulated before a provider flushes a batch.
    pub batch_size: usize,
    /// Worker-pool size for the optional parallel line parser.
    pub parser_workers: usize,
    /// Batch size used by the worker-pool parser variant.
    pub parser_batch_size: usize,
    pub environment: Environment,
    /// Fetcher host allow-list; must include every provider source host.
    pub allowed_domains: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let batch_size = env::var("BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1000);

        let parser_workers = env::var("PARSER_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1);

        let parser_batch_size = env::var("PARSER_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(batch_size);

        let environment = env::var("ENVIRONMENT")
            .ok()
            .map(|v| Environment::from_str(&v))
            .unwrap_or(Environment::Development);

        let allowed_domains = env::var("ALLOWED_DOMAINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Self {
            batch_size,
            parser_workers,
            parser_batch_size,
            environment,
            allowed_domains,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            parser_workers: 1,
            parser_batch_size: 1000,
            environment: Environment::Development,
            allowed_domains: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.batch_size, 1000);
        assert_eq!(cfg.environment, Environment::Development);
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!(Environment::from_str("Production"), Environment::Production);
        assert_eq!(Environment::from_str("development"), Environment::Development);
        assert_eq!(Environment::from_str("garbage"), Environment::Development);
    }
}
