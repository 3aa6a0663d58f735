use std::io::IsTerminal;

use serde::Deserialize;

use crate::logger::format::LoggerFormat;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `mirctl=debug,info`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_table_keeps_defaults() {
        let cfg: LoggerConfig = toml::from_str(r#"format = "json""#).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level, "info");
        assert!(cfg.with_targets);
    }

    #[test]
    fn invalid_format_fails_deserialization() {
        assert!(toml::from_str::<LoggerConfig>(r#"format = "xml""#).is_err());
    }
}
