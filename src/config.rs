use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_FUNCTION: &str = "ai-tutor";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Base URL of the backend service (e.g. "https://xyz.supabase.co").
    pub base_url: Option<String>,

    /// Publishable (anon) key sent as the bearer token.
    pub publishable_key: Option<String>,

    /// Name of the chat edge function.
    pub function: Option<String>,

    /// Backend identifier ("http" or "stub").
    pub backend: Option<String>,

    /// Language for fallback messages ("pt", "en", "es").
    pub language: Option<String>,
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    /// Apply `TUTOR_BASE_URL` / `TUTOR_PUBLISHABLE_KEY` on top of the file.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok());
        self
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("TUTOR_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = Some(url);
        }
        if let Some(key) = var("TUTOR_PUBLISHABLE_KEY").filter(|v| !v.trim().is_empty()) {
            self.publishable_key = Some(key);
        }
    }

    pub fn function(&self) -> &str {
        self.function.as_deref().unwrap_or(DEFAULT_FUNCTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = std::env::temp_dir().join(format!("tutor-cfg-missing-{}", std::process::id()));
        assert!(Config::load_optional(dir.join("config.toml")).unwrap().is_none());
    }

    #[test]
    fn parses_toml_file() {
        let dir = std::env::temp_dir().join(format!("tutor-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
base_url = "https://abc.example.co"
publishable_key = "pk_123"
language = "pt-BR"
"#,
        )
        .unwrap();

        let cfg = Config::load_optional(&path).unwrap().unwrap();
        assert_eq!(cfg.base_url.as_deref(), Some("https://abc.example.co"));
        assert_eq!(cfg.publishable_key.as_deref(), Some("pk_123"));
        assert_eq!(cfg.language.as_deref(), Some("pt-BR"));
        assert_eq!(cfg.function(), DEFAULT_FUNCTION);
        assert!(cfg.backend.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rejects_invalid_toml() {
        let dir = std::env::temp_dir().join(format!("tutor-cfg-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "base_url = [").unwrap();
        assert!(Config::load_optional(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config {
            base_url: Some("https://file.example".into()),
            publishable_key: Some("file-key".into()),
            ..Default::default()
        };
        cfg.apply_overrides(|name| match name {
            "TUTOR_BASE_URL" => Some("https://env.example".into()),
            "TUTOR_PUBLISHABLE_KEY" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(cfg.base_url.as_deref(), Some("https://env.example"));
        assert_eq!(cfg.publishable_key.as_deref(), Some("file-key"));
    }
}
