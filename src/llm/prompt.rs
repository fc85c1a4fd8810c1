use chrono::Local;
use tera::{Context, Tera};
use tracing::error;

use crate::assets;
use crate::config::AppConfig;

pub const ASSISTANT_NAME: &str = "ByteAgent";

/// The persona instruction sent ahead of every model request.
/// An explicit `system_prompt` in config replaces the bundled template.
pub fn build_system_prompt(cfg: &AppConfig) -> String {
    if let Some(custom) = &cfg.system_prompt {
        return custom.clone();
    }

    let template = assets::text("system_prompt.md").unwrap_or_default();
    let mut context = Context::new();
    context.insert("assistant_name", ASSISTANT_NAME);
    context.insert("search_enabled", &cfg.search.enabled);
    context.insert("date", &Local::now().format("%Y-%m-%d %A").to_string());

    Tera::one_off(&template, &context, false)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|e| {
            error!("Failed to render system prompt: {e}");
            template
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_persona_and_tools() {
        let prompt = build_system_prompt(&AppConfig::default());
        assert!(prompt.starts_with("You are 'ByteAgent'"));
        assert!(prompt.contains("weather, news, and cricket scores"));
        assert!(prompt.contains("look things up on the web"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn search_sentence_follows_config() {
        let mut cfg = AppConfig::default();
        cfg.search.enabled = false;
        let prompt = build_system_prompt(&cfg);
        assert!(!prompt.contains("look things up on the web"));
    }

    #[test]
    fn configured_prompt_wins() {
        let cfg = AppConfig {
            system_prompt: Some("Be terse.".into()),
            ..AppConfig::default()
        };
        assert_eq!(build_system_prompt(&cfg), "Be terse.");
    }
}
