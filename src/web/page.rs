use anyhow::{Context as _, Result};
use serde::Serialize;
use tera::{Context, Tera};

use crate::assets;
use crate::chat::{Role, Turn};
use crate::web::markdown;

pub const TITLE: &str = "👽 ByteChat";
pub const CAPTION: &str = "A streaming chatbot with a modular structure";

const TEMPLATE: &str = "index.html";

/// A turn as the browser sees it: the raw text plus its rendered Markdown.
#[derive(Debug, Serialize)]
pub struct TurnView<'a> {
    pub role: &'static str,
    pub avatar: &'static str,
    pub content: &'a str,
    pub html: String,
}

impl<'a> TurnView<'a> {
    pub fn new(turn: &'a Turn) -> Self {
        Self {
            role: turn.role.as_str(),
            avatar: turn.role.avatar(),
            content: &turn.content,
            html: markdown::to_html(&turn.content),
        }
    }

    pub fn all(turns: &'a [Turn]) -> Vec<Self> {
        turns.iter().map(Self::new).collect()
    }
}

/// Server-side render of the chat page. Turn bodies are rendered Markdown; everything else is escaped.
pub struct PageRenderer {
    tera: Tera,
}

impl PageRenderer {
    pub fn new() -> Result<Self> {
        let source = assets::text(TEMPLATE).context("chat page template is not bundled")?;
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE, &source)
            .context("parse chat page template")?;
        Ok(Self { tera })
    }

    pub fn render(&self, turns: &[Turn]) -> Result<String, tera::Error> {
        let views = TurnView::all(turns);

        let mut ctx = Context::new();
        ctx.insert("title", TITLE);
        ctx.insert("caption", CAPTION);
        ctx.insert("turns", &views);
        ctx.insert("user_avatar", Role::User.avatar());
        ctx.insert("assistant_avatar", Role::Assistant.avatar());
        self.tera.render(TEMPLATE, &ctx)
    }
}
