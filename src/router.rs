//! Keyword routing from the latest user message to at most one tool.
//!
//! Rules are tried in order and the first match wins. Matching is
//! case-insensitive; extracted queries keep the user's original casing.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::config::{EmptyQueryPolicy, RouterConfig};
use crate::tools::ToolKind;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteDecision {
    pub tool: Option<ToolKind>,
    pub query: Option<String>,
}

impl RouteDecision {
    fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extract {
    /// Text after the matched phrase.
    After,
    /// The whole message.
    Whole,
    Nothing,
}

#[derive(Debug)]
struct Rule {
    tool: ToolKind,
    pattern: Regex,
    extract: Extract,
}

impl Rule {
    fn new(tool: ToolKind, pattern: &str, extract: Extract) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            tool,
            pattern,
            extract,
        })
    }

    /// `None` when the rule does not match, otherwise the extracted query (maybe empty).
    fn apply<'a>(&self, text: &'a str) -> Option<Option<&'a str>> {
        let m = self.pattern.find(text)?;
        Some(match self.extract {
            Extract::After => Some(text[m.end()..].trim()),
            Extract::Whole => Some(text.trim()),
            Extract::Nothing => None,
        })
    }
}

#[derive(Debug)]
pub struct Router {
    rules: Vec<Rule>,
    empty_query: EmptyQueryPolicy,
}

impl Router {
    pub fn new(cfg: &RouterConfig, search_enabled: bool) -> Result<Self, regex::Error> {
        let mut rules = vec![
            Rule::new(ToolKind::Weather, r"weather in", Extract::After)?,
            Rule::new(ToolKind::News, r"news about", Extract::After)?,
            Rule::new(ToolKind::Cricket, r"cricket score|live score", Extract::Nothing)?,
        ];
        if search_enabled {
            rules.push(Rule::new(
                ToolKind::Search,
                r"\b(?:search for|look up|google)\b",
                Extract::After,
            )?);
            rules.push(Rule::new(
                ToolKind::Search,
                r"\b(?:latest|current|price of|who won|today)\b",
                Extract::Whole,
            )?);
        }
        Ok(Self {
            rules,
            empty_query: cfg.empty_query,
        })
    }

    pub fn route(&self, text: &str) -> RouteDecision {
        let Some((rule, query)) = self
            .rules
            .iter()
            .find_map(|r| r.apply(text).map(|q| (r, q)))
        else {
            return RouteDecision::none();
        };

        let decision = match query {
            Some("") if rule.tool.needs_query() => match self.empty_query {
                EmptyQueryPolicy::Fallback => RouteDecision::none(),
                EmptyQueryPolicy::Invoke => RouteDecision {
                    tool: Some(rule.tool),
                    query: None,
                },
            },
            q => RouteDecision {
                tool: Some(rule.tool),
                query: q.filter(|s| !s.is_empty()).map(str::to_string),
            },
        };
        debug!(tool = ?decision.tool, query = ?decision.query, "routed");
        decision
    }
}
