//! Message routing rules.
//!
//! Classification is an ordered, auditable rule table: each rule names a
//! trigger set, the first matching rule wins, and an unmatched message
//! falls through to plain chat. A pure function of the message text.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Chat,
    ImageGenerate,
}

pub struct RouteRule {
    pub name: &'static str,
    pub route: RouteKind,
    pub keywords: &'static [&'static str],
}

/// Checked top to bottom; domain phrases outrank generic verbs so the
/// matched rule name stays meaningful in logs.
pub static ROUTE_RULES: &[RouteRule] = &[
    RouteRule {
        name: "product-photography",
        route: RouteKind::ImageGenerate,
        keywords: &["product shot", "studio shot", "lifestyle", "packshot"],
    },
    RouteRule {
        name: "generation-verb",
        route: RouteKind::ImageGenerate,
        keywords: &["generate", "create", "draw", "render", "make me"],
    },
    RouteRule {
        name: "image-noun",
        route: RouteKind::ImageGenerate,
        keywords: &["image", "picture", "photo", "illustration", "visual"],
    },
];

/// Transient routing verdict for one message; never persisted.
#[derive(Debug, Clone, Copy)]
pub struct RoutingDecision {
    pub route: RouteKind,
    pub matched_rule: Option<&'static str>,
}

pub fn classify(message: &str) -> RoutingDecision {
    let lowered = message.to_lowercase();

    for rule in ROUTE_RULES {
        if rule.keywords.iter().any(|kw| lowered.contains(kw)) {
            return RoutingDecision {
                route: rule.route,
                matched_rule: Some(rule.name),
            };
        }
    }

    RoutingDecision {
        route: RouteKind::Chat,
        matched_rule: None,
    }
}
