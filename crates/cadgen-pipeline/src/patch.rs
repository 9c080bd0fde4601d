//! Text rewrites for mistakes models reliably make against build123d
//!
//! Each known mistake is one [`PatchRule`] in an ordered table. Rules match
//! with regular expressions, so a pattern inside a string literal or comment
//! is rewritten too.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// One known mistake and its correction
pub struct PatchRule {
    /// Short identifier used in logs
    pub name: &'static str,
    matcher: Regex,
    rewrite: fn(&Captures) -> String,
    describe: fn(&Captures) -> String,
}

impl PatchRule {
    fn new(
        name: &'static str,
        pattern: &str,
        rewrite: fn(&Captures) -> String,
        describe: fn(&Captures) -> String,
    ) -> Self {
        Self {
            name,
            matcher: Regex::new(pattern).unwrap(),
            rewrite,
            describe,
        }
    }

    /// Rewrite every match in `code`, appending one line per match to `changes`
    fn apply(&self, code: &str, changes: &mut Vec<String>) -> String {
        self.matcher
            .replace_all(code, |caps: &Captures| {
                changes.push((self.describe)(caps));
                (self.rewrite)(caps)
            })
            .into_owned()
    }
}

/// Rewritten program and the changelog of applied rewrites
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patched {
    pub code: String,
    pub changes: Vec<String>,
}

impl Patched {
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

fn fillet_call(c: &Captures) -> String {
    format!("fillet({}.edges(), {})", &c[1], &c[2])
}

fn fillet_note(c: &Captures) -> String {
    format!("{0}.fillet({1}) → fillet({0}.edges(), {1})", &c[1], &c[2])
}

fn chamfer_call(c: &Captures) -> String {
    format!("chamfer({}.edges(), {})", &c[1], &c[2])
}

fn chamfer_note(c: &Captures) -> String {
    format!("{0}.chamfer({1}) → chamfer({0}.edges(), {1})", &c[1], &c[2])
}

fn removal(name: &'static str, method: &str) -> PatchRule {
    PatchRule::new(
        name,
        &format!(r"\.{}\([^)]*\)", regex::escape(method)),
        |_| String::new(),
        |c| format!("removed {} (no such method)", &c[0]),
    )
}

/// The rule table, applied in order
static RULES: LazyLock<Vec<PatchRule>> = LazyLock::new(|| {
    vec![
        PatchRule::new(
            "fillet-method",
            r"(\w+)\.fillet\(([^)]+)\)",
            fillet_call,
            fillet_note,
        ),
        PatchRule::new(
            "chamfer-method",
            r"(\w+)\.chamfer\(([^)]+)\)",
            chamfer_call,
            chamfer_note,
        ),
        PatchRule::new(
            "nested-part-edges",
            r"(fillet|chamfer)\((\w+)\.part\.edges\(\)",
            |c| format!("{}({}.edges()", &c[1], &c[2]),
            |c| format!("{0}({1}.part.edges() → {0}({1}.edges()", &c[1], &c[2]),
        ),
        removal("filter-by-orientation", "filter_by_orientation"),
        removal("filter-by-axis", "filter_by_axis"),
        removal("filter-by-type", "filter_by_type"),
    ]
});

/// Names of the rules in application order
pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|r| r.name).collect()
}

/// Apply every rule in order
pub fn auto_patch(code: &str) -> Patched {
    let mut changes = Vec::new();
    let mut code = code.to_string();
    for rule in RULES.iter() {
        let before = changes.len();
        code = rule.apply(&code, &mut changes);
        if changes.len() > before {
            tracing::debug!("patch rule '{}' applied {} time(s)", rule.name, changes.len() - before);
        }
    }
    Patched { code, changes }
}
