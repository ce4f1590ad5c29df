//! Cosmetic rule parsing and bait blueprints.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::environment::ElementSpec;

const RULE_MARKER: &str = "##";

/// Characters that make a selector depend on structure or state a lone bait
/// element cannot reproduce.
const REJECTED_CHARS: &[char] = &[':', '>', '*', '+', '~'];

static CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.([A-Za-z0-9_-]+)").unwrap());
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([A-Za-z0-9_-]+)").unwrap());
static ATTRIBUTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.*?)\]").unwrap());
static ATTRIBUTE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").unwrap());

/// Extract every usable element-hiding selector from raw list text.
///
/// Only generic rules (lines starting with `##`) are considered; domain
/// scoped and exception rules are ignored.
pub fn parse_cosmetic_selectors(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix(RULE_MARKER))
        .filter(|selector| !selector.is_empty() && is_usable_selector(selector))
        .map(str::to_string)
        .collect()
}

/// Whether a selector targets a single element by tag, class, id or
/// attributes only.
pub fn is_usable_selector(selector: &str) -> bool {
    if selector.contains(REJECTED_CHARS) {
        return false;
    }

    // Whitespace is a descendant combinator unless it sits inside an
    // attribute block or a quoted value.
    let mut depth = 0_u32;
    let mut quote: Option<char> = None;
    for ch in selector.chars() {
        match (quote, ch) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if c.is_whitespace() && depth == 0 => return false,
            _ => {}
        }
    }
    true
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BaitError {
    #[error("invalid attribute name `{0}`")]
    AttributeName(String),
}

/// Element shape derived from one selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaitBlueprint {
    pub classes: Vec<String>,
    pub id: Option<String>,
    pub attributes: Vec<(String, String)>,
}

impl BaitBlueprint {
    pub fn from_selector(selector: &str) -> Result<Self, BaitError> {
        let mut attributes = Vec::new();
        for capture in ATTRIBUTE_RE.captures_iter(selector) {
            let body = &capture[1];
            let mut parts = body.split('=');
            let name = parts.next().unwrap_or_default().trim();
            if !ATTRIBUTE_NAME_RE.is_match(name) {
                return Err(BaitError::AttributeName(name.to_string()));
            }
            let value = parts.next().unwrap_or_default().replace('"', "");
            attributes.push((name.to_string(), value));
        }

        // Dots and hashes inside attribute values are not classes or ids.
        let outside = ATTRIBUTE_RE.replace_all(selector, "");
        let classes = CLASS_RE
            .captures_iter(&outside)
            .map(|capture| capture[1].to_string())
            .collect();
        let id = ID_RE
            .captures(&outside)
            .map(|capture| capture[1].to_string());

        Ok(Self {
            classes,
            id,
            attributes,
        })
    }

    pub fn to_element(&self) -> ElementSpec {
        let mut spec = ElementSpec::div().with_text("\u{a0}");
        if let Some(id) = &self.id {
            spec = spec.with_id(id.clone());
        }
        for class in &self.classes {
            spec = spec.with_class(class.clone());
        }
        for (name, value) in &self.attributes {
            spec = spec.with_attribute(name.clone(), value.clone());
        }
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_generic_simple_rules() {
        let text = "\
! comment
##.ad-banner
  ##.sponsored  \n\
example.com##.site-only
##div > .child
##a:has(.x)
##*[id^=ad]
##.a + .b
##.a ~ .b
##.outer .inner
##[data-ad=\"slot one\"]
##
#@#.exception
##div#top-ad.banner";

        assert_eq!(
            parse_cosmetic_selectors(text),
            vec![
                ".ad-banner",
                ".sponsored",
                "[data-ad=\"slot one\"]",
                "div#top-ad.banner",
            ]
        );
    }

    #[test]
    fn blueprint_collects_classes_first_id_and_attributes() {
        let blueprint = BaitBlueprint::from_selector("div#first#second.ad.box[data-x=\"1\"][hidden]")
            .unwrap();
        assert_eq!(blueprint.classes, vec!["ad", "box"]);
        assert_eq!(blueprint.id.as_deref(), Some("first"));
        assert_eq!(
            blueprint.attributes,
            vec![
                ("data-x".to_string(), "1".to_string()),
                ("hidden".to_string(), String::new())
            ]
        );
    }

    #[test]
    fn attribute_values_do_not_leak_classes() {
        let blueprint = BaitBlueprint::from_selector("[href=\"ads.example.com\"]").unwrap();
        assert!(blueprint.classes.is_empty());
        assert_eq!(blueprint.attributes[0].1, "ads.example.com");
    }

    #[test]
    fn operator_attributes_are_malformed() {
        assert_eq!(
            BaitBlueprint::from_selector("[href^=\"http\"]"),
            Err(BaitError::AttributeName("href^".into()))
        );
        assert!(BaitBlueprint::from_selector("[]").is_err());
    }

    #[test]
    fn bait_element_has_content() {
        let spec = BaitBlueprint::from_selector("#ad.x").unwrap().to_element();
        assert_eq!(spec.id.as_deref(), Some("ad"));
        assert_eq!(spec.classes, vec!["x"]);
        assert!(spec.text.is_some());
    }
}
