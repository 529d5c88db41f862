use serde::{Deserialize, Serialize};

/// One way of locating a UI target on the page.
///
/// Strategies are plain data: an [`crate::ActionPlan`] carries an ordered list
/// of them and the executor tries each in turn. They are usually written as
/// strings in configuration and parsed with `Strategy::from`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Select by ARIA role and optional accessible name
    Role { role: String, name: Option<String> },
    /// Select by exact visible text
    Text(String),
    /// Select by a substring of the visible text
    TextContains(String),
    /// Select using a CSS selector
    Css(String),
    /// Select using an XPath expression
    XPath(String),
    /// Select an input by its placeholder
    Placeholder(String),
    /// Select by `aria-label` or associated `<label>`
    Label(String),
    /// Select by the `data-testid` attribute
    TestId(String),
    /// Chain multiple strategies, each scoped to the previous match
    Chain(Vec<Strategy>),
    /// Represents an invalid strategy string, with a reason.
    Invalid(String),
}

impl Strategy {
    pub fn is_valid(&self) -> bool {
        match self {
            Strategy::Invalid(_) => false,
            Strategy::Chain(parts) => !parts.is_empty() && parts.iter().all(Strategy::is_valid),
            _ => true,
        }
    }

    /// Parse a strategy template, substituting `{name}` first.
    pub fn render(template: &str, name: &str) -> Strategy {
        Strategy::from(template.replace("{name}", name).as_str())
    }

    /// Render every template in order.
    pub fn render_all(templates: &[String], name: &str) -> Vec<Strategy> {
        templates.iter().map(|t| Strategy::render(t, name)).collect()
    }

    pub fn parse_all(strings: &[String]) -> Vec<Strategy> {
        strings.iter().map(|s| Strategy::from(s.as_str())).collect()
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Role { role, name: None } => write!(f, "role:{role}"),
            Strategy::Role {
                role,
                name: Some(name),
            } => write!(f, "role:{role}|{name}"),
            Strategy::Text(text) => write!(f, "text:{text}"),
            Strategy::TextContains(text) => write!(f, "contains:{text}"),
            Strategy::Css(css) => write!(f, "css:{css}"),
            Strategy::XPath(xpath) => write!(f, "xpath:{xpath}"),
            Strategy::Placeholder(p) => write!(f, "placeholder:{p}"),
            Strategy::Label(l) => write!(f, "label:{l}"),
            Strategy::TestId(id) => write!(f, "testid:{id}"),
            Strategy::Chain(parts) => {
                let joined: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", joined.join(" >> "))
            }
            Strategy::Invalid(reason) => write!(f, "invalid({reason})"),
        }
    }
}

impl From<&str> for Strategy {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // Handle chained strategies first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Strategy::Chain(parts.into_iter().map(Strategy::from).collect());
        }

        if s.is_empty() {
            return Strategy::Invalid("empty strategy".to_string());
        }

        let lower = s.to_lowercase();
        match s {
            // role:button|Save or role:button
            _ if lower.starts_with("role:") => {
                let rest = &s["role:".len()..];
                match rest.split_once('|') {
                    Some((role, name)) => Strategy::Role {
                        role: role.trim().to_string(),
                        name: Some(name.trim().strip_prefix("name:").unwrap_or(name.trim()).to_string()),
                    },
                    None => Strategy::Role {
                        role: rest.trim().to_string(),
                        name: None,
                    },
                }
            }
            _ if lower.starts_with("text:") => Strategy::Text(s["text:".len()..].to_string()),
            _ if lower.starts_with("contains:") => {
                Strategy::TextContains(s["contains:".len()..].to_string())
            }
            _ if lower.starts_with("css:") => Strategy::Css(s["css:".len()..].trim().to_string()),
            _ if lower.starts_with("xpath:") => {
                Strategy::XPath(s["xpath:".len()..].trim().to_string())
            }
            _ if lower.starts_with("placeholder:") => {
                Strategy::Placeholder(s["placeholder:".len()..].to_string())
            }
            _ if lower.starts_with("label:") => Strategy::Label(s["label:".len()..].to_string()),
            _ if lower.starts_with("testid:") => {
                Strategy::TestId(s["testid:".len()..].trim().to_string())
            }
            _ if s.starts_with('/') || s.starts_with("(/") => Strategy::XPath(s.to_string()),
            _ if s.starts_with('#') || s.starts_with('.') || s.starts_with('[') => {
                Strategy::Css(s.to_string())
            }
            // button|Save shorthand
            _ if s.contains('|') => {
                let (role, name) = s.split_once('|').unwrap_or((s, ""));
                Strategy::Role {
                    role: role.trim().to_string(),
                    name: Some(name.trim().to_string()),
                }
            }
            _ => Strategy::Invalid(format!(
                "Unknown strategy format: \"{s}\". Use prefixes like 'role:', 'text:', 'contains:', 'css:', 'xpath:', 'placeholder:', 'label:' or 'testid:'."
            )),
        }
    }
}

impl From<String> for Strategy {
    fn from(s: String) -> Self {
        Strategy::from(s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_with_name() {
        assert_eq!(
            Strategy::from("role:button|Save Program"),
            Strategy::Role {
                role: "button".into(),
                name: Some("Save Program".into())
            }
        );
        assert_eq!(
            Strategy::from("button|Save"),
            Strategy::Role {
                role: "button".into(),
                name: Some("Save".into())
            }
        );
    }

    #[test]
    fn test_prefixes_and_shorthands() {
        assert_eq!(Strategy::from("text:Add Exercise"), Strategy::Text("Add Exercise".into()));
        assert_eq!(Strategy::from("contains:Bench"), Strategy::TextContains("Bench".into()));
        assert_eq!(Strategy::from("//div[@role='row']"), Strategy::XPath("//div[@role='row']".into()));
        assert_eq!(Strategy::from("#program-name"), Strategy::Css("#program-name".into()));
        assert_eq!(Strategy::from("testid:save-btn"), Strategy::TestId("save-btn".into()));
    }

    #[test]
    fn test_chain_and_invalid() {
        let chained = Strategy::from("css:.modal >> text:Save");
        assert_eq!(
            chained,
            Strategy::Chain(vec![Strategy::Css(".modal".into()), Strategy::Text("Save".into())])
        );
        assert!(chained.is_valid());
        assert!(!Strategy::from("whatever").is_valid());
        assert!(!Strategy::from("  ").is_valid());
    }

    #[test]
    fn test_render_template() {
        let templates = vec!["text:{name}".to_string(), "role:link|{name}".to_string()];
        let rendered = Strategy::render_all(&templates, "Hypertrophy Block");
        assert_eq!(rendered[0], Strategy::Text("Hypertrophy Block".into()));
        assert_eq!(rendered[1].to_string(), "role:link|Hypertrophy Block");
    }
}
