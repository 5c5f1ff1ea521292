// Core types for the browser-automation boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Describes how to find elements on the page.
///
/// Serialized externally tagged, so suite files can write
/// `{ css = "aside" }` or `{ role = { role = "button", name = "Next page" } }`.
/// The JSON form is also what the Chromium resolver script consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// CSS selector passed to `querySelectorAll`
    Css(String),
    /// Regex over element text; matches the innermost elements only.
    /// A leading `(?i)` makes it case-insensitive.
    Text(String),
    /// Inputs whose placeholder contains the substring
    Placeholder(String),
    /// ARIA role (explicit or implicit) with an exact accessible name
    Role { role: String, name: String },
    /// First alternative that has visible matches
    Any(Vec<Selector>),
}

impl Selector {
    pub fn css(css: impl Into<String>) -> Self {
        Selector::Css(css.into())
    }

    pub fn text(pattern: impl Into<String>) -> Self {
        Selector::Text(pattern.into())
    }

    pub fn placeholder(fragment: impl Into<String>) -> Self {
        Selector::Placeholder(fragment.into())
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Selector::Role {
            role: role.into(),
            name: name.into(),
        }
    }

    pub fn any(alternatives: impl IntoIterator<Item = Selector>) -> Self {
        Selector::Any(alternatives.into_iter().collect())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "{}", css),
            Selector::Text(pattern) => write!(f, "text=/{}/", pattern),
            Selector::Placeholder(fragment) => write!(f, "[placeholder*=\"{}\"]", fragment),
            Selector::Role { role, name } => write!(f, "role={}[name=\"{}\"]", role, name),
            Selector::Any(alternatives) => {
                for (i, alt) in alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", alt)?;
                }
                Ok(())
            }
        }
    }
}

/// Read-only view of one matched element at the moment it was queried
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementState {
    /// Rendered text (trimmed)
    pub text: String,
    /// Current value for form controls
    pub value: Option<String>,
    /// Whether the element is rendered with a box
    pub visible: bool,
    /// Whether the element is a disabled control
    pub disabled: bool,
    /// `aria-label` attribute
    pub aria_label: Option<String>,
    /// Accessible names of the buttons inside the element
    #[serde(default)]
    pub actions: Vec<String>,
}

impl ElementState {
    /// Text for display: rendered text, or the control value when there is none
    pub fn display_text(&self) -> &str {
        if self.text.is_empty() {
            self.value.as_deref().unwrap_or("")
        } else {
            &self.text
        }
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Error types for driver operations
#[derive(Error, Debug)]
pub enum DriverError {
    /// No visible element matched within the wait
    #[error("no element matches {selector} after {waited:?}")]
    NotFound { selector: String, waited: Duration },

    /// The target existed but the action did not complete in time
    #[error("{action} did not complete within {after:?}")]
    Timeout { action: String, after: Duration },

    /// The browser or the application cannot be reached
    #[error("target unavailable: {0}")]
    Unavailable(String),

    /// The automation protocol reported an error
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_display() {
        assert_eq!(Selector::css("aside").to_string(), "aside");
        assert_eq!(Selector::text("Found").to_string(), "text=/Found/");
        assert_eq!(
            Selector::any([Selector::placeholder("Search"), Selector::css("aside input")]).to_string(),
            "[placeholder*=\"Search\"] | aside input"
        );
        assert_eq!(
            Selector::role("button", "Next page").to_string(),
            "role=button[name=\"Next page\"]"
        );
    }

    #[test]
    fn test_selector_json_shape() {
        let json = serde_json::to_value(Selector::role("button", "Go")).unwrap();
        assert_eq!(json, serde_json::json!({"role": {"role": "button", "name": "Go"}}));

        let json = serde_json::to_value(Selector::any([Selector::css("a")])).unwrap();
        assert_eq!(json, serde_json::json!({"any": [{"css": "a"}]}));
    }

    #[test]
    fn test_selector_from_toml() {
        #[derive(Deserialize)]
        struct Holder {
            target: Selector,
        }
        let holder: Holder = toml::from_str(r#"target = { placeholder = "Search in PDF" }"#).unwrap();
        assert_eq!(holder.target, Selector::placeholder("Search in PDF"));
    }

    #[test]
    fn test_display_text_falls_back_to_value() {
        let input = ElementState {
            value: Some("3".to_string()),
            visible: true,
            ..Default::default()
        };
        assert_eq!(input.display_text(), "3");
    }
}
