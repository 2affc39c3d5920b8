//! What a widget author provides.
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
    Str,
    defaults::Defaults,
    gizmo::Settings,
    view::View,
};

/// Markup of the default presentation wrapper: zeroed spacing and one named
/// region the output node is slotted into.
pub const DEFAULT_SHELL: &str = r#"
    <style>
    :host {
      margin: 0 0 0 0;
      padding: 0 0 0 0;
    }
    ::slotted([slot="render"]) {
      margin: 0 0 0 0;
      padding: 0 0 0 0;
    }
    </style>
    <slot name="render"></slot>
    "#;

/// How a widget marks and names its output node.
///
/// Every field has a default, so any subset can be deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tag of the output node the widget creates.
    pub output_tag: String,
    /// Attribute marking the output node.
    pub slot_attribute: String,
    /// Value of the marking attribute.
    pub slot_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_tag: "render".into(),
            slot_attribute: "slot".into(),
            slot_name: "render".into(),
        }
    }
}

impl Config {
    /// Whether `value` of `attribute` marks a node as widget output.
    pub fn is_marker(&self, attribute: &str, value: Option<&str>) -> bool {
        attribute == self.slot_attribute && value == Some(self.slot_name.as_str())
    }
}

/// The result of a render.
pub enum Output<V: View> {
    /// Replace the output node's children with this markup.
    Markup(Str),
    /// Use this element as the output node. Returning the current output node
    /// leaves everything as is.
    Element(V::Element),
    /// Clear the output node.
    Empty,
    /// Leave the output node untouched.
    Keep,
}

impl<V: View> From<&'static str> for Output<V> {
    fn from(s: &'static str) -> Self {
        Output::Markup(s.into())
    }
}

impl<V: View> From<String> for Output<V> {
    fn from(s: String) -> Self {
        Output::Markup(s.into())
    }
}

impl<V: View> From<Str> for Output<V> {
    fn from(s: Str) -> Self {
        Output::Markup(s)
    }
}

impl<V: View, T: Into<Output<V>>> From<Option<T>> for Output<V> {
    fn from(t: Option<T>) -> Self {
        t.map(Into::into).unwrap_or(Output::Empty)
    }
}

/// A widget definition: declared settings, a render function and a shell.
///
/// Widget state that a render needs to keep (counters and the like) lives in
/// the implementing type behind interior mutability, as renders only borrow it.
pub trait Widget<V: View>: 'static {
    /// The declared settings. Called once, when the widget is created.
    fn defaults(&self) -> Defaults<V> {
        Defaults::Absent
    }

    /// Produce output from a snapshot of the settings and the widget's own
    /// markup content (without its output node).
    fn render(
        &self,
        settings: Settings<V>,
        content: String,
    ) -> impl Future<Output = anyhow::Result<Output<V>>>;

    /// Markup of the presentation wrapper.
    fn shell(&self) -> Str {
        DEFAULT_SHELL.into()
    }

    fn config(&self) -> Config {
        Config::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_fields_default_independently() {
        let config: Config = serde_json::from_str(r#"{"output_tag": "out"}"#).unwrap();
        assert_eq!(config.output_tag, "out");
        assert_eq!(config.slot_attribute, "slot");
        assert!(config.is_marker("slot", Some("render")));
        assert!(!config.is_marker("slot", Some("other")));
        assert!(!config.is_marker("slot", None));
    }
}
