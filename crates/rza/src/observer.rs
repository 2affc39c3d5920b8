//! Watching a widget's subtree for changes.
//!
//! Hosts report raw [`MutationRecord`]s in batches. This module reduces a batch
//! to what the widget cares about: which of its own attributes changed and
//! whether its content (anything outside the output node) changed. Changes
//! inside the output node are the widget's own doing and never count.
use indexmap::{IndexMap, IndexSet};

use crate::{
    Str,
    view::{MutationKind, MutationRecord, ViewAttributes, ViewElement, ViewNode, ViewObserver},
    widget::Config,
};

/// Whether `node` is `root` or one of its descendants.
pub fn in_subtree<N: ViewNode>(node: &N, root: &N) -> bool {
    let mut node = Some(node.clone());
    while let Some(n) = node {
        if n.same_node(root) {
            return true;
        }
        node = n.parent_node();
    }
    false
}

/// Whether `node` carries the output marker itself.
pub fn is_marked<N: ViewNode>(node: &N, config: &Config) -> bool {
    config.is_marker(
        &config.slot_attribute,
        node.node_attribute(&config.slot_attribute).as_deref(),
    )
}

/// Whether `node` is an output node or inside one, looking up no further
/// than `root`.
pub fn in_output_slot<N: ViewNode>(node: &N, root: &N, config: &Config) -> bool {
    let mut node = Some(node.clone());
    while let Some(n) = node {
        if n.same_node(root) {
            return false;
        }
        if is_marked(&n, config) {
            return true;
        }
        node = n.parent_node();
    }
    false
}

/// What a batch of mutations means to a widget.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Changes {
    /// Names of the widget's own attributes that changed, in order of first
    /// appearance.
    pub attributes: IndexSet<Str>,
    /// The widget's content changed and it should render.
    pub content: bool,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && !self.content
    }

    /// Current values of the changed attributes, read off `element`.
    ///
    /// Reading the element rather than the records gives the final value when
    /// an attribute changed more than once in the batch. Removed attributes
    /// read as `None`.
    pub fn read_attributes<E: ViewAttributes>(&self, element: &E) -> IndexMap<Str, Option<Str>> {
        self.attributes
            .iter()
            .map(|name| (name.clone(), element.get_attribute(name)))
            .collect()
    }
}

/// Reduce a batch of records observed on `root`.
pub fn summarize<N: ViewNode>(records: &[MutationRecord<N>], root: &N, config: &Config) -> Changes {
    let mut changes = Changes::default();
    for record in records {
        if !in_subtree(&record.target, root) {
            continue;
        }
        match &record.kind {
            MutationKind::Attributes { name } => {
                // Only the widget's own attributes are settings. Attributes of
                // descendants, output node included, are not content.
                if record.target.same_node(root) {
                    changes.attributes.insert(name.clone());
                }
            }
            MutationKind::CharacterData => {
                if !in_output_slot(&record.target, root, config) {
                    changes.content = true;
                }
            }
            MutationKind::ChildList { added, removed } => {
                if in_output_slot(&record.target, root, config) {
                    continue;
                }
                if added
                    .iter()
                    .chain(removed.iter())
                    .any(|node| !is_marked(node, config))
                {
                    changes.content = true;
                }
            }
        }
    }
    changes
}

/// Pull batches off `observer` until it disconnects or `on_batch` returns
/// `false`.
pub async fn watch<O: ViewObserver>(
    observer: O,
    mut on_batch: impl FnMut(Vec<MutationRecord<O::Node>>) -> bool,
) {
    while let Some(batch) = observer.next_batch().await {
        log::trace!("mutation batch of {} records", batch.len());
        if !on_batch(batch) {
            break;
        }
    }
    log::trace!("stopped watching");
}

/// Reduce a batch observed on `element`, or nothing if the batch must be
/// ignored entirely.
pub fn dispatch<E: ViewElement>(
    records: &[MutationRecord<E::Node>],
    element: &E,
    config: &Config,
) -> Option<(IndexMap<Str, Option<Str>>, bool)> {
    let changes = summarize(records, &element.as_node(), config);
    if changes.is_empty() {
        return None;
    }
    Some((changes.read_attributes(element), changes.content))
}

#[cfg(all(test, feature = "ssr"))]
mod test {
    use super::*;
    use crate::ssr::{SsrElement, SsrNode, SsrText};

    fn widget_with_output() -> (SsrElement, SsrElement) {
        let widget = SsrElement::new("test-five");
        let output = SsrElement::new("render");
        output.set_attribute("slot", "render");
        widget.append_child(&output);
        (widget, output)
    }

    #[test]
    fn output_slot_membership() {
        let config = Config::default();
        let (widget, output) = widget_with_output();
        let inner = SsrElement::new("b");
        output.append_child(&inner);
        let text = SsrText::new("hi");
        inner.append_node(text.as_node());
        let content = SsrElement::new("span");
        widget.append_child(&content);

        let root = widget.as_node();
        assert!(in_output_slot(&output.as_node(), &root, &config));
        assert!(in_output_slot(&inner.as_node(), &root, &config));
        assert!(in_output_slot(&text.as_node(), &root, &config));
        assert!(!in_output_slot(&content.as_node(), &root, &config));
        assert!(!in_output_slot(&root, &root, &config));
        assert!(in_subtree(&text.as_node(), &root));
        assert!(!in_subtree(&SsrElement::new("x").as_node(), &root));
    }

    #[test]
    fn output_only_batch_is_empty() {
        let config = Config::default();
        let (widget, output) = widget_with_output();
        let root = widget.as_node();
        let text: SsrNode = SsrText::new("asdf").as_node();
        let records = vec![
            MutationRecord::child_list(output.as_node(), vec![text.clone()], vec![]),
            MutationRecord::attribute(output.as_node(), "nothing"),
            MutationRecord::child_list(root.clone(), vec![output.as_node()], vec![output.as_node()]),
        ];
        output.append_node(text);
        assert!(summarize(&records, &root, &config).is_empty());
    }

    #[test]
    fn mixed_batch_reports_both() {
        let config = Config::default();
        let (widget, _output) = widget_with_output();
        let root = widget.as_node();
        let span = SsrElement::new("span");
        widget.append_child(&span);
        widget.set_attribute("tag", "one");
        widget.set_attribute("tag", "two");
        let records = vec![
            MutationRecord::attribute(root.clone(), "tag"),
            MutationRecord::child_list(root.clone(), vec![span.as_node()], vec![]),
            MutationRecord::attribute(root.clone(), "tag"),
        ];
        let changes = summarize(&records, &root, &config);
        assert!(changes.content);
        assert_eq!(changes.attributes.len(), 1);

        let (attributes, render) = dispatch(&records, &widget, &config).unwrap();
        assert!(render);
        assert_eq!(attributes["tag"].as_deref(), Some("two"));
    }

    #[test]
    fn records_outside_the_widget_are_dropped() {
        let config = Config::default();
        let (widget, _) = widget_with_output();
        let stranger = SsrElement::new("div");
        let records = vec![
            MutationRecord::attribute(stranger.as_node(), "tag"),
            MutationRecord::character_data(SsrText::new("x").as_node()),
        ];
        assert!(dispatch(&records, &widget, &config).is_none());
    }

    #[test]
    fn text_edits_in_content_render() {
        let config = Config::default();
        let (widget, _) = widget_with_output();
        let text = SsrText::new("4");
        widget.append_node(text.as_node());
        let records = vec![MutationRecord::character_data(text.as_node())];
        let changes = summarize(&records, &widget.as_node(), &config);
        assert!(changes.content);
        assert!(changes.attributes.is_empty());
    }
}
