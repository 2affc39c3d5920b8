//! Traits for hosting widgets on different platforms.
//!
//! A host (a [`View`]) is anything that can give a widget an element,
//! tell it about changes to that element's subtree and run its tasks. The
//! browser is one such host (see the `web` feature), the in-memory DOM of the
//! `ssr` feature is another.
use std::future::Future;

use crate::{Error, Str};

/// A node in a host's document tree.
pub trait ViewNode: Clone + 'static {
    /// Node identity, not structural equality.
    fn same_node(&self, other: &Self) -> bool;

    /// The node's parent, if it is attached to one.
    fn parent_node(&self) -> Option<Self>;

    /// Value of an attribute on this node.
    ///
    /// Non-element nodes have no attributes.
    fn node_attribute(&self, key: &str) -> Option<Str>;
}

/// Case-sensitive attribute access.
pub trait ViewAttributes {
    fn set_attribute(&self, key: impl AsRef<str>, value: impl AsRef<str>);

    fn has_attribute(&self, key: impl AsRef<str>) -> bool;

    fn get_attribute(&self, key: impl AsRef<str>) -> Option<Str>;

    fn remove_attribute(&self, key: impl AsRef<str>);
}

/// An element that can host a widget or act as its output node.
pub trait ViewElement: ViewAttributes + Clone + 'static {
    type Node: ViewNode;

    fn as_node(&self) -> Self::Node;

    fn same_element(&self, other: &Self) -> bool {
        self.as_node().same_node(&other.as_node())
    }

    fn append_child(&self, child: &Self);

    fn remove_child(&self, child: &Self);

    /// Put `new_child` where `old_child` is.
    fn replace_child(&self, new_child: &Self, old_child: &Self);

    /// Whether `child` is a direct child of this element.
    fn has_child(&self, child: &Self) -> bool;

    /// Serialized markup of this element's children.
    fn inner_html(&self) -> String;

    fn set_inner_html(&self, html: &str);

    /// Markup of the element's presentation wrapper (its shadow root), if any.
    fn shell(&self) -> Option<String>;

    /// Attach a presentation wrapper if there isn't one and set its markup.
    fn set_shell(&self, html: &str);
}

/// What changed in a [`MutationRecord`].
#[derive(Clone, Debug)]
pub enum MutationKind<N> {
    /// An attribute of the target was set or removed.
    Attributes { name: Str },
    /// Text data of the target changed.
    CharacterData,
    /// Children of the target were inserted or removed.
    ChildList { added: Vec<N>, removed: Vec<N> },
}

/// One change reported by a host, independent of how the host delivers it.
#[derive(Clone, Debug)]
pub struct MutationRecord<N> {
    pub target: N,
    pub kind: MutationKind<N>,
}

impl<N> MutationRecord<N> {
    pub fn attribute(target: N, name: impl Into<Str>) -> Self {
        MutationRecord {
            target,
            kind: MutationKind::Attributes { name: name.into() },
        }
    }

    pub fn character_data(target: N) -> Self {
        MutationRecord {
            target,
            kind: MutationKind::CharacterData,
        }
    }

    pub fn child_list(target: N, added: Vec<N>, removed: Vec<N>) -> Self {
        MutationRecord {
            target,
            kind: MutationKind::ChildList { added, removed },
        }
    }
}

/// Delivers batches of mutation records for one observed subtree.
pub trait ViewObserver: Clone + 'static {
    type Node: ViewNode;

    /// Wait for the next batch. Returns `None` once disconnected.
    fn next_batch(&self) -> impl Future<Output = Option<Vec<MutationRecord<Self::Node>>>>;

    /// Take every record observed so far that `next_batch` hasn't handed out.
    fn take_records(&self) -> Vec<MutationRecord<Self::Node>>;

    fn disconnect(&self);
}

/// A widget host.
pub trait View: Clone + 'static {
    type Node: ViewNode;
    type Element: ViewElement<Node = Self::Node>;
    type Observer: ViewObserver<Node = Self::Node>;

    fn create_element(&self, name: &str) -> Result<Self::Element, Error>;

    /// Watch attributes, character data and children anywhere in the
    /// element's subtree.
    fn observe(&self, element: &Self::Element) -> Result<Self::Observer, Error>;

    /// Run a task on the host's event loop, after the current synchronous
    /// work finishes.
    fn spawn(&self, task: impl Future<Output = ()> + 'static);
}
