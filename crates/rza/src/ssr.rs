//! Server-side rendered views.
//!
//! An in-memory DOM that serializes to HTML and reports its own mutations the
//! way a browser's `MutationObserver` does: every change is queued for the
//! observers of the changed node and its ancestors, and everything queued
//! during one synchronous stretch arrives as one batch.
use std::{
    cell::RefCell,
    future::Future,
    rc::{Rc, Weak},
};

use async_executor::LocalExecutor;

use crate::{
    Error, Str,
    view::{MutationRecord, View, ViewAttributes, ViewElement, ViewNode, ViewObserver},
};

pub mod prelude {
    pub use super::{Ssr, SsrElement, SsrNode, SsrObserver, SsrText};
    pub use crate::prelude::*;
}

// Only certain nodes can be "void" - which means written as <tag /> when
// the node contains no children. Writing non-void nodes in void notation
// does some spooky things to the DOM at parse-time.
fn tag_is_voidable(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "command"
            | "keygen"
            | "source"
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

enum NodeKind {
    Element {
        name: Str,
        attributes: RefCell<Vec<(Str, Str)>>,
        children: RefCell<Vec<SsrNode>>,
        shell: RefCell<Option<String>>,
    },
    Text(RefCell<Str>),
    /// Markup set through `set_inner_html`, written out verbatim.
    Markup(Str),
}

struct NodeData {
    kind: NodeKind,
    parent: RefCell<Weak<NodeData>>,
    observers: RefCell<Vec<async_channel::Sender<MutationRecord<SsrNode>>>>,
}

/// Any node of the in-memory DOM.
///
/// Clones are handles to the same node.
#[derive(Clone)]
pub struct SsrNode {
    inner: Rc<NodeData>,
}

impl std::fmt::Debug for SsrNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SsrNode").field(&self.html_string()).finish()
    }
}

impl SsrNode {
    fn new(kind: NodeKind) -> Self {
        SsrNode {
            inner: Rc::new(NodeData {
                kind,
                parent: RefCell::new(Weak::new()),
                observers: RefCell::new(vec![]),
            }),
        }
    }

    pub fn as_element(&self) -> Option<SsrElement> {
        matches!(self.inner.kind, NodeKind::Element { .. }).then(|| SsrElement(self.clone()))
    }

    pub fn as_text(&self) -> Option<SsrText> {
        matches!(self.inner.kind, NodeKind::Text(_)).then(|| SsrText(self.clone()))
    }

    fn set_parent(&self, parent: Option<&SsrNode>) {
        *self.inner.parent.borrow_mut() = parent
            .map(|p| Rc::downgrade(&p.inner))
            .unwrap_or_default();
    }

    fn detach(&self) {
        if let Some(parent) = self.parent_node().and_then(|p| p.as_element()) {
            parent.remove_node(self);
        }
    }

    /// Queue `record` for every observer of this node and its ancestors.
    fn notify(&self, record: MutationRecord<SsrNode>) {
        let mut node = Some(self.clone());
        while let Some(n) = node {
            n.inner
                .observers
                .borrow_mut()
                .retain(|tx| tx.try_send(record.clone()).is_ok());
            node = n.parent_node();
        }
    }

    pub fn html_string(&self) -> String {
        match &self.inner.kind {
            NodeKind::Text(text) => escape(&text.borrow()),
            NodeKind::Markup(markup) => markup.to_string(),
            NodeKind::Element { .. } => SsrElement(self.clone()).html_string(),
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        match &self.inner.kind {
            NodeKind::Text(text) => text.borrow().to_string(),
            NodeKind::Markup(markup) => markup.to_string(),
            NodeKind::Element { children, .. } => {
                children.borrow().iter().map(SsrNode::text_content).collect()
            }
        }
    }
}

impl ViewNode for SsrNode {
    fn same_node(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn parent_node(&self) -> Option<Self> {
        self.inner
            .parent
            .borrow()
            .upgrade()
            .map(|inner| SsrNode { inner })
    }

    fn node_attribute(&self, key: &str) -> Option<Str> {
        self.as_element()?.get_attribute(key)
    }
}

/// A text node.
#[derive(Clone, Debug)]
pub struct SsrText(SsrNode);

impl SsrText {
    pub fn new(text: impl Into<Str>) -> Self {
        SsrText(SsrNode::new(NodeKind::Text(RefCell::new(text.into()))))
    }

    pub fn as_node(&self) -> SsrNode {
        self.0.clone()
    }

    pub fn text(&self) -> Str {
        match &self.0.inner.kind {
            NodeKind::Text(text) => text.borrow().clone(),
            _ => Str::default(),
        }
    }

    pub fn set_text(&self, text: impl Into<Str>) {
        if let NodeKind::Text(prev) = &self.0.inner.kind {
            *prev.borrow_mut() = text.into();
            self.0.notify(MutationRecord::character_data(self.0.clone()));
        }
    }
}

/// An element node.
#[derive(Clone, Debug)]
pub struct SsrElement(SsrNode);

impl SsrElement {
    pub fn new(name: impl Into<Str>) -> Self {
        SsrElement(SsrNode::new(NodeKind::Element {
            name: name.into(),
            attributes: RefCell::new(vec![]),
            children: RefCell::new(vec![]),
            shell: RefCell::new(None),
        }))
    }

    fn parts(&self) -> (&Str, &RefCell<Vec<(Str, Str)>>, &RefCell<Vec<SsrNode>>) {
        match &self.0.inner.kind {
            NodeKind::Element {
                name,
                attributes,
                children,
                ..
            } => (name, attributes, children),
            // SsrElement is only ever constructed around element nodes
            _ => unreachable!("SsrElement wraps a non-element node"),
        }
    }

    pub fn name(&self) -> Str {
        self.parts().0.clone()
    }

    pub fn children(&self) -> Vec<SsrNode> {
        self.parts().2.borrow().clone()
    }

    /// Append any node, moving it out of its current parent first.
    pub fn append_node(&self, node: SsrNode) {
        node.detach();
        node.set_parent(Some(&self.0));
        self.parts().2.borrow_mut().push(node.clone());
        self.0
            .notify(MutationRecord::child_list(self.0.clone(), vec![node], vec![]));
    }

    pub fn remove_node(&self, node: &SsrNode) {
        let removed = {
            let mut children = self.parts().2.borrow_mut();
            let index = children.iter().position(|child| child.same_node(node));
            index.map(|i| children.remove(i))
        };
        if let Some(removed) = removed {
            removed.set_parent(None);
            self.0
                .notify(MutationRecord::child_list(self.0.clone(), vec![], vec![removed]));
        }
    }

    fn replace_children(&self, new_children: Vec<SsrNode>) {
        for child in new_children.iter() {
            child.detach();
            child.set_parent(Some(&self.0));
        }
        let removed = std::mem::replace(&mut *self.parts().2.borrow_mut(), new_children.clone());
        for child in removed.iter() {
            child.set_parent(None);
        }
        if !removed.is_empty() || !new_children.is_empty() {
            self.0
                .notify(MutationRecord::child_list(self.0.clone(), new_children, removed));
        }
    }

    /// Replace all children with one text node.
    pub fn set_text_content(&self, text: impl Into<Str>) {
        let text = text.into();
        if text.is_empty() {
            self.replace_children(vec![]);
        } else {
            self.replace_children(vec![SsrText::new(text).as_node()]);
        }
    }

    pub fn text_content(&self) -> String {
        self.0.text_content()
    }

    /// First descendant element with the given tag name, depth first.
    pub fn find(&self, name: &str) -> Option<SsrElement> {
        for child in self.children() {
            if let Some(el) = child.as_element() {
                if el.name() == name {
                    return Some(el);
                }
                if let Some(found) = el.find(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn html_string(&self) -> String {
        let (name, attributes, _) = self.parts();
        let atts = attributes
            .borrow()
            .iter()
            .map(|(key, val)| {
                if val.is_empty() {
                    key.to_string()
                } else {
                    format!(r#"{key}="{val}""#)
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        let kids = self.inner_html();
        let open = if atts.is_empty() {
            name.to_string()
        } else {
            format!("{name} {atts}")
        };
        if kids.is_empty() && tag_is_voidable(name) {
            format!("<{open} />")
        } else {
            format!("<{open}>{kids}</{name}>")
        }
    }
}

impl ViewAttributes for SsrElement {
    fn set_attribute(&self, key: impl AsRef<str>, value: impl AsRef<str>) {
        let key: Str = key.as_ref().to_owned().into();
        let value: Str = value.as_ref().to_owned().into();
        {
            let mut attributes = self.parts().1.borrow_mut();
            match attributes.iter_mut().find(|(k, _)| *k == key) {
                Some((_, v)) => *v = value,
                None => attributes.push((key.clone(), value)),
            }
        }
        self.0.notify(MutationRecord::attribute(self.0.clone(), key));
    }

    fn has_attribute(&self, key: impl AsRef<str>) -> bool {
        self.parts()
            .1
            .borrow()
            .iter()
            .any(|(k, _)| k == key.as_ref())
    }

    fn get_attribute(&self, key: impl AsRef<str>) -> Option<Str> {
        self.parts()
            .1
            .borrow()
            .iter()
            .find(|(k, _)| k == key.as_ref())
            .map(|(_, v)| v.clone())
    }

    fn remove_attribute(&self, key: impl AsRef<str>) {
        let removed = {
            let mut attributes = self.parts().1.borrow_mut();
            let len = attributes.len();
            attributes.retain(|(k, _)| k != key.as_ref());
            len != attributes.len()
        };
        if removed {
            self.0
                .notify(MutationRecord::attribute(self.0.clone(), key.as_ref().to_owned()));
        }
    }
}

impl ViewElement for SsrElement {
    type Node = SsrNode;

    fn as_node(&self) -> SsrNode {
        self.0.clone()
    }

    fn append_child(&self, child: &Self) {
        self.append_node(child.0.clone());
    }

    fn remove_child(&self, child: &Self) {
        self.remove_node(&child.0);
    }

    fn replace_child(&self, new_child: &Self, old_child: &Self) {
        if new_child.same_element(old_child) || !self.has_child(old_child) {
            return;
        }
        new_child.0.detach();
        {
            let mut children = self.parts().2.borrow_mut();
            if let Some(slot) = children.iter_mut().find(|c| c.same_node(&old_child.0)) {
                *slot = new_child.0.clone();
            }
        }
        old_child.0.set_parent(None);
        new_child.0.set_parent(Some(&self.0));
        self.0.notify(MutationRecord::child_list(
            self.0.clone(),
            vec![new_child.0.clone()],
            vec![old_child.0.clone()],
        ));
    }

    fn has_child(&self, child: &Self) -> bool {
        self.parts()
            .2
            .borrow()
            .iter()
            .any(|c| c.same_node(&child.0))
    }

    fn inner_html(&self) -> String {
        self.parts()
            .2
            .borrow()
            .iter()
            .map(SsrNode::html_string)
            .collect()
    }

    fn set_inner_html(&self, html: &str) {
        if html.is_empty() {
            self.replace_children(vec![]);
        } else {
            let markup = SsrNode::new(NodeKind::Markup(html.to_owned().into()));
            self.replace_children(vec![markup]);
        }
    }

    fn shell(&self) -> Option<String> {
        match &self.0.inner.kind {
            NodeKind::Element { shell, .. } => shell.borrow().clone(),
            _ => None,
        }
    }

    fn set_shell(&self, html: &str) {
        if let NodeKind::Element { shell, .. } = &self.0.inner.kind {
            *shell.borrow_mut() = Some(html.to_owned());
        }
    }
}

/// Receives the mutation records of one observed subtree.
#[derive(Clone)]
pub struct SsrObserver {
    rx: async_channel::Receiver<MutationRecord<SsrNode>>,
}

impl ViewObserver for SsrObserver {
    type Node = SsrNode;

    async fn next_batch(&self) -> Option<Vec<MutationRecord<SsrNode>>> {
        let first = self.rx.recv().await.ok()?;
        let mut batch = vec![first];
        while let Ok(record) = self.rx.try_recv() {
            batch.push(record);
        }
        Some(batch)
    }

    fn take_records(&self) -> Vec<MutationRecord<SsrNode>> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }

    fn disconnect(&self) {
        self.rx.close();
    }
}

/// The in-memory host, running widget tasks on a single-threaded executor.
#[derive(Clone, Default)]
pub struct Ssr {
    executor: Rc<LocalExecutor<'static>>,
}

impl Ssr {
    /// Run every task that is ready, including the ones those tasks wake,
    /// until nothing is left to do.
    pub fn settle(&self) {
        const MAX_TICKS: usize = 100_000;
        for _ in 0..MAX_TICKS {
            if !self.executor.try_tick() {
                return;
            }
        }
        log::warn!("tasks still runnable after {MAX_TICKS} ticks");
    }

    /// Block on `future` while running the host's tasks.
    pub fn run<T>(&self, future: impl Future<Output = T>) -> T {
        futures_lite::future::block_on(self.executor.run(future))
    }
}

impl View for Ssr {
    type Node = SsrNode;
    type Element = SsrElement;
    type Observer = SsrObserver;

    fn create_element(&self, name: &str) -> Result<SsrElement, Error> {
        Ok(SsrElement::new(name.to_owned()))
    }

    fn observe(&self, element: &SsrElement) -> Result<SsrObserver, Error> {
        let (tx, rx) = async_channel::unbounded();
        element.0.inner.observers.borrow_mut().push(tx);
        Ok(SsrObserver { rx })
    }

    fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.executor.spawn(task).detach();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn serializes_like_html() {
        let div = SsrElement::new("div");
        div.set_attribute("id", "hello");
        div.set_attribute("hidden", "");
        div.append_node(SsrText::new("a < b").as_node());
        div.append_child(&SsrElement::new("br"));
        assert_eq!(div.html_string(), r#"<div id="hello" hidden>a &lt; b<br /></div>"#);
        div.set_inner_html("<b>raw</b>");
        assert_eq!(div.inner_html(), "<b>raw</b>");
    }

    #[test]
    fn attributes_are_case_sensitive() {
        let el = SsrElement::new("test-bool");
        el.set_attribute("flipFalse", "");
        assert!(el.has_attribute("flipFalse"));
        assert!(!el.has_attribute("flipfalse"));
        assert_eq!(el.get_attribute("flipFalse").as_deref(), Some(""));
        el.remove_attribute("flipFalse");
        assert_eq!(el.get_attribute("flipFalse"), None);
    }

    #[test]
    fn moving_a_node_detaches_it() {
        let a = SsrElement::new("a");
        let b = SsrElement::new("b");
        let child = SsrElement::new("i");
        a.append_child(&child);
        b.append_child(&child);
        assert!(!a.has_child(&child));
        assert!(b.has_child(&child));
        assert!(child.as_node().parent_node().unwrap().same_node(&b.as_node()));

        let other = SsrElement::new("u");
        b.replace_child(&other, &child);
        assert!(child.as_node().parent_node().is_none());
        assert_eq!(b.inner_html(), "<u></u>");
    }

    #[test]
    fn observers_get_batches_from_the_whole_subtree() {
        let ssr = Ssr::default();
        let root = SsrElement::new("root");
        let child = SsrElement::new("child");
        root.append_child(&child);
        let observer = ssr.observe(&root).unwrap();

        root.set_attribute("tag", "x");
        child.set_text_content("hello");
        let text = child.children()[0].as_text().unwrap();
        text.set_text("bye");

        let batch = ssr.run(observer.next_batch()).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch[2].target.same_node(&text.as_node()));

        observer.disconnect();
        root.set_attribute("tag", "y");
        assert!(ssr.run(observer.next_batch()).is_none());
    }

    #[test]
    fn settle_runs_spawned_tasks() {
        let ssr = Ssr::default();
        let ran = Rc::new(RefCell::new(vec![]));
        for i in 0..3 {
            let ran = ran.clone();
            ssr.spawn(async move { ran.borrow_mut().push(i) });
        }
        assert!(ran.borrow().is_empty());
        ssr.settle();
        assert_eq!(*ran.borrow(), vec![0, 1, 2]);
    }
}
