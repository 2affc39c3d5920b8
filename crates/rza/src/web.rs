//! Widgets in the browser (through web-sys).
//!
//! Elements are plain [`web_sys::Element`]s, changes come from the browser's
//! own `MutationObserver` and tasks run on the page's microtask queue.
use std::rc::Rc;

use wasm_bindgen::{JsCast, JsValue, prelude::Closure};

use crate::{
    Error, Str,
    view::{MutationRecord, View, ViewAttributes, ViewElement, ViewNode, ViewObserver},
};

pub mod prelude {
    pub use super::{Web, WebObserver};
    pub use crate::prelude::*;
}

fn host_error(err: JsValue) -> Error {
    Error::Host(format!("{err:?}"))
}

/// Return the DOM [`web_sys::Document`].
///
/// ## Errors
/// Errs outside of a browser window.
pub fn document() -> Result<web_sys::Document, Error> {
    web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| Error::Host("no document".into()))
}

fn exact_attribute(element: &web_sys::Element, key: &str) -> Option<web_sys::Attr> {
    let attributes = element.attributes();
    (0..attributes.length())
        .filter_map(|i| attributes.item(i))
        .find(|attr| attr.name() == key)
}

impl ViewNode for web_sys::Node {
    fn same_node(&self, other: &Self) -> bool {
        self.is_same_node(Some(other))
    }

    fn parent_node(&self) -> Option<Self> {
        web_sys::Node::parent_node(self)
    }

    fn node_attribute(&self, key: &str) -> Option<Str> {
        let element = self.dyn_ref::<web_sys::Element>()?;
        exact_attribute(element, key).map(|attr| attr.value().into())
    }
}

/// Unlike the DOM's own methods these never lower-case names.
impl ViewAttributes for web_sys::Element {
    fn set_attribute(&self, key: impl AsRef<str>, value: impl AsRef<str>) {
        if let Err(err) = self.set_attribute_ns(None, key.as_ref(), value.as_ref()) {
            log::error!("could not set attribute '{}': {err:?}", key.as_ref());
        }
    }

    fn has_attribute(&self, key: impl AsRef<str>) -> bool {
        exact_attribute(self, key.as_ref()).is_some()
    }

    fn get_attribute(&self, key: impl AsRef<str>) -> Option<Str> {
        exact_attribute(self, key.as_ref()).map(|attr| attr.value().into())
    }

    fn remove_attribute(&self, key: impl AsRef<str>) {
        if let Some(attr) = exact_attribute(self, key.as_ref()) {
            if let Err(err) = self.remove_attribute_node(&attr) {
                log::error!("could not remove attribute '{}': {err:?}", key.as_ref());
            }
        }
    }
}

impl ViewElement for web_sys::Element {
    type Node = web_sys::Node;

    fn as_node(&self) -> web_sys::Node {
        let node: &web_sys::Node = self.as_ref();
        node.clone()
    }

    fn append_child(&self, child: &Self) {
        if let Err(err) = web_sys::Node::append_child(self, child) {
            log::error!("could not append a child to {}: {err:?}", self.tag_name());
        }
    }

    fn remove_child(&self, child: &Self) {
        if let Err(err) = web_sys::Node::remove_child(self, child) {
            log::error!("could not remove a child of {}: {err:?}", self.tag_name());
        }
    }

    fn replace_child(&self, new_child: &Self, old_child: &Self) {
        if let Err(err) = web_sys::Node::replace_child(self, new_child, old_child) {
            log::error!("could not replace a child of {}: {err:?}", self.tag_name());
        }
    }

    fn has_child(&self, child: &Self) -> bool {
        let node: &web_sys::Node = self;
        web_sys::Node::parent_node(child).is_some_and(|parent| parent.is_same_node(Some(node)))
    }

    fn inner_html(&self) -> String {
        web_sys::Element::inner_html(self)
    }

    fn set_inner_html(&self, html: &str) {
        web_sys::Element::set_inner_html(self, html);
    }

    fn shell(&self) -> Option<String> {
        self.shadow_root().map(|root| root.inner_html())
    }

    fn set_shell(&self, html: &str) {
        let root = match self.shadow_root() {
            Some(root) => root,
            None => {
                let init = web_sys::ShadowRootInit::new(web_sys::ShadowRootMode::Open);
                match self.attach_shadow(&init) {
                    Ok(root) => root,
                    Err(err) => {
                        log::error!("could not attach a shadow root: {err:?}");
                        return;
                    }
                }
            }
        };
        root.set_inner_html(html);
    }
}

fn node_list(list: &web_sys::NodeList) -> Vec<web_sys::Node> {
    (0..list.length()).filter_map(|i| list.item(i)).collect()
}

fn convert(record: &web_sys::MutationRecord) -> Option<MutationRecord<web_sys::Node>> {
    let target = record.target()?;
    match record.type_().as_str() {
        "attributes" => Some(MutationRecord::attribute(target, record.attribute_name()?)),
        "characterData" => Some(MutationRecord::character_data(target)),
        "childList" => Some(MutationRecord::child_list(
            target,
            node_list(&record.added_nodes()),
            node_list(&record.removed_nodes()),
        )),
        other => {
            log::warn!("unknown mutation record type '{other}'");
            None
        }
    }
}

type Callback = Closure<dyn FnMut(js_sys::Array, web_sys::MutationObserver)>;

/// A browser `MutationObserver` on one widget's subtree.
///
/// Each callback invocation is one batch.
#[derive(Clone)]
pub struct WebObserver {
    observer: web_sys::MutationObserver,
    rx: async_channel::Receiver<Vec<MutationRecord<web_sys::Node>>>,
    _callback: Rc<Callback>,
}

impl ViewObserver for WebObserver {
    type Node = web_sys::Node;

    async fn next_batch(&self) -> Option<Vec<MutationRecord<web_sys::Node>>> {
        self.rx.recv().await.ok()
    }

    fn take_records(&self) -> Vec<MutationRecord<web_sys::Node>> {
        let mut records = std::iter::from_fn(|| self.rx.try_recv().ok())
            .flatten()
            .collect::<Vec<_>>();
        // records the browser hasn't handed to the callback yet
        records.extend(
            self.observer
                .take_records()
                .iter()
                .filter_map(|record| convert(record.unchecked_ref())),
        );
        records
    }

    fn disconnect(&self) {
        self.observer.disconnect();
        self.rx.close();
    }
}

/// The browser host.
#[derive(Clone, Copy, Default)]
pub struct Web;

impl View for Web {
    type Node = web_sys::Node;
    type Element = web_sys::Element;
    type Observer = WebObserver;

    fn create_element(&self, name: &str) -> Result<web_sys::Element, Error> {
        document()?.create_element(name).map_err(host_error)
    }

    fn observe(&self, element: &web_sys::Element) -> Result<WebObserver, Error> {
        let (tx, rx) = async_channel::unbounded();
        let callback: Callback = Closure::new(move |records: js_sys::Array, _: web_sys::MutationObserver| {
            let batch = records
                .iter()
                .filter_map(|record| convert(record.unchecked_ref()))
                .collect::<Vec<_>>();
            if !batch.is_empty() {
                let _ = tx.try_send(batch);
            }
        });
        let observer = web_sys::MutationObserver::new(callback.as_ref().unchecked_ref())
            .map_err(host_error)?;
        let init = web_sys::MutationObserverInit::new();
        init.set_attributes(true);
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_character_data(true);
        observer
            .observe_with_options(element, &init)
            .map_err(host_error)?;
        log::trace!("observing {}", element.tag_name());
        Ok(WebObserver {
            observer,
            rx,
            _callback: Rc::new(callback),
        })
    }

    fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        wasm_bindgen_futures::spawn_local(task);
    }
}
