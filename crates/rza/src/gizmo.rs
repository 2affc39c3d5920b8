//! Live widget instances.
//!
//! A [`Gizmo`] binds a [`Widget`] definition to one host element. It owns the
//! widget's settings, keeps them in sync with the element's attributes and
//! drives the render cycle:
//!
//! * creation attaches the widget's shell right away and defers everything
//!   else to a task, so values assigned right after creation still win over
//!   declared defaults
//! * assignments coerce, resolve [`Gizmo::wait_for`] waiters and request a
//!   render
//! * requests made in one synchronous stretch share one render, and a request
//!   arriving while a render runs makes that render stale, so it's discarded
//!   and run again
//! * rendered output goes into one marked output node that the change
//!   observer ignores
use std::{
    future::Future,
    rc::{Rc, Weak},
};

use indexmap::{IndexMap, IndexSet};

use crate::{
    Error, Str,
    defaults::{DeferredValue, Initial},
    observer::{dispatch, watch},
    schedule::{Request, Schedule, Settle},
    sync::Shared,
    value::{Kind, Value},
    view::{MutationRecord, View, ViewAttributes, ViewElement, ViewObserver},
    waiter::{WaitQueue, Waiters},
    widget::{Config, Output, Widget},
};

/// A frozen copy of a widget's settings, handed to its render function.
///
/// Lists are shared with the live settings, everything else is a copy.
pub struct Settings<V: View> {
    values: IndexMap<Str, Value<V>>,
}

impl<V: View> Clone for Settings<V> {
    fn clone(&self) -> Self {
        Settings {
            values: self.values.clone(),
        }
    }
}

impl<V: View> Default for Settings<V> {
    fn default() -> Self {
        Settings {
            values: IndexMap::new(),
        }
    }
}

impl<V: View> std::fmt::Debug for Settings<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl<V: View> FromIterator<(Str, Value<V>)> for Settings<V> {
    fn from_iter<T: IntoIterator<Item = (Str, Value<V>)>>(iter: T) -> Self {
        Settings {
            values: iter.into_iter().collect(),
        }
    }
}

impl<V: View> Settings<V> {
    /// The value of `name`, `Undefined` if there is no such setting.
    pub fn get(&self, name: &str) -> Value<V> {
        self.values.get(name).cloned().unwrap_or_default()
    }

    pub fn value(&self, name: &str) -> Option<&Value<V>> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Settings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&Str, &Value<V>)> {
        self.values.iter()
    }
}

/// One installed setting.
struct Entry<V: View> {
    kind: Kind,
    value: Value<V>,
}

impl<V: View> Entry<V> {
    fn new(kind: Kind) -> Self {
        Entry {
            kind,
            value: Value::Undefined,
        }
    }
}

struct State<V: View> {
    /// Settings are installed, assignments go straight through them.
    bound: bool,
    /// Renders may run and mutation batches are handled.
    initialized: bool,
    connected: bool,
    initials: IndexMap<Str, Initial<V>>,
    settings: IndexMap<Str, Entry<V>>,
    // Values of names that aren't settings. They never render or reflect.
    properties: IndexMap<Str, Value<V>>,
    // Assignments and additions made before the settings were installed.
    early: IndexMap<Str, Value<V>>,
    early_names: IndexSet<Str>,
    schedule: Schedule,
    waiters: Waiters<Value<V>>,
    next_render: WaitQueue<V::Element>,
    output: Option<V::Element>,
    observer: Option<V::Observer>,
}

struct Inner<V: View, W: Widget<V>> {
    this: Weak<Inner<V, W>>,
    /// Handed to list settings, which call it when changed in place.
    list_watcher: Rc<dyn Fn()>,
    view: V,
    element: V::Element,
    widget: W,
    config: Config,
    state: Shared<State<V>>,
}

impl<V: View, W: Widget<V>> Drop for Inner<V, W> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<V: View, W: Widget<V>> Inner<V, W> {
    fn is_declared(&self, name: &str) -> bool {
        self.state.get().settings.contains_key(name)
    }

    /// Store `value` in an installed setting.
    fn assign(&self, name: &str, value: Value<V>) {
        let (value, previous) = {
            let mut guard = self.state.get_mut();
            let state = &mut *guard;
            let Some(entry) = state.settings.get_mut(name) else {
                log::warn!("assignment to undeclared setting '{name}' ignored");
                return;
            };
            let value = entry.kind.coerce(value);
            let previous = std::mem::replace(&mut entry.value, value.clone());
            if value.is_defined() {
                let resolved = state.waiters.resolve(name, &value);
                if resolved > 0 {
                    log::trace!("'{name}' resolved {resolved} waiters");
                }
            }
            (value, previous)
        };
        if let Value::List(old) = &previous {
            let kept = matches!(&value, Value::List(list) if list.ptr_eq(old));
            if !kept {
                old.unwatch(&self.list_watcher);
            }
        }
        if let Value::List(list) = &value {
            list.watch(&self.list_watcher);
        }
        log::debug!("'{name}' = {value}");
        self.request_render();
    }

    fn assign_from_attribute(&self, name: &str, attribute: Option<&str>) {
        let kind = self.state.get().settings.get(name).map(|entry| entry.kind);
        match kind {
            Some(kind) => self.assign(name, kind.from_attribute(attribute)),
            None => log::trace!("attribute '{name}' is not a setting"),
        }
    }

    fn get(&self, name: &str) -> Value<V> {
        let state = self.state.get();
        let value = if state.bound {
            match state.settings.get(name) {
                Some(entry) => Some(entry.value.clone()),
                None => state.properties.get(name).cloned(),
            }
        } else {
            state.early.get(name).cloned()
        };
        value.unwrap_or_default()
    }

    fn set(&self, name: &str, value: Value<V>) {
        if !self.state.get().bound {
            self.state.get_mut().early.insert(name.to_owned().into(), value);
            return;
        }
        if !self.is_declared(name) {
            log::debug!("'{name}' is not a setting, keeping it as a plain property");
            self.state.get_mut().properties.insert(name.to_owned().into(), value);
            return;
        }
        self.assign(name, value);
    }

    fn add_setting(&self, name: &str, value: Value<V>) {
        if !self.state.get().bound {
            let mut state = self.state.get_mut();
            state.early_names.insert(name.to_owned().into());
            if value.is_defined() {
                state.early.insert(name.to_owned().into(), value);
            }
            return;
        }
        if !self.is_declared(name) {
            let property = {
                let mut state = self.state.get_mut();
                state
                    .settings
                    .insert(name.to_owned().into(), Entry::new(Kind::Untyped));
                state.properties.shift_remove(name)
            };
            log::debug!("added setting '{name}'");
            if let Some(attribute) = self.element.get_attribute(name) {
                self.assign_from_attribute(name, Some(attribute.as_str()));
            }
            // a plain property becomes the setting's value
            if let Some(property) = property.filter(Value::is_defined) {
                self.assign(name, property);
            }
        }
        if value.is_defined() {
            self.assign(name, value);
        }
    }

    fn wait_for(&self, name: &str) -> impl Future<Output = Result<Value<V>, Error>> + use<V, W> {
        if self.state.get().bound && !self.is_declared(name) {
            self.add_setting(name, Value::Undefined);
        }
        let mut guard = self.state.get_mut();
        let state = &mut *guard;
        let mut waiting = None;
        let ready = if !state.connected {
            Some(Err(Error::Disconnected))
        } else {
            let current = if state.bound {
                state.settings.get(name).map(|entry| entry.value.clone())
            } else {
                state.early_names.insert(name.to_owned().into());
                state.early.get(name).cloned()
            };
            match current.filter(Value::is_defined) {
                Some(value) => Some(Ok(value)),
                None => {
                    log::trace!("waiting for '{name}'");
                    waiting = Some(state.waiters.wait(name.to_owned().into()));
                    None
                }
            }
        };
        async move {
            match (ready, waiting) {
                (Some(ready), _) => ready,
                (None, Some(waiting)) => waiting.await,
                (None, None) => Err(Error::Disconnected),
            }
        }
    }

    fn next_render(&self) -> impl Future<Output = Result<V::Element, Error>> + use<V, W> {
        let mut state = self.state.get_mut();
        let waiting = state.connected.then(|| state.next_render.wait());
        async move {
            match waiting {
                Some(waiting) => waiting.await,
                None => Err(Error::Disconnected),
            }
        }
    }

    fn request_render(&self) {
        let request = {
            let mut state = self.state.get_mut();
            if !state.initialized || !state.connected {
                log::trace!("render request before initialization");
                return;
            }
            state.schedule.request()
        };
        match request {
            Request::Arm => {
                log::trace!("render scheduled");
                let this = self.this.clone();
                self.view.spawn(async move {
                    if let Some(inner) = this.upgrade() {
                        inner.render_cycle().await;
                    }
                });
            }
            Request::Pending => log::trace!("render already scheduled"),
            Request::Coalesced => log::trace!("render requested mid-render, will rerender"),
        }
    }

    fn ensure_output(&self) -> Result<V::Element, Error> {
        let existing = self.state.get().output.clone();
        if let Some(output) = existing {
            return Ok(output);
        }
        let output = self.view.create_element(&self.config.output_tag)?;
        output.set_attribute(&self.config.slot_attribute, &self.config.slot_name);
        self.state.get_mut().output = Some(output.clone());
        Ok(output)
    }

    fn snapshot(&self) -> Settings<V> {
        self.state
            .get()
            .settings
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value.clone()))
            .collect()
    }

    async fn render_cycle(&self) {
        {
            let mut state = self.state.get_mut();
            if !state.connected {
                return;
            }
            state.schedule.begin();
        }

        let output = match self.ensure_output() {
            Ok(output) => output,
            Err(err) => {
                log::error!("could not create the output node: {err}");
                self.discard_records();
                self.state.get_mut().schedule.fail();
                return;
            }
        };
        // the content snapshot must not include the previous output
        if self.element.has_child(&output) {
            self.element.remove_child(&output);
        }
        let content = self.element.inner_html();
        self.element.append_child(&output);

        let settings = self.snapshot();
        log::debug!("rendering with {} settings", settings.len());
        let result = self.widget.render(settings, content).await;

        match result {
            Err(err) => {
                self.discard_records();
                let rerender = self.state.get_mut().schedule.fail();
                log::error!("{}", Error::Render(err));
                if rerender {
                    self.request_render();
                }
            }
            Ok(rendered) => {
                self.discard_records();
                let settle = self.state.get_mut().schedule.settle();
                match settle {
                    Settle::Stale => {
                        log::debug!("settings changed while rendering, discarding the result");
                        self.request_render();
                    }
                    Settle::Fresh => {
                        self.apply(rendered);
                        self.discard_records();
                        let mut guard = self.state.get_mut();
                        let state = &mut *guard;
                        state.schedule.finish();
                        if let Some(output) = state.output.as_ref() {
                            let resolved = state.next_render.resolve(output);
                            log::trace!("render resolved {resolved} waiters");
                        }
                        log::debug!("render finished");
                    }
                }
            }
        }
    }

    fn apply(&self, rendered: Output<V>) {
        let Some(current) = self.state.get().output.clone() else {
            return;
        };
        match rendered {
            Output::Keep => log::trace!("output left as is"),
            Output::Empty => current.set_inner_html(""),
            Output::Markup(markup) => current.set_inner_html(&markup),
            Output::Element(element) if element.same_element(&current) => {
                log::trace!("render returned the current output node");
            }
            Output::Element(element) => {
                element.set_attribute(&self.config.slot_attribute, &self.config.slot_name);
                if self.element.has_child(&current) {
                    self.element.replace_child(&element, &current);
                } else {
                    self.element.append_child(&element);
                }
                self.state.get_mut().output = Some(element);
                log::debug!("output node replaced");
            }
        }
    }

    /// Drop whatever the observer saw while a render ran, the render's own
    /// changes included.
    fn discard_records(&self) {
        let observer = self.state.get().observer.clone();
        if let Some(observer) = observer {
            let records = observer.take_records();
            if !records.is_empty() {
                log::trace!("discarding {} records made while rendering", records.len());
            }
        }
    }

    fn on_mutations(&self, records: Vec<MutationRecord<V::Node>>) {
        {
            let state = self.state.get();
            if !state.bound || state.schedule.is_rendering() {
                log::trace!("discarding {} mutation records", records.len());
                return;
            }
        }
        let Some((attributes, content)) = dispatch(&records, &self.element, &self.config) else {
            return;
        };
        for (name, value) in attributes.iter() {
            self.assign_from_attribute(name, value.as_deref());
        }
        if content {
            log::trace!("content changed");
            self.request_render();
        }
    }

    /// Install the declared settings and start observing.
    ///
    /// Returns the deferred defaults that still need resolving.
    fn bind(&self) -> Vec<(Str, DeferredValue<V>)> {
        let (initials, mut early, early_names) = {
            let mut state = self.state.get_mut();
            if !state.connected {
                return vec![];
            }
            (
                std::mem::take(&mut state.initials),
                std::mem::take(&mut state.early),
                std::mem::take(&mut state.early_names),
            )
        };

        let mut deferred = vec![];
        let mut presets = vec![];
        for (name, initial) in initials {
            let attribute = self.element.get_attribute(&name);
            let preset = early.shift_remove(&name);
            let provided = attribute.is_some() || preset.is_some();
            let (kind, value) = match initial {
                Initial::Value(value) => (Kind::of(&value), value),
                Initial::Lazy(_) | Initial::Deferred(_) if provided => {
                    (Kind::Untyped, Value::Undefined)
                }
                Initial::Lazy(f) => (Kind::Untyped, f()),
                Initial::Deferred(f) => {
                    deferred.push((name.clone(), f()));
                    (Kind::Untyped, Value::Undefined)
                }
            };
            self.state
                .get_mut()
                .settings
                .insert(name.clone(), Entry::new(kind));
            self.assign(&name, value);
            if let Some(attribute) = attribute {
                self.assign(&name, kind.from_attribute(Some(attribute.as_str())));
            }
            if let Some(preset) = preset {
                presets.push((name, preset));
            }
        }

        self.state.get_mut().bound = true;
        for name in early_names {
            self.add_setting(&name, Value::Undefined);
        }
        for (name, value) in presets.into_iter().chain(early) {
            self.set(&name, value);
        }

        match self.view.observe(&self.element) {
            Ok(observer) => {
                self.state.get_mut().observer = Some(observer.clone());
                let this = self.this.clone();
                self.view.spawn(watch(observer, move |records| match this.upgrade() {
                    Some(inner) => {
                        inner.on_mutations(records);
                        true
                    }
                    None => false,
                }));
            }
            Err(err) => log::error!("could not observe the widget: {err}"),
        }

        deferred
    }

    async fn initialize(this: Weak<Self>) {
        let deferred = match this.upgrade() {
            Some(inner) => inner.bind(),
            None => return,
        };
        if !deferred.is_empty() {
            log::trace!("waiting on {} deferred defaults", deferred.len());
            let (names, futures): (Vec<_>, Vec<_>) = deferred.into_iter().unzip();
            let results = futures::future::join_all(futures).await;
            let Some(inner) = this.upgrade() else {
                return;
            };
            for (name, result) in names.into_iter().zip(results) {
                match result {
                    Ok(value) => inner.assign(&name, value),
                    Err(err) => log::error!("deferred default of '{name}' failed: {err:#}"),
                }
            }
        }
        if let Some(inner) = this.upgrade() {
            inner.start();
        }
    }

    fn start(&self) {
        let count = {
            let mut state = self.state.get_mut();
            if !state.connected {
                return;
            }
            state.initialized = true;
            state.settings.len()
        };
        log::debug!("initialized with {count} settings");
        self.request_render();
    }

    fn disconnect(&self) {
        let observer = {
            let mut guard = self.state.get_mut();
            let state = &mut *guard;
            if !state.connected {
                return;
            }
            state.connected = false;
            state.waiters.reject_all(|| Error::Disconnected);
            state.next_render.reject(|| Error::Disconnected);
            state.observer.take()
        };
        if let Some(observer) = observer {
            observer.disconnect();
        }
        log::debug!("disconnected");
    }
}

/// A live widget: a [`Widget`] definition bound to a host element.
///
/// Clones are handles to the same widget. When the last one is dropped the
/// widget disconnects, see [`Gizmo::disconnect`].
pub struct Gizmo<V: View, W: Widget<V>> {
    inner: Rc<Inner<V, W>>,
}

impl<V: View, W: Widget<V>> Clone for Gizmo<V, W> {
    fn clone(&self) -> Self {
        Gizmo {
            inner: self.inner.clone(),
        }
    }
}

impl<V: View, W: Widget<V>> Gizmo<V, W> {
    /// Bind `widget` to `element`.
    ///
    /// The shell is attached immediately. Settings are installed and the first
    /// render requested once the host runs the widget's tasks.
    ///
    /// ## Errors
    /// Errs if the widget's defaults are malformed.
    pub fn new(view: V, element: V::Element, widget: W) -> Result<Self, Error> {
        let initials = widget.defaults().normalize()?;
        let config = widget.config();
        element.set_shell(&widget.shell());
        let inner = Rc::new_cyclic(|this: &Weak<Inner<V, W>>| Inner {
            this: this.clone(),
            list_watcher: {
                let this = this.clone();
                Rc::new(move || {
                    if let Some(inner) = this.upgrade() {
                        log::trace!("list setting changed in place");
                        inner.request_render();
                    }
                })
            },
            view,
            element,
            widget,
            config,
            state: Shared::new(State {
                bound: false,
                initialized: false,
                connected: true,
                initials,
                settings: IndexMap::new(),
                properties: IndexMap::new(),
                early: IndexMap::new(),
                early_names: IndexSet::new(),
                schedule: Schedule::default(),
                waiters: Waiters::default(),
                next_render: WaitQueue::default(),
                output: None,
                observer: None,
            }),
        });
        inner.view.spawn(Inner::initialize(Rc::downgrade(&inner)));
        Ok(Gizmo { inner })
    }

    /// Create an element with the tag `name` and bind `widget` to it.
    pub fn create(view: V, name: &str, widget: W) -> Result<Self, Error> {
        let element = view.create_element(name)?;
        Self::new(view, element, widget)
    }

    pub fn element(&self) -> &V::Element {
        &self.inner.element
    }

    pub fn widget(&self) -> &W {
        &self.inner.widget
    }

    pub fn view(&self) -> &V {
        &self.inner.view
    }

    /// The current value of a setting, `Undefined` if unknown.
    pub fn get(&self, name: &str) -> Value<V> {
        self.inner.get(name)
    }

    /// Assign a setting.
    ///
    /// Before initialization the value is kept and applied over the declared
    /// default. A name that isn't a setting is stored as a plain property: it
    /// can be read back but doesn't render or follow its attribute until
    /// [`Gizmo::add_setting`] or [`Gizmo::wait_for`] makes it a setting.
    pub fn set(&self, name: &str, value: impl Into<Value<V>>) {
        self.inner.set(name, value.into());
    }

    /// A handle to one setting.
    pub fn setting(&self, name: impl Into<Str>) -> Setting<'_, V, W> {
        Setting {
            gizmo: self,
            name: name.into(),
        }
    }

    /// The type of an installed setting.
    pub fn kind(&self, name: &str) -> Option<Kind> {
        self.inner.state.get().settings.get(name).map(|entry| entry.kind)
    }

    /// Install an untyped setting, picking up a matching attribute.
    ///
    /// Adding an existing setting leaves it as is. Either way a defined
    /// `value` is then assigned, `Value::Undefined` assigns nothing.
    pub fn add_setting(&self, name: &str, value: impl Into<Value<V>>) {
        self.inner.add_setting(name, value.into());
    }

    /// Resolves with the value of `name` once it is defined, right away if it
    /// already is. Waiting on an unknown name adds it.
    ///
    /// ## Errors
    /// Errs with [`Error::Disconnected`] if the widget disconnects first.
    pub fn wait_for(&self, name: &str) -> impl Future<Output = Result<Value<V>, Error>> + use<V, W> {
        self.inner.wait_for(name)
    }

    /// Resolves with the output node when the next render completes.
    ///
    /// ## Errors
    /// Errs with [`Error::Disconnected`] if the widget disconnects first.
    pub fn next_render(&self) -> impl Future<Output = Result<V::Element, Error>> + use<V, W> {
        self.inner.next_render()
    }

    /// A snapshot of all installed settings.
    pub fn settings(&self) -> Settings<V> {
        self.inner.snapshot()
    }

    /// The output node, once the first render has started.
    pub fn output(&self) -> Option<V::Element> {
        self.inner.state.get().output.clone()
    }

    pub fn shell(&self) -> Option<String> {
        self.inner.element.shell()
    }

    /// Replace the shell markup.
    pub fn set_shell(&self, html: &str) {
        self.inner.element.set_shell(html);
    }

    /// Whether settings are installed and renders may run.
    pub fn is_initialized(&self) -> bool {
        self.inner.state.get().initialized
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.get().connected
    }

    /// Stop observing and rendering.
    ///
    /// Pending [`Gizmo::wait_for`] and [`Gizmo::next_render`] futures resolve
    /// to [`Error::Disconnected`]. Settings stay readable and writable.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    pub fn downgrade(&self) -> WeakGizmo<V, W> {
        WeakGizmo {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Attribute access on the widget's element, case-sensitive.
impl<V: View, W: Widget<V>> ViewAttributes for Gizmo<V, W> {
    fn set_attribute(&self, key: impl AsRef<str>, value: impl AsRef<str>) {
        self.inner.element.set_attribute(key, value);
    }

    fn has_attribute(&self, key: impl AsRef<str>) -> bool {
        self.inner.element.has_attribute(key)
    }

    fn get_attribute(&self, key: impl AsRef<str>) -> Option<Str> {
        self.inner.element.get_attribute(key)
    }

    fn remove_attribute(&self, key: impl AsRef<str>) {
        self.inner.element.remove_attribute(key);
    }
}

/// A non-owning [`Gizmo`], eg. for a widget to reach its own instance from a
/// render.
pub struct WeakGizmo<V: View, W: Widget<V>> {
    inner: Weak<Inner<V, W>>,
}

impl<V: View, W: Widget<V>> Clone for WeakGizmo<V, W> {
    fn clone(&self) -> Self {
        WeakGizmo {
            inner: self.inner.clone(),
        }
    }
}

impl<V: View, W: Widget<V>> Default for WeakGizmo<V, W> {
    fn default() -> Self {
        WeakGizmo { inner: Weak::new() }
    }
}

impl<V: View, W: Widget<V>> WeakGizmo<V, W> {
    pub fn upgrade(&self) -> Option<Gizmo<V, W>> {
        self.inner.upgrade().map(|inner| Gizmo { inner })
    }
}

/// Get/set access to one named setting of a [`Gizmo`].
pub struct Setting<'a, V: View, W: Widget<V>> {
    gizmo: &'a Gizmo<V, W>,
    name: Str,
}

impl<V: View, W: Widget<V>> Setting<'_, V, W> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> Value<V> {
        self.gizmo.get(&self.name)
    }

    pub fn set(&self, value: impl Into<Value<V>>) {
        self.gizmo.set(&self.name, value);
    }

    pub fn kind(&self) -> Option<Kind> {
        self.gizmo.kind(&self.name)
    }

    pub fn wait(&self) -> impl Future<Output = Result<Value<V>, Error>> + use<V, W> {
        self.gizmo.wait_for(&self.name)
    }
}
