//! Typed setting values and their coercion from strings and attributes.
use std::rc::Rc;

use crate::{
    Str,
    sync::Shared,
    view::{View, ViewElement},
};

/// The value of one setting.
///
/// A setting's type is decided by its declared default (see [`Kind`]); the
/// value itself can always be any of these variants.
pub enum Value<V: View> {
    /// Not yet defined. Readiness waiters keep waiting.
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(Str),
    /// An array whose in-place mutations schedule a render.
    List(List<V>),
    /// Any other structured data.
    Json(serde_json::Value),
    /// A host element, eg. one to return from a render function.
    Element(V::Element),
}

impl<V: View> Clone for Value<V> {
    fn clone(&self) -> Self {
        match self {
            Value::Undefined => Value::Undefined,
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Number(n) => Value::Number(*n),
            Value::Text(s) => Value::Text(s.clone()),
            Value::List(l) => Value::List(l.clone()),
            Value::Json(j) => Value::Json(j.clone()),
            Value::Element(el) => Value::Element(el.clone()),
        }
    }
}

impl<V: View> Default for Value<V> {
    fn default() -> Self {
        Value::Undefined
    }
}

impl<V: View> PartialEq for Value<V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b) || *a.items.get() == *b.items.get(),
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Element(a), Value::Element(b)) => a.same_element(b),
            _ => false,
        }
    }
}

impl<V: View> std::fmt::Debug for Value<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Value::List(l) => f.debug_tuple("List").field(l).finish(),
            Value::Json(j) => f.debug_tuple("Json").field(j).finish(),
            Value::Element(_) => f.write_str("Element(..)"),
        }
    }
}

/// Renders values the way they read inside markup: integral numbers without a
/// fraction, lists comma separated, undefined as `undefined`.
impl<V: View> std::fmt::Display for Value<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Text(s) => f.write_str(s),
            Value::List(l) => {
                for (i, item) in l.items.get().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Json(j) => write!(f, "{j}"),
            Value::Element(_) => f.write_str("[element]"),
        }
    }
}

impl<V: View> Value<V> {
    pub fn is_defined(&self) -> bool {
        !matches!(self, Value::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List<V>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&V::Element> {
        match self {
            Value::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::List(_) => "array",
            Value::Json(_) => "object",
            Value::Element(_) => "element",
        }
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.into()),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            obj @ serde_json::Value::Object(_) => Value::Json(obj),
        }
    }

    /// Elements have no JSON form and become `null`, as does `Undefined`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Element(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.to_string()),
            Value::List(l) => {
                serde_json::Value::Array(l.items.get().iter().map(Value::to_json).collect())
            }
            Value::Json(j) => j.clone(),
        }
    }
}

impl<V: View> From<bool> for Value<V> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<V: View> From<f64> for Value<V> {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl<V: View> From<i32> for Value<V> {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl<V: View> From<u32> for Value<V> {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl<V: View> From<&'static str> for Value<V> {
    fn from(s: &'static str) -> Self {
        Value::Text(s.into())
    }
}

impl<V: View> From<String> for Value<V> {
    fn from(s: String) -> Self {
        Value::Text(s.into())
    }
}

impl<V: View> From<Str> for Value<V> {
    fn from(s: Str) -> Self {
        Value::Text(s)
    }
}

impl<V: View> From<List<V>> for Value<V> {
    fn from(l: List<V>) -> Self {
        Value::List(l)
    }
}

impl<V: View> From<Vec<Value<V>>> for Value<V> {
    fn from(items: Vec<Value<V>>) -> Self {
        Value::List(List::from(items))
    }
}

impl<V: View> From<serde_json::Value> for Value<V> {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl<V: View, T: Into<Value<V>>> From<Option<T>> for Value<V> {
    fn from(t: Option<T>) -> Self {
        t.map(Into::into).unwrap_or(Value::Undefined)
    }
}

/// A shared array.
///
/// Clones share the same items. Once a list is assigned to a setting, every
/// mutation through these methods asks the widgets holding it to render.
pub struct List<V: View> {
    items: Shared<Vec<Value<V>>>,
    watchers: Shared<Vec<Rc<dyn Fn()>>>,
}

impl<V: View> Clone for List<V> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            watchers: self.watchers.clone(),
        }
    }
}

impl<V: View> Default for List<V> {
    fn default() -> Self {
        Self {
            items: Shared::new(vec![]),
            watchers: Shared::new(vec![]),
        }
    }
}

impl<V: View> std::fmt::Debug for List<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.items.get().iter()).finish()
    }
}

impl<V: View> From<Vec<Value<V>>> for List<V> {
    fn from(items: Vec<Value<V>>) -> Self {
        Self {
            items: Shared::new(items),
            watchers: Shared::new(vec![]),
        }
    }
}

impl<V: View> FromIterator<Value<V>> for List<V> {
    fn from_iter<T: IntoIterator<Item = Value<V>>>(iter: T) -> Self {
        List::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<V: View> List<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.items.ptr_eq(&other.items)
    }

    pub fn len(&self) -> usize {
        self.items.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.get().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value<V>> {
        self.items.get().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<Value<V>> {
        self.items.get().clone()
    }

    pub fn push(&self, item: impl Into<Value<V>>) {
        self.update(|items| items.push(item.into()));
    }

    pub fn pop(&self) -> Option<Value<V>> {
        self.update(Vec::pop)
    }

    pub fn insert(&self, index: usize, item: impl Into<Value<V>>) {
        self.update(|items| items.insert(index.min(items.len()), item.into()));
    }

    pub fn remove(&self, index: usize) -> Option<Value<V>> {
        self.update(|items| (index < items.len()).then(|| items.remove(index)))
    }

    /// Replace the item at `index`, growing the list with `Undefined` if needed.
    pub fn set(&self, index: usize, item: impl Into<Value<V>>) {
        self.update(|items| {
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            items[index] = item.into();
        });
    }

    pub fn clear(&self) {
        self.update(Vec::clear);
    }

    /// Mutate the items in place, then notify the widgets holding the list.
    pub fn update<T>(&self, f: impl FnOnce(&mut Vec<Value<V>>) -> T) -> T {
        let t = f(&mut self.items.get_mut());
        let watchers = self.watchers.get().clone();
        for on_change in watchers {
            on_change();
        }
        t
    }

    pub(crate) fn watch(&self, on_change: &Rc<dyn Fn()>) {
        let mut watchers = self.watchers.get_mut();
        if !watchers.iter().any(|w| Rc::ptr_eq(w, on_change)) {
            watchers.push(on_change.clone());
        }
    }

    pub(crate) fn unwatch(&self, on_change: &Rc<dyn Fn()>) {
        self.watchers.get_mut().retain(|w| !Rc::ptr_eq(w, on_change));
    }
}

/// The type of a setting, decided by its declared default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// No typed default. Values are stored as given.
    Untyped,
    /// A boolean default, which enables `"true"`/`"false"` coercion and
    /// presence toggling from attributes.
    Boolean { default: bool },
}

impl Kind {
    pub fn of<V: View>(default: &Value<V>) -> Self {
        match default {
            Value::Bool(default) => Kind::Boolean { default: *default },
            _ => Kind::Untyped,
        }
    }

    /// Coercion applied to every assignment.
    pub fn coerce<V: View>(&self, value: Value<V>) -> Value<V> {
        match (self, value) {
            (Kind::Boolean { .. }, Value::Text(s)) if s == "true" => Value::Bool(true),
            (Kind::Boolean { .. }, Value::Text(s)) if s == "false" => Value::Bool(false),
            (_, value) => value,
        }
    }

    /// The value an attribute stands for.
    ///
    /// A boolean setting present with anything other than `"true"` or
    /// `"false"` (including a bare attribute) is the negation of its default,
    /// and an absent one is its default.
    pub fn from_attribute<V: View>(&self, attribute: Option<&str>) -> Value<V> {
        match (self, attribute) {
            (Kind::Boolean { default }, None) => Value::Bool(*default),
            (Kind::Boolean { .. }, Some("true")) => Value::Bool(true),
            (Kind::Boolean { .. }, Some("false")) => Value::Bool(false),
            (Kind::Boolean { default }, Some(_)) => Value::Bool(!*default),
            (_, None) => Value::Null,
            (kind, Some(s)) => kind.coerce(Value::Text(s.to_owned().into())),
        }
    }
}

#[cfg(all(test, feature = "ssr"))]
mod test {
    use super::*;
    use crate::ssr::Ssr;

    type Val = Value<Ssr>;

    #[test]
    fn boolean_attribute_coercion() {
        let flip_false = Kind::Boolean { default: true };
        let flip_true = Kind::Boolean { default: false };

        assert_eq!(flip_false.from_attribute::<Ssr>(Some("")), Val::Bool(false));
        assert_eq!(flip_true.from_attribute::<Ssr>(Some("")), Val::Bool(true));
        assert_eq!(flip_true.from_attribute::<Ssr>(Some("yes")), Val::Bool(true));
        assert_eq!(flip_true.from_attribute::<Ssr>(Some("false")), Val::Bool(false));
        assert_eq!(flip_false.from_attribute::<Ssr>(Some("true")), Val::Bool(true));
        assert_eq!(flip_false.from_attribute::<Ssr>(None), Val::Bool(true));
        assert_eq!(flip_true.from_attribute::<Ssr>(None), Val::Bool(false));
    }

    #[test]
    fn string_literals_only_coerce_typed_settings() {
        let boolean = Kind::Boolean { default: false };
        assert_eq!(boolean.coerce(Val::from("true")), Val::Bool(true));
        assert_eq!(boolean.coerce(Val::from("nope")), Val::from("nope"));
        assert_eq!(Kind::Untyped.coerce(Val::from("true")), Val::from("true"));
        assert_eq!(Kind::Untyped.coerce(Val::from(" 5 ")), Val::from(" 5 "));
    }

    #[test]
    fn untyped_attributes_keep_their_text() {
        assert_eq!(Kind::Untyped.from_attribute::<Ssr>(Some("5")), Val::from("5"));
        assert_eq!(Kind::Untyped.from_attribute::<Ssr>(None), Val::Null);
        assert_eq!(Kind::of(&Val::from(2)), Kind::Untyped);
        assert_eq!(Kind::of(&Val::from(2)).from_attribute::<Ssr>(Some("007")), Val::from("007"));
    }

    #[test]
    fn display_reads_like_markup() {
        assert_eq!(Val::from(2).to_string(), "2");
        assert_eq!(Val::from(2.5).to_string(), "2.5");
        assert_eq!(Val::Undefined.to_string(), "undefined");
        let list: Val = vec![Val::from(1), Val::from("a")].into();
        assert_eq!(list.to_string(), "1,a");
    }

    #[test]
    fn list_mutations_notify() {
        let count = Rc::new(std::cell::Cell::new(0));
        let list = List::<Ssr>::new();
        list.push(1);
        assert_eq!(count.get(), 0);
        let on_change: Rc<dyn Fn()> = Rc::new({
            let count = count.clone();
            move || count.set(count.get() + 1)
        });
        list.watch(&on_change);
        list.watch(&on_change);
        let alias = list.clone();
        alias.push(2);
        alias.set(4, "x");
        assert_eq!(list.remove(9), None);
        assert_eq!(count.get(), 3);
        assert_eq!(list.len(), 5);
        assert_eq!(list.get(3), Some(Val::Undefined));

        list.unwatch(&on_change);
        list.push(3);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn json_round_trip() {
        let json = serde_json::json!({"a": [1, true, "x"]});
        let value = Val::from_json(json.clone());
        assert_eq!(value.to_json(), json);
        let list = Val::from_json(serde_json::json!([1, "b"]));
        assert_eq!(list.as_list().map(List::len), Some(2));
    }
}
