//! Declared settings and their default values.
use std::{future::Future, pin::Pin};

use indexmap::IndexMap;

use crate::{Error, Str, value::Value, view::View};

/// A boxed, local future resolving a deferred default.
pub type DeferredValue<V> = Pin<Box<dyn Future<Output = anyhow::Result<Value<V>>>>>;

/// How a declared setting gets its first value.
pub enum Initial<V: View> {
    /// A literal default. Its type decides the setting's [`Kind`](crate::value::Kind).
    Value(Value<V>),
    /// Called once during initialization, unless an attribute or an early
    /// assignment already provides the value.
    Lazy(Box<dyn FnOnce() -> Value<V>>),
    /// Like [`Initial::Lazy`] but resolved in the background. The setting reads
    /// as `Undefined` until the future resolves.
    Deferred(Box<dyn FnOnce() -> DeferredValue<V>>),
}

impl<V: View> std::fmt::Debug for Initial<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Initial::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Initial::Lazy(_) => f.write_str("Lazy(..)"),
            Initial::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl<V: View> Initial<V> {
    pub fn lazy(f: impl FnOnce() -> Value<V> + 'static) -> Self {
        Initial::Lazy(Box::new(f))
    }

    pub fn deferred<F>(f: impl FnOnce() -> F + 'static) -> Self
    where
        F: Future<Output = anyhow::Result<Value<V>>> + 'static,
    {
        Initial::Deferred(Box::new(move || Box::pin(f()) as DeferredValue<V>))
    }

    /// The literal default, if there is one.
    pub fn literal(&self) -> Option<&Value<V>> {
        match self {
            Initial::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A widget's declared settings.
pub enum Defaults<V: View> {
    /// No declared settings.
    Absent,
    /// Bare names, each starting out `Undefined`.
    Names(Vec<Str>),
    /// Names with their defaults.
    Map(IndexMap<Str, Initial<V>>),
    /// A declaration in JSON: `null`, an array of names or an object of
    /// literal defaults.
    Json(serde_json::Value),
}

impl<V: View> Default for Defaults<V> {
    fn default() -> Self {
        Defaults::Absent
    }
}

impl<V: View> std::fmt::Debug for Defaults<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Defaults::Absent => f.write_str("Absent"),
            Defaults::Names(names) => f.debug_tuple("Names").field(names).finish(),
            Defaults::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Defaults::Json(json) => f.debug_tuple("Json").field(json).finish(),
        }
    }
}

impl<V: View> Defaults<V> {
    pub fn names<S: Into<Str>>(names: impl IntoIterator<Item = S>) -> Self {
        Defaults::Names(names.into_iter().map(Into::into).collect())
    }

    /// Start an empty mapping, to be filled with [`Defaults::with`].
    pub fn map() -> Self {
        Defaults::Map(IndexMap::new())
    }

    /// Add one declared setting with a literal default.
    pub fn with(self, name: impl Into<Str>, value: impl Into<Value<V>>) -> Self {
        self.with_initial(name, Initial::Value(value.into()))
    }

    /// Add one declared setting.
    ///
    /// Turns `Absent` and `Names` declarations into a mapping. JSON
    /// declarations are normalized first, so a malformed one stays malformed
    /// and fails in [`Defaults::normalize`].
    pub fn with_initial(self, name: impl Into<Str>, initial: Initial<V>) -> Self {
        let mut map = match self.normalize() {
            Ok(map) => map,
            Err(_) => return malformed(),
        };
        map.insert(name.into(), initial);
        Defaults::Map(map)
    }

    pub fn with_lazy(
        self,
        name: impl Into<Str>,
        f: impl FnOnce() -> Value<V> + 'static,
    ) -> Self {
        self.with_initial(name, Initial::lazy(f))
    }

    pub fn with_deferred<F>(self, name: impl Into<Str>, f: impl FnOnce() -> F + 'static) -> Self
    where
        F: Future<Output = anyhow::Result<Value<V>>> + 'static,
    {
        self.with_initial(name, Initial::deferred(f))
    }

    /// Flatten the declaration into name → initial value.
    pub fn normalize(self) -> Result<IndexMap<Str, Initial<V>>, Error> {
        match self {
            Defaults::Absent => Ok(IndexMap::new()),
            Defaults::Names(names) => Ok(names
                .into_iter()
                .map(|name| (name, Initial::Value(Value::Undefined)))
                .collect()),
            Defaults::Map(map) => Ok(map),
            Defaults::Json(json) => normalize_json(json),
        }
    }
}

fn malformed<V: View>() -> Defaults<V> {
    // Any JSON scalar fails normalization the same way.
    Defaults::Json(serde_json::Value::Bool(false))
}

fn normalize_json<V: View>(json: serde_json::Value) -> Result<IndexMap<Str, Initial<V>>, Error> {
    match json {
        serde_json::Value::Null => Ok(IndexMap::new()),
        serde_json::Value::Array(names) => names
            .into_iter()
            .map(|name| match name {
                serde_json::Value::String(name) => {
                    Ok((Str::from(name), Initial::Value(Value::Undefined)))
                }
                other => Err(Error::MalformedDefaults {
                    found: format!("an array containing {other}").into(),
                }),
            })
            .collect(),
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, value)| (Str::from(name), Initial::Value(Value::from_json(value))))
            .collect()),
        other => Err(Error::MalformedDefaults {
            found: json_type_name(&other).into(),
        }),
    }
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(all(test, feature = "ssr"))]
mod test {
    use serde_json::json;

    use super::*;
    use crate::ssr::Ssr;

    #[test]
    fn names_start_undefined() {
        let map = Defaults::<Ssr>::names(["test", "test2"]).normalize().unwrap();
        assert_eq!(map.keys().map(Str::as_str).collect::<Vec<_>>(), ["test", "test2"]);
        assert!(map.values().all(|i| i.literal() == Some(&Value::Undefined)));
    }

    #[test]
    fn json_declarations() {
        let map = Defaults::<Ssr>::Json(json!({"test": 2, "arr": []}))
            .normalize()
            .unwrap();
        assert_eq!(map["test"].literal(), Some(&Value::Number(2.0)));
        assert!(map["arr"].literal().and_then(Value::as_list).is_some());

        let map = Defaults::<Ssr>::Json(json!(["a", "b"])).normalize().unwrap();
        assert_eq!(map.len(), 2);
        assert!(Defaults::<Ssr>::Json(json!(null)).normalize().unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        let err = Defaults::<Ssr>::Json(json!(42)).normalize().unwrap_err();
        assert!(matches!(err, Error::MalformedDefaults { .. }));
        assert_eq!(
            err.to_string(),
            "defaults must be a list of names, a mapping or absent, found a number"
        );
        let err = Defaults::<Ssr>::Json(json!(["ok", 1])).normalize().unwrap_err();
        assert!(matches!(err, Error::MalformedDefaults { .. }));
        assert!(
            Defaults::<Ssr>::Json(json!("x"))
                .with("y", 1)
                .normalize()
                .is_err()
        );
    }

    #[test]
    fn builder_keeps_declaration_order() {
        let map = Defaults::<Ssr>::names(["first"])
            .with("second", true)
            .with_lazy("third", || Value::from(0))
            .normalize()
            .unwrap();
        assert_eq!(
            map.keys().map(Str::as_str).collect::<Vec<_>>(),
            ["first", "second", "third"]
        );
        assert!(matches!(map["third"], Initial::Lazy(_)));
    }
}
