//! Self-contained widgets from typed settings and a render function.
//!
//! ## Impetus
//!
//! A widget author should only have to say two things: which settings the
//! widget has (with their defaults) and how to turn those settings into
//! markup. Everything else a widget on a live document needs is the same for
//! every widget:
//!
//! * attributes on the widget's element turn into typed settings
//! * changing a setting, an attribute or the widget's content re-renders,
//!   and many changes at once re-render once
//! * the widget's own output must never look like a content change, or it
//!   would render forever
//! * consumers need a way to wait until a setting has a value
//!
//! ## Strategy
//!
//! A [`Widget`](widget::Widget) is the author's half: defaults, a render
//! function and a shell. A [`Gizmo`](gizmo::Gizmo) is the other half, binding a
//! widget to one element of some host and running it.
//!
//! Hosts are abstracted by the traits in [`view`], so the same widget runs in
//! the browser (the `web` feature) and in an in-memory DOM that serializes to
//! HTML (the `ssr` feature, on by default), which is also what the tests use.
//!
//! ```rust
//! # #[cfg(feature = "ssr")]
//! # {
//! use rza::{prelude::*, ssr::prelude::*};
//!
//! struct Greeting;
//!
//! impl Widget<Ssr> for Greeting {
//!     fn defaults(&self) -> Defaults<Ssr> {
//!         Defaults::map().with("name", "world")
//!     }
//!
//!     async fn render(&self, settings: Settings<Ssr>, _: String) -> anyhow::Result<Output<Ssr>> {
//!         Ok(format!("<p>hello {}</p>", settings.get("name")).into())
//!     }
//! }
//!
//! let ssr = Ssr::default();
//! let gizmo = Gizmo::create(ssr.clone(), "hello-world", Greeting).unwrap();
//! gizmo.set_attribute("name", "rza");
//! let output = ssr.run(gizmo.next_render()).unwrap();
//! assert_eq!(output.inner_html(), "<p>hello rza</p>");
//! # }
//! ```
pub mod defaults;
pub mod error;
pub mod gizmo;
pub mod observer;
pub mod schedule;
#[cfg(feature = "ssr")]
pub mod ssr;
pub mod str;
pub mod sync;
pub mod value;
pub mod view;
pub mod waiter;
#[cfg(feature = "web")]
pub mod web;
pub mod widget;

pub use error::Error;
pub use str::Str;

pub mod prelude {
    pub use crate::{
        Error, Str,
        defaults::{Defaults, Initial},
        gizmo::{Gizmo, Settings, WeakGizmo},
        sync::Shared,
        value::{Kind, List, Value},
        view::{View, ViewAttributes, ViewElement, ViewNode, ViewObserver},
        widget::{Config, Output, Widget},
    };
}
