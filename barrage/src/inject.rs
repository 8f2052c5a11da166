//! Explicit binding of providers into simulation fields.
//!
//! A simulation declares its injection points through [`Injectable`], either by hand or with
//! `#[derive(Injectable)]`. The [`Injector`] validates the table once, at setup, and then fills
//! a fresh simulation instance for every virtual user before its first spec materializes.
//!
//! Session and user values are never injected into fields: specs read them from the session
//! passed to their closures. Declaring such a point is a fatal setup error.
//!
//! ```rust
//! use std::sync::Arc;
//! use barrage::{inject::{Injectable, Injector}, provider::UuidProvider, macros::Injectable};
//!
//! #[derive(Default, Injectable)]
//! struct Checkout {
//!     #[feeder]
//!     ids: Arc<UuidProvider>,
//! }
//!
//! let injector = Injector::<Checkout>::new().unwrap();
//! let mut sim = Checkout::default();
//! assert!(injector.inject(&mut sim).is_empty());
//! ```
use std::any::{Any, type_name};

use crate::error::InjectionError;

type Binder<S> = Box<dyn Fn(&mut S) -> Result<(), InjectionError> + Send + Sync>;

/// Factory whose output type is only known at runtime.
pub type ErasedFactory = Box<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionKind {
    Feeder,
    Session,
    User,
}

/// One field of a simulation paired with the factory that produces its value.
pub struct InjectionPoint<S> {
    field: &'static str,
    kind: InjectionKind,
    binder: Option<Binder<S>>,
}

impl<S: 'static> InjectionPoint<S> {
    /// Binds the output of `factory` through `bind`. Type agreement is checked by the compiler.
    pub fn feeder<T, F, B>(field: &'static str, factory: F, bind: B) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        B: Fn(&mut S, T) + Send + Sync + 'static,
    {
        Self {
            field,
            kind: InjectionKind::Feeder,
            binder: Some(Box::new(move |target| {
                bind(target, factory());
                Ok(())
            })),
        }
    }

    /// Binds a factory resolved at runtime. An output that is not a `T` leaves the field
    /// unset and yields [`InjectionError::Binding`].
    pub fn feeder_erased<T, B>(field: &'static str, factory: ErasedFactory, bind: B) -> Self
    where
        T: Any,
        B: Fn(&mut S, T) + Send + Sync + 'static,
    {
        Self {
            field,
            kind: InjectionKind::Feeder,
            binder: Some(Box::new(move |target| {
                let value = factory()
                    .downcast::<T>()
                    .map_err(|_| InjectionError::Binding {
                        field,
                        reason: format!("factory output is not a `{}`", type_name::<T>()),
                    })?;
                bind(target, *value);
                Ok(())
            })),
        }
    }

    /// Declares a session-scoped field. Always rejected by [`Injector::new`].
    pub fn session(field: &'static str) -> Self {
        Self {
            field,
            kind: InjectionKind::Session,
            binder: None,
        }
    }

    /// Declares a user-scoped field. Always rejected by [`Injector::new`].
    pub fn user(field: &'static str) -> Self {
        Self {
            field,
            kind: InjectionKind::User,
            binder: None,
        }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn kind(&self) -> InjectionKind {
        self.kind
    }
}

/// Types whose fields can be filled by an [`Injector`].
pub trait Injectable: Sized + 'static {
    fn injection_points() -> Vec<InjectionPoint<Self>>;
}

/// Validated injection table of `S`.
pub struct Injector<S> {
    points: Vec<InjectionPoint<S>>,
}

impl<S: Injectable> Injector<S> {
    /// Fails on the first session or user injection point.
    pub fn new() -> Result<Self, InjectionError> {
        let points = S::injection_points();
        for point in &points {
            let err = match point.kind {
                InjectionKind::Feeder => continue,
                InjectionKind::Session => InjectionError::DisallowedSession { field: point.field },
                InjectionKind::User => InjectionError::DisallowedUser { field: point.field },
            };
            tracing::error!("Rejecting injection table of {}: {err}", type_name::<S>());
            return Err(err);
        }
        tracing::debug!(
            "Validated {} injection point(s) for {}",
            points.len(),
            type_name::<S>()
        );
        Ok(Self { points })
    }

    /// Fills every feeder field of `target`.
    ///
    /// Binding failures are logged and returned; the affected fields keep their previous
    /// value and the remaining fields are still bound.
    pub fn inject(&self, target: &mut S) -> Vec<InjectionError> {
        let mut failures = Vec::new();
        for point in &self.points {
            let Some(binder) = &point.binder else {
                continue;
            };
            if let Err(e) = binder(target) {
                tracing::error!("{}: {e}", type_name::<S>());
                failures.push(e);
            }
        }
        failures
    }

    pub fn points(&self) -> &[InjectionPoint<S>] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    #[derive(Default)]
    struct Manual {
        token: String,
        counter: u64,
    }

    impl Injectable for Manual {
        fn injection_points() -> Vec<InjectionPoint<Self>> {
            let next = Arc::new(AtomicU64::new(1));
            vec![
                InjectionPoint::feeder("token", || "secret".to_string(), |s: &mut Self, v: String| s.token = v),
                InjectionPoint::feeder(
                    "counter",
                    move || next.fetch_add(1, Ordering::Relaxed),
                    |s: &mut Self, v: u64| s.counter = v,
                ),
            ]
        }
    }

    #[test]
    fn typed_feeders_fill_fields() {
        let injector = Injector::<Manual>::new().unwrap();
        let mut first = Manual::default();
        let mut second = Manual::default();

        assert!(injector.inject(&mut first).is_empty());
        assert!(injector.inject(&mut second).is_empty());
        assert_eq!(first.token, "secret");
        assert_eq!((first.counter, second.counter), (1, 2));
    }

    struct WithSession;

    impl Injectable for WithSession {
        fn injection_points() -> Vec<InjectionPoint<Self>> {
            vec![InjectionPoint::session("session")]
        }
    }

    struct WithUser;

    impl Injectable for WithUser {
        fn injection_points() -> Vec<InjectionPoint<Self>> {
            vec![
                InjectionPoint::feeder("n", || 1u8, |_: &mut Self, _: u8| {}),
                InjectionPoint::user("user"),
            ]
        }
    }

    #[test]
    fn session_and_user_points_are_fatal() {
        let err = Injector::<WithSession>::new().err().unwrap();
        assert!(matches!(err, InjectionError::DisallowedSession { field: "session" }));
        assert!(err.is_fatal());

        let err = Injector::<WithUser>::new().err().unwrap();
        assert!(matches!(err, InjectionError::DisallowedUser { field: "user" }));
    }

    #[derive(Default)]
    struct Erased {
        name: String,
        port: u16,
    }

    impl Injectable for Erased {
        fn injection_points() -> Vec<InjectionPoint<Self>> {
            vec![
                // Produces a u32 for a u16 field.
                InjectionPoint::feeder_erased::<u16, _>(
                    "port",
                    Box::new(|| Box::new(8080u32)),
                    |s: &mut Self, v: u16| s.port = v,
                ),
                InjectionPoint::feeder_erased::<String, _>(
                    "name",
                    Box::new(|| Box::new(String::from("erased"))),
                    |s: &mut Self, v: String| s.name = v,
                ),
            ]
        }
    }

    #[test]
    fn erased_mismatch_is_logged_and_skipped() {
        let injector = Injector::<Erased>::new().unwrap();
        let mut sim = Erased::default();

        let failures = injector.inject(&mut sim);
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], InjectionError::Binding { field: "port", .. }));
        assert!(!failures[0].is_fatal());
        assert_eq!(sim.port, 0);
        assert_eq!(sim.name, "erased");
    }

    #[cfg(all(feature = "macros", feature = "builtins"))]
    mod derived {
        use super::*;
        use crate::{
            macros::Injectable,
            provider::{Provider, SequenceProvider, UuidProvider},
        };

        fn starting_at_100() -> Arc<SequenceProvider> {
            Arc::new(SequenceProvider::starting_at(100))
        }

        #[derive(Default, Injectable)]
        struct Storefront {
            #[feeder]
            ids: Arc<UuidProvider>,
            #[feeder(factory = starting_at_100)]
            orders: Arc<SequenceProvider>,
            label: String,
        }

        #[derive(Injectable)]
        #[allow(dead_code)]
        struct Forbidden {
            #[session_feeder]
            session: (),
        }

        #[test]
        fn derive_generates_feeder_points() {
            let points = Storefront::injection_points();
            let fields: Vec<_> = points.iter().map(InjectionPoint::field).collect();
            assert_eq!(fields, vec!["ids", "orders"]);

            let injector = Injector::<Storefront>::new().unwrap();
            let mut sim = Storefront::default();
            assert!(injector.inject(&mut sim).is_empty());
            assert_eq!(sim.orders.take(), 100);
            assert_eq!(sim.ids.take().len(), 36);
            assert!(sim.label.is_empty());
        }

        #[test]
        fn derive_marks_session_fields() {
            assert!(matches!(
                Injector::<Forbidden>::new().err(),
                Some(InjectionError::DisallowedSession { field: "session" })
            ));
        }
    }
}
