//! Extension handles - accessor pairs locating one extension's state
//!
//! A [`Handle<P, E>`] points at a slot of type `E` inside an ancestor state
//! `P`. It never owns the value: the ancestor state tree does. Handles obey
//! the accessor laws
//!
//! ```text
//! project(inject(s, v)) == v
//! inject(s, project(s)) == s
//! ```
//!
//! and compose with [`Handle::then`], so a handle from the application root
//! down to any nested extension is just the chain of the handles used to
//! mount it.

use crate::error::CompositionError;
use std::fmt;
use std::sync::Arc;

type Getter<P, E> = dyn for<'a> Fn(&'a P) -> Option<&'a E> + Send + Sync;
type GetterMut<P, E> = dyn for<'a> Fn(&'a mut P) -> Option<&'a mut E> + Send + Sync;
type Setter<P, E> = dyn Fn(&mut P, E) -> bool + Send + Sync;

fn getter<P, E, F>(f: F) -> Arc<Getter<P, E>>
where
    F: for<'a> Fn(&'a P) -> Option<&'a E> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn getter_mut<P, E, F>(f: F) -> Arc<GetterMut<P, E>>
where
    F: for<'a> Fn(&'a mut P) -> Option<&'a mut E> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Non-owning reference to an `E` slot inside a `P` state value
pub struct Handle<P, E> {
    label: Arc<str>,
    get: Arc<Getter<P, E>>,
    get_mut: Arc<GetterMut<P, E>>,
    set: Arc<Setter<P, E>>,
}

impl<P, E> Clone for Handle<P, E> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            get: self.get.clone(),
            get_mut: self.get_mut.clone(),
            set: self.set.clone(),
        }
    }
}

impl<P, E> fmt::Debug for Handle<P, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("label", &self.label).finish()
    }
}

impl<P: 'static, E: 'static> Handle<P, E> {
    /// Create a handle from a shared and a mutable projection.
    ///
    /// Either projection may return `None` when the slot is unpopulated;
    /// see [`Handle::optional`] for `Option` fields.
    pub fn new<G, M>(label: impl Into<String>, get: G, get_mut: M) -> Self
    where
        G: for<'a> Fn(&'a P) -> Option<&'a E> + Send + Sync + 'static,
        M: for<'a> Fn(&'a mut P) -> Option<&'a mut E> + Send + Sync + 'static,
    {
        let get_mut = getter_mut(get_mut);
        let slot = get_mut.clone();
        Self {
            label: Arc::from(label.into()),
            get: Arc::new(get),
            get_mut,
            set: Arc::new(move |state: &mut P, value: E| match slot(state) {
                Some(target) => {
                    *target = value;
                    true
                }
                None => false,
            }),
        }
    }

    /// Create a handle over an `Option<E>` slot.
    ///
    /// Projection fails with `MissingHandleTarget` while the slot is `None`;
    /// injection always populates it.
    pub fn optional<G, M>(label: impl Into<String>, get: G, get_mut: M) -> Self
    where
        G: for<'a> Fn(&'a P) -> &'a Option<E> + Send + Sync + 'static,
        M: for<'a> Fn(&'a mut P) -> &'a mut Option<E> + Send + Sync + 'static,
    {
        let get_mut = Arc::new(get_mut);
        let slot = get_mut.clone();
        Self {
            label: Arc::from(label.into()),
            get: getter(move |state: &P| get(state).as_ref()),
            get_mut: getter_mut(move |state: &mut P| get_mut(state).as_mut()),
            set: Arc::new(move |state: &mut P, value: E| {
                *slot(state) = Some(value);
                true
            }),
        }
    }

    /// Human-readable location of the slot, e.g. `foo.db`
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Borrow the extension state out of the ancestor state
    pub fn project<'a>(&self, state: &'a P) -> Result<&'a E, CompositionError> {
        (self.get)(state).ok_or_else(|| CompositionError::missing_handle_target(self.label()))
    }

    /// Mutably borrow the extension state out of the ancestor state
    pub fn project_mut<'a>(&self, state: &'a mut P) -> Result<&'a mut E, CompositionError> {
        (self.get_mut)(state)
            .ok_or_else(|| CompositionError::missing_handle_target(self.label()))
    }

    /// Replace the extension state in place
    pub fn set(&self, state: &mut P, value: E) -> Result<(), CompositionError> {
        if (self.set)(state, value) {
            Ok(())
        } else {
            Err(CompositionError::missing_handle_target(self.label()))
        }
    }

    /// Return `state` with the slot replaced by `value`
    pub fn inject(&self, mut state: P, value: E) -> Result<P, CompositionError> {
        self.set(&mut state, value)?;
        Ok(state)
    }

    /// Compose with a handle into the extension's own state
    pub fn then<C: 'static>(&self, inner: &Handle<E, C>) -> Handle<P, C> {
        let label = match (self.label.is_empty(), inner.label.is_empty()) {
            (true, _) => inner.label.to_string(),
            (_, true) => self.label.to_string(),
            _ => format!("{}.{}", self.label, inner.label),
        };

        let (outer_get, inner_get) = (self.get.clone(), inner.get.clone());
        let (outer_mut, inner_mut) = (self.get_mut.clone(), inner.get_mut.clone());
        let (outer_slot, inner_set) = (self.get_mut.clone(), inner.set.clone());

        Handle {
            label: Arc::from(label),
            get: getter(move |state: &P| outer_get(state).and_then(|mid| inner_get(mid))),
            get_mut: getter_mut(move |state: &mut P| {
                outer_mut(state).and_then(|mid| inner_mut(mid))
            }),
            set: Arc::new(move |state: &mut P, value: C| match outer_slot(state) {
                Some(mid) => inner_set(mid, value),
                None => false,
            }),
        }
    }
}

impl<P: 'static> Handle<P, P> {
    /// The handle from a state value to itself
    pub fn identity() -> Self {
        Handle::new("", |state: &P| Some(state), |state: &mut P| Some(state))
    }
}

/// Build a [`Handle`] for a (possibly nested) struct field.
///
/// ```rust,ignore
/// let foo: Handle<App, Greeting> = handle!(App, foo);
/// let db: Handle<App, Pool> = handle!(App, storage.pool);
/// ```
#[macro_export]
macro_rules! handle {
    ($parent:ty, $($field:ident).+) => {
        $crate::Handle::new(
            stringify!($($field).+),
            |state: &$parent| Some(&state.$($field).+),
            |state: &mut $parent| Some(&mut state.$($field).+),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Inner {
        count: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Outer {
        inner: Inner,
        label: String,
        lazy: Option<Inner>,
    }

    fn outer() -> Outer {
        Outer {
            inner: Inner { count: 1 },
            label: "root".to_string(),
            lazy: None,
        }
    }

    #[test]
    fn test_accessor_laws() {
        let h: Handle<Outer, Inner> = handle!(Outer, inner);
        let s = outer();
        let v = Inner { count: 42 };

        let injected = h.inject(s.clone(), v.clone()).unwrap();
        assert_eq!(h.project(&injected).unwrap(), &v);

        let current = h.project(&s).unwrap().clone();
        assert_eq!(h.inject(s.clone(), current).unwrap(), s);
    }

    #[test]
    fn test_nested_field_macro() {
        let h: Handle<Outer, u32> = handle!(Outer, inner.count);
        let mut s = outer();
        *h.project_mut(&mut s).unwrap() += 9;
        assert_eq!(s.inner.count, 10);
        assert_eq!(h.label(), "inner.count");
    }

    #[test]
    fn test_composition() {
        let to_inner: Handle<Outer, Inner> = handle!(Outer, inner);
        let to_count: Handle<Inner, u32> = handle!(Inner, count);
        let composed = to_inner.then(&to_count);

        let s = composed.inject(outer(), 7).unwrap();
        assert_eq!(s.inner.count, 7);
        assert_eq!(composed.project(&s).unwrap(), &7);
        assert_eq!(composed.label(), "inner.count");

        let same = composed.inject(s.clone(), *composed.project(&s).unwrap()).unwrap();
        assert_eq!(same, s);
    }

    #[test]
    fn test_identity_composes_transparently() {
        let id = Handle::<Outer, Outer>::identity();
        let h = id.then(&handle!(Outer, label));
        assert_eq!(h.label(), "label");
        assert_eq!(h.project(&outer()).unwrap(), "root");
    }

    #[test]
    fn test_optional_slot() {
        let h: Handle<Outer, Inner> =
            Handle::optional("lazy", |s: &Outer| &s.lazy, |s: &mut Outer| &mut s.lazy);
        let s = outer();

        match h.project(&s) {
            Err(CompositionError::MissingHandleTarget { handle, .. }) => {
                assert_eq!(handle, "lazy")
            }
            other => panic!("expected MissingHandleTarget, got {other:?}"),
        }

        let s = h.inject(s, Inner { count: 3 }).unwrap();
        assert_eq!(h.project(&s).unwrap().count, 3);
    }

    #[test]
    fn test_composed_set_through_missing_slot_fails() {
        let lazy: Handle<Outer, Inner> =
            Handle::optional("lazy", |s: &Outer| &s.lazy, |s: &mut Outer| &mut s.lazy);
        let count = lazy.then(&handle!(Inner, count));
        let mut s = outer();
        assert!(count.set(&mut s, 5).is_err());
        assert!(s.lazy.is_none());
    }

    fn arb_outer() -> impl Strategy<Value = Outer> {
        (any::<u32>(), "[a-z]{0,8}", proptest::option::of(any::<u32>())).prop_map(
            |(count, label, lazy)| Outer {
                inner: Inner { count },
                label,
                lazy: lazy.map(|count| Inner { count }),
            },
        )
    }

    proptest! {
        /// Set then get returns what was set; get then set changes nothing.
        #[test]
        fn prop_field_handle_laws(s in arb_outer(), count in any::<u32>()) {
            let h: Handle<Outer, Inner> = handle!(Outer, inner);
            let v = Inner { count };

            let injected = h.inject(s.clone(), v.clone()).unwrap();
            prop_assert_eq!(h.project(&injected).unwrap(), &v);

            let current = h.project(&s).unwrap().clone();
            prop_assert_eq!(h.inject(s.clone(), current).unwrap(), s);
        }

        #[test]
        fn prop_composed_handle_laws(s in arb_outer(), count in any::<u32>()) {
            let root = Handle::<Outer, Outer>::identity();
            let h = root.then(&handle!(Outer, inner)).then(&handle!(Inner, count));

            let injected = h.inject(s.clone(), count).unwrap();
            prop_assert_eq!(*h.project(&injected).unwrap(), count);
            prop_assert_eq!(&injected.label, &s.label);

            let current = *h.project(&s).unwrap();
            prop_assert_eq!(h.inject(s.clone(), current).unwrap(), s);
        }

        #[test]
        fn prop_optional_handle_laws(s in arb_outer(), count in any::<u32>()) {
            let h: Handle<Outer, Inner> =
                Handle::optional("lazy", |s: &Outer| &s.lazy, |s: &mut Outer| &mut s.lazy);

            let injected = h.inject(s.clone(), Inner { count }).unwrap();
            prop_assert_eq!(h.project(&injected).unwrap().count, count);

            let current = h.project(&s).ok().cloned();
            match current {
                Some(current) => {
                    prop_assert_eq!(h.inject(s.clone(), current).unwrap(), s);
                }
                None => {
                    prop_assert!(s.lazy.is_none());
                }
            }
        }
    }
}
