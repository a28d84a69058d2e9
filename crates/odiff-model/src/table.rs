//! Explicit attribute accessor registry
//!
//! Each model type builds one [`AttributeTable`] listing, module by module,
//! the attributes it exposes together with typed getter/setter functions.
//! Lookups are resolved against this table; names it does not list are
//! rejected with [`ModelError::UnknownAttribute`] instead of being searched
//! for at runtime.
//!
//! Registration order matters: when two modules register the same name, the
//! module registered first owns it.

use crate::error::ModelError;
use crate::value::{AttrValue, AttributeKind};
use indexmap::IndexMap;

/// Reads an attribute from a model
pub type Getter<M> = fn(&M) -> AttrValue;

/// Writes an attribute into a model
pub type Setter<M> = fn(&mut M, &str, AttrValue) -> Result<(), ModelError>;

/// One registered attribute
pub struct AttributeSlot<M> {
    /// Owning module
    pub module: &'static str,
    /// Scalar or array
    pub kind: AttributeKind,
    get: Getter<M>,
    set: Option<Setter<M>>,
}

impl<M> std::fmt::Debug for AttributeSlot<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeSlot")
            .field("module", &self.module)
            .field("kind", &self.kind)
            .field("writable", &self.set.is_some())
            .finish()
    }
}

/// Name → accessor mapping for a model type
#[derive(Debug)]
pub struct AttributeTable<M> {
    slots: IndexMap<&'static str, AttributeSlot<M>>,
}

impl<M> Default for AttributeTable<M> {
    fn default() -> Self {
        Self {
            slots: IndexMap::new(),
        }
    }
}

impl<M> AttributeTable<M> {
    /// Empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        mut self,
        module: &'static str,
        name: &'static str,
        kind: AttributeKind,
        get: Getter<M>,
        set: Option<Setter<M>>,
    ) -> Self {
        self.slots.entry(name).or_insert(AttributeSlot {
            module,
            kind,
            get,
            set,
        });
        self
    }

    /// Register a writable scalar
    #[must_use]
    pub fn scalar(self, module: &'static str, name: &'static str, get: Getter<M>, set: Setter<M>) -> Self {
        self.register(module, name, AttributeKind::Scalar, get, Some(set))
    }

    /// Register a writable array
    #[must_use]
    pub fn array(self, module: &'static str, name: &'static str, get: Getter<M>, set: Setter<M>) -> Self {
        self.register(module, name, AttributeKind::Array, get, Some(set))
    }

    /// Register a read-only attribute
    #[must_use]
    pub fn read_only(
        self,
        module: &'static str,
        name: &'static str,
        kind: AttributeKind,
        get: Getter<M>,
    ) -> Self {
        self.register(module, name, kind, get, None)
    }

    /// Slot registered under `name`
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&AttributeSlot<M>> {
        self.slots.get(name)
    }

    /// True if `name` is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Number of registered attributes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Registered names of one kind, in registration order
    pub fn names(&self, kind: AttributeKind) -> impl Iterator<Item = &'static str> + '_ {
        self.slots
            .iter()
            .filter(move |(_, slot)| slot.kind == kind)
            .map(|(name, _)| *name)
    }

    /// Read `name` from `model`; `None` if the table does not list it
    #[must_use]
    pub fn get(&self, model: &M, name: &str) -> Option<AttrValue> {
        self.slots.get(name).map(|slot| (slot.get)(model))
    }

    /// Write `value` into `name` on `model`
    pub fn set(&self, model: &mut M, name: &str, value: AttrValue) -> Result<(), ModelError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| ModelError::UnknownAttribute(name.to_string()))?;
        let set = slot.set.ok_or_else(|| ModelError::ReadOnly(name.to_string()))?;
        if value.kind() != slot.kind {
            return Err(ModelError::type_mismatch(
                name,
                match slot.kind {
                    AttributeKind::Scalar => "scalar",
                    AttributeKind::Array => "array",
                },
            ));
        }
        set(model, name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[derive(Default)]
    struct Toy {
        n: i64,
        field: ArrayD<f64>,
        shadow: i64,
    }

    fn table() -> AttributeTable<Toy> {
        AttributeTable::<Toy>::new()
            .scalar("main", "n", |m| m.n.into(), |m, name, v| {
                m.n = v.into_i64(name)?;
                Ok(())
            })
            .array("main", "field", |m| m.field.clone().into(), |m, name, v| {
                m.field = v.into_array(name)?;
                Ok(())
            })
            .scalar("extra", "n", |m| m.shadow.into(), |m, name, v| {
                m.shadow = v.into_i64(name)?;
                Ok(())
            })
            .read_only("main", "version", AttributeKind::Scalar, |_| 2_i64.into())
    }

    #[test]
    fn first_registered_module_owns_a_name() {
        let table = table();
        let mut toy = Toy::default();
        table.set(&mut toy, "n", 5_i64.into()).unwrap();
        assert_eq!(toy.n, 5);
        assert_eq!(toy.shadow, 0);
        assert_eq!(table.slot("n").unwrap().module, "main");
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn unknown_and_read_only_names_fail_fast() {
        let table = table();
        let mut toy = Toy::default();
        assert_eq!(
            table.set(&mut toy, "missing", 1_i64.into()).unwrap_err(),
            ModelError::UnknownAttribute("missing".into())
        );
        assert_eq!(
            table.set(&mut toy, "version", 3_i64.into()).unwrap_err(),
            ModelError::ReadOnly("version".into())
        );
        assert!(table.get(&toy, "missing").is_none());
    }

    #[test]
    fn kind_is_checked_before_the_setter_runs() {
        let table = table();
        let mut toy = Toy::default();
        let err = table.set(&mut toy, "field", 1.0.into()).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));

        let arr = ArrayD::from_elem(IxDyn(&[2, 2]), 1.5);
        table.set(&mut toy, "field", arr.clone().into()).unwrap();
        assert_eq!(table.get(&toy, "field"), Some(AttrValue::Array(arr)));
    }

    #[test]
    fn names_are_listed_per_kind() {
        let table = table();
        let scalars: Vec<_> = table.names(AttributeKind::Scalar).collect();
        assert_eq!(scalars, vec!["n", "version"]);
        let arrays: Vec<_> = table.names(AttributeKind::Array).collect();
        assert_eq!(arrays, vec!["field"]);
    }
}
