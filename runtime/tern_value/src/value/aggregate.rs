//! Slices, maps and structs.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use super::Value;
use crate::types::{StructType, Type};

/// Growable sequence with a shared backing store.
///
/// Copies of a `SliceValue` alias the same elements, so a write through one
/// binding is visible through every other. Arrays are slices created with a
/// fixed length: they never grow.
#[derive(Clone)]
pub struct SliceValue {
    items: Arc<RwLock<Vec<Value>>>,
    elem: Type,
    fixed: bool,
}

impl SliceValue {
    pub fn new(items: Vec<Value>, elem: Type) -> Self {
        SliceValue {
            items: Arc::new(RwLock::new(items)),
            elem,
            fixed: false,
        }
    }

    pub fn array(items: Vec<Value>, elem: Type) -> Self {
        SliceValue {
            items: Arc::new(RwLock::new(items)),
            elem,
            fixed: true,
        }
    }

    pub fn elem(&self) -> &Type {
        &self.elem
    }

    pub fn is_array(&self) -> bool {
        self.fixed
    }

    pub fn ty(&self) -> Type {
        if self.fixed {
            Type::array(self.len(), self.elem.clone())
        } else {
            Type::slice(self.elem.clone())
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.read().get(index).cloned()
    }

    /// Overwrite an element; `false` when `index` is out of range.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.items.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Append in place; `false` for arrays.
    pub fn push(&self, value: Value) -> bool {
        if self.fixed {
            return false;
        }
        self.items.write().push(value);
        true
    }

    /// Replace `begin..end` with `items`, growing or shrinking the slice.
    pub fn splice(&self, begin: usize, end: usize, items: Vec<Value>) -> bool {
        let mut guard = self.items.write();
        if begin > end || end > guard.len() || (self.fixed && items.len() != end - begin) {
            return false;
        }
        guard.splice(begin..end, items);
        true
    }

    /// Copy of `begin..end` as a new slice.
    pub fn sub(&self, begin: usize, end: usize) -> Option<SliceValue> {
        let guard = self.items.read();
        let part = guard.get(begin..end)?;
        Some(SliceValue::new(part.to_vec(), self.elem.clone()))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.items.read()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    /// Apply `f` to the element at `index` under the write lock.
    pub fn with_elem_mut<R>(&self, index: usize, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        self.items.write().get_mut(index).map(f)
    }

    pub fn ptr_eq(&self, other: &SliceValue) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }

    /// New backing store holding the same elements.
    #[must_use]
    pub fn detached(&self) -> SliceValue {
        SliceValue {
            items: Arc::new(RwLock::new(self.to_vec())),
            elem: self.elem.clone(),
            fixed: self.fixed,
        }
    }
}

/// Key of a map entry.
///
/// Only scalars can be keys. Keys are totally ordered (variant first, then
/// value) so maps iterate deterministically.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum MapKey {
    Nil,
    Bool(bool),
    Int(i64),
    Float(FloatKey),
    Str(Arc<str>),
}

/// `f64` ordered by `total_cmp`.
#[derive(Copy, Clone, Debug)]
pub struct FloatKey(pub f64);

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for FloatKey {}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl MapKey {
    /// `None` for values that cannot be keys.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        Some(match value {
            Value::Invalid | Value::Nil => MapKey::Nil,
            Value::Bool(b) => MapKey::Bool(*b),
            Value::Int(n) => MapKey::Int(*n),
            Value::Float(f) => MapKey::Float(FloatKey(*f)),
            Value::Str(s) => MapKey::Str(Arc::clone(s)),
            _ => return None,
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Nil => Value::Nil,
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(n) => Value::Int(*n),
            MapKey::Float(f) => Value::Float(f.0),
            MapKey::Str(s) => Value::Str(Arc::clone(s)),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_value(), f)
    }
}

/// Map with a shared backing store, ordered by key.
#[derive(Clone)]
pub struct MapValue {
    entries: Arc<RwLock<BTreeMap<MapKey, Value>>>,
    key: Type,
    value: Type,
}

impl MapValue {
    pub fn new(key: Type, value: Type) -> Self {
        MapValue {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            key,
            value,
        }
    }

    pub fn from_entries(key: Type, value: Type, entries: BTreeMap<MapKey, Value>) -> Self {
        MapValue {
            entries: Arc::new(RwLock::new(entries)),
            key,
            value,
        }
    }

    pub fn key_type(&self) -> &Type {
        &self.key
    }

    pub fn value_type(&self) -> &Type {
        &self.value
    }

    pub fn ty(&self) -> Type {
        Type::map(self.key.clone(), self.value.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get(&self, key: &MapKey) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &MapKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn insert(&self, key: MapKey, value: Value) {
        self.entries.write().insert(key, value);
    }

    pub fn remove(&self, key: &MapKey) -> Option<Value> {
        self.entries.write().remove(key)
    }

    /// Keys in iteration order.
    pub fn keys(&self) -> Vec<Value> {
        self.entries.read().keys().map(MapKey::to_value).collect()
    }

    /// Snapshot of all entries in iteration order.
    pub fn entries(&self) -> Vec<(MapKey, Value)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn ptr_eq(&self, other: &MapValue) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

/// Struct instance with value semantics.
///
/// Fields sit behind an `Arc` that is copied on first write, so cloning a
/// struct is cheap and mutating a clone never affects the original.
#[derive(Clone)]
pub struct StructValue {
    ty: Arc<StructType>,
    fields: Arc<Vec<Value>>,
}

impl StructValue {
    /// Callers guarantee `fields` matches `ty` in length and order.
    pub fn new(ty: Arc<StructType>, fields: Vec<Value>) -> Self {
        StructValue {
            ty,
            fields: Arc::new(fields),
        }
    }

    pub fn zero(ty: Arc<StructType>) -> Self {
        let fields = ty.fields().iter().map(|(_, t)| t.zero()).collect();
        StructValue::new(ty, fields)
    }

    pub fn struct_type(&self) -> &Arc<StructType> {
        &self.ty
    }

    pub fn ty(&self) -> Type {
        Type::Struct(Arc::clone(&self.ty))
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        let index = self.ty.field_index(name)?;
        self.fields.get(index).cloned()
    }

    pub fn field_at(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    pub fn field_mut(&mut self, index: usize) -> Option<&mut Value> {
        Arc::make_mut(&mut self.fields).get_mut(index)
    }

    /// Named fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.ty
            .fields()
            .iter()
            .map(|(n, _)| n.as_str())
            .zip(self.fields.iter())
    }
}
