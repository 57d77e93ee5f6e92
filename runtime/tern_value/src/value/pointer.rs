//! Addressable places.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{SliceValue, Value};

/// Shared storage cell. Scope bindings are cells, so `&x` aliases `x`.
pub type Cell = Arc<RwLock<Value>>;

/// Where a pointer points.
#[derive(Clone)]
enum Place {
    /// A variable or a heap cell made for a non-addressable value.
    Cell(Cell),
    /// Field `index` of the struct behind `parent`.
    Field(Box<Pointer>, usize),
    /// Element `index` of a slice.
    Elem(SliceValue, usize),
}

/// Pointer to a value.
#[derive(Clone)]
pub struct Pointer {
    place: Place,
}

/// A pointer whose target no longer has the expected shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DanglingPointer;

impl Pointer {
    pub fn to_cell(cell: Cell) -> Self {
        Pointer {
            place: Place::Cell(cell),
        }
    }

    /// Pointer to a fresh cell holding `value`.
    pub fn new(value: Value) -> Self {
        Pointer::to_cell(Arc::new(RwLock::new(value)))
    }

    /// Pointer to field `index` of the struct behind `self`.
    #[must_use]
    pub fn field(&self, index: usize) -> Self {
        Pointer {
            place: Place::Field(Box::new(self.clone()), index),
        }
    }

    pub fn elem(slice: SliceValue, index: usize) -> Self {
        Pointer {
            place: Place::Elem(slice, index),
        }
    }

    /// Read the pointee.
    pub fn load(&self) -> Result<Value, DanglingPointer> {
        match &self.place {
            Place::Cell(cell) => Ok(cell.read().clone()),
            Place::Field(parent, index) => match parent.load()? {
                Value::Struct(s) => s.field_at(*index).cloned().ok_or(DanglingPointer),
                _ => Err(DanglingPointer),
            },
            Place::Elem(slice, index) => slice.get(*index).ok_or(DanglingPointer),
        }
    }

    /// Overwrite the pointee.
    pub fn store(&self, value: Value) -> Result<(), DanglingPointer> {
        self.with_mut(|slot| *slot = value)
    }

    /// Apply `f` to the pointee in place.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Value) -> R) -> Result<R, DanglingPointer> {
        let mut f = Some(f);
        let mut out = None;
        self.visit(&mut |slot| {
            if let Some(f) = f.take() {
                out = Some(f(slot));
            }
        })?;
        out.ok_or(DanglingPointer)
    }

    /// Run `g` on the pointee under the locks of every enclosing place.
    fn visit(&self, g: &mut dyn FnMut(&mut Value)) -> Result<(), DanglingPointer> {
        match &self.place {
            Place::Cell(cell) => {
                g(&mut *cell.write());
                Ok(())
            }
            Place::Field(parent, index) => {
                let mut found = false;
                parent.visit(&mut |v| {
                    if let Value::Struct(s) = v {
                        if let Some(field) = s.field_mut(*index) {
                            g(field);
                            found = true;
                        }
                    }
                })?;
                if found {
                    Ok(())
                } else {
                    Err(DanglingPointer)
                }
            }
            Place::Elem(slice, index) => slice.with_elem_mut(*index, |v| g(v)).ok_or(DanglingPointer),
        }
    }

    /// Same place.
    pub fn ptr_eq(&self, other: &Pointer) -> bool {
        match (&self.place, &other.place) {
            (Place::Cell(a), Place::Cell(b)) => Arc::ptr_eq(a, b),
            (Place::Field(pa, ia), Place::Field(pb, ib)) => ia == ib && pa.ptr_eq(pb),
            (Place::Elem(sa, ia), Place::Elem(sb, ib)) => ia == ib && sa.ptr_eq(sb),
            _ => false,
        }
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.place {
            Place::Cell(cell) => write!(f, "Pointer({:p})", Arc::as_ptr(cell)),
            Place::Field(parent, index) => write!(f, "{parent:?}.{index}"),
            Place::Elem(_, index) => write!(f, "Pointer([{index}])"),
        }
    }
}
