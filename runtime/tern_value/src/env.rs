//! Lexical scopes.
//!
//! An `Environment` is a handle to a reference-counted scope. Scopes form a
//! tree through their parent links: lookups walk towards the root, writes go
//! to the nearest scope that defines the name, and definitions always land in
//! the scope they are made in.
//!
//! Every scope tracks how many of its descendants are currently alive. The
//! counter is bumped on every ancestor when a scope is created and dropped
//! again when the scope is destroyed, so the root's count is the number of
//! live scopes in a run.
//!
//! A function literal stored in the scope it closes over makes a reference
//! cycle. The evaluator therefore calls [`Environment::destroy`] when a block,
//! loop iteration or call exits; it releases the scope unless something
//! outside it still holds it.

use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tern_ir::Position;

use crate::convert::{convert, FromValue, IntoValue};
use crate::errors::EnvError;
use crate::types::Type;
use crate::value::{Cell, Function, Pointer, Value};

/// Whether a binding may be reassigned.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum Mutability {
    #[default]
    Mutable,
    Immutable,
}

/// A named slot: shared storage plus the declared type, if any.
#[derive(Clone)]
pub struct Binding {
    cell: Cell,
    ty: Option<Type>,
    mutability: Mutability,
}

impl Binding {
    fn new(value: Value, ty: Option<Type>, mutability: Mutability) -> Self {
        Binding {
            cell: Arc::new(RwLock::new(value)),
            ty,
            mutability,
        }
    }

    pub fn get(&self) -> Value {
        self.cell.read().clone()
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    pub fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }

    pub fn is_mutable(&self) -> bool {
        self.mutability == Mutability::Mutable
    }

    /// Same binding over a fresh cell.
    fn detached(&self, deep: bool) -> Binding {
        let value = if deep {
            self.get().deep_clone()
        } else {
            self.get()
        };
        Binding::new(value, self.ty.clone(), self.mutability)
    }
}

/// A call scheduled by `defer`, with its arguments already evaluated.
#[derive(Clone)]
pub struct DeferredCall {
    pub func: Function,
    pub args: Vec<Value>,
    pub spread: bool,
    pub pos: Position,
}

struct Scope {
    parent: Option<Environment>,
    name: Option<String>,
    /// Deferred calls registered in nested block scopes land here.
    function_scope: bool,
    values: RwLock<FxHashMap<String, Binding>>,
    types: RwLock<FxHashMap<String, Type>>,
    defers: Mutex<Vec<DeferredCall>>,
    /// Live descendant scopes.
    live: AtomicUsize,
    /// Released by `destroy`; ancestors no longer count it.
    destroyed: AtomicBool,
}

impl Scope {
    fn release_ancestors(&self) {
        let mut ancestor = self.parent.as_ref();
        while let Some(env) = ancestor {
            env.inner.live.fetch_sub(1, Ordering::Relaxed);
            ancestor = env.inner.parent.as_ref();
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if !*self.destroyed.get_mut() {
            self.release_ancestors();
        }
    }
}

/// Handle to a scope. Cloning the handle shares the scope.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<Scope>,
}

fn check_symbol(name: &str) -> Result<(), EnvError> {
    if name.contains('.') {
        return Err(EnvError::InvalidSymbol(name.to_string()));
    }
    Ok(())
}

impl Environment {
    /// Global scope, pre-populated with the built-in type names.
    pub fn new() -> Self {
        let env = Environment::bare();
        {
            let mut types = env.inner.types.write();
            for name in Type::BUILTIN_NAMES {
                if let Some(ty) = Type::builtin(name) {
                    types.insert(name.to_string(), ty);
                }
            }
        }
        env
    }

    /// Global scope without any predefined names.
    pub fn bare() -> Self {
        Environment::create(None, None, true, FxHashMap::default(), FxHashMap::default())
    }

    fn create(
        parent: Option<Environment>,
        name: Option<String>,
        function_scope: bool,
        values: FxHashMap<String, Binding>,
        types: FxHashMap<String, Type>,
    ) -> Self {
        let mut ancestor = parent.as_ref();
        while let Some(env) = ancestor {
            env.inner.live.fetch_add(1, Ordering::Relaxed);
            ancestor = env.inner.parent.as_ref();
        }
        tracing::trace!(name = name.as_deref(), function_scope, "scope created");
        Environment {
            inner: Arc::new(Scope {
                parent,
                name,
                function_scope,
                values: RwLock::new(values),
                types: RwLock::new(types),
                defers: Mutex::new(Vec::new()),
                live: AtomicUsize::new(0),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    fn child(&self, name: Option<String>, function_scope: bool) -> Environment {
        Environment::create(
            Some(self.clone()),
            name,
            function_scope,
            FxHashMap::default(),
            FxHashMap::default(),
        )
    }

    /// Block scope.
    pub fn new_env(&self) -> Environment {
        self.child(None, false)
    }

    /// Scope of a function invocation; owns the deferred calls of its body.
    pub fn new_function_env(&self) -> Environment {
        self.child(None, true)
    }

    /// Child scope bound into `self` under `name`.
    pub fn new_module(&self, name: &str) -> Result<Environment, EnvError> {
        check_symbol(name)?;
        let module = self.child(Some(name.to_string()), true);
        self.define_with(
            name,
            Value::Env(module.clone()),
            None,
            Mutability::Immutable,
        )?;
        Ok(module)
    }

    /// Module pre-populated with host values and types.
    pub fn add_package<V, T>(&self, name: &str, values: V, types: T) -> Result<Environment, EnvError>
    where
        V: IntoIterator<Item = (String, Value)>,
        T: IntoIterator<Item = (String, Type)>,
    {
        let package = self.new_module(name)?;
        for (symbol, value) in values {
            package.define_with(&symbol, value, None, Mutability::Immutable)?;
        }
        for (symbol, ty) in types {
            package.define_type(&symbol, ty)?;
        }
        Ok(package)
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.inner.parent.as_ref()
    }

    pub fn root(&self) -> Environment {
        let mut env = self;
        while let Some(parent) = env.parent() {
            env = parent;
        }
        env.clone()
    }

    pub fn is_function_scope(&self) -> bool {
        self.inner.function_scope
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Release a scope whose construct has exited.
    ///
    /// Does nothing while anything besides the calling handle and closures
    /// stored in the scope's own bindings refers to it: such a scope escaped
    /// and is released by `Drop` once its last holder goes. Otherwise the
    /// ancestors stop counting it and its bindings are cleared, which breaks
    /// the closure cycles. Calling it again is a no-op.
    pub fn destroy(&self) {
        if self.inner.destroyed.load(Ordering::Acquire) {
            return;
        }
        if Arc::strong_count(&self.inner) != 1 + self.captive_references() {
            return;
        }
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.release_ancestors();
        self.inner.defers.lock().clear();
        let values = std::mem::take(&mut *self.inner.values.write());
        drop(values);
        tracing::trace!(name = self.name(), "scope destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// References to `self` held only through functions stored in its own
    /// bindings, directly or via descendant scopes nothing else holds.
    fn captive_references(&self) -> usize {
        self.inner
            .values
            .read()
            .values()
            .filter(|binding| Arc::strong_count(&binding.cell) == 1)
            .filter(|binding| match &*binding.cell.read() {
                Value::Func(func) => func
                    .sole_closure()
                    .is_some_and(|closure| self.reaches_solely(closure)),
                _ => false,
            })
            .count()
    }

    /// Whether the chain from `scope` up to `self` passes only through
    /// scopes with a single holder.
    fn reaches_solely(&self, scope: &Environment) -> bool {
        let mut current = scope;
        loop {
            if current.ptr_eq(self) {
                return true;
            }
            if Arc::strong_count(&current.inner) != 1 {
                return false;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Live descendant scopes.
    pub fn child_count(&self) -> usize {
        self.inner.live.load(Ordering::Relaxed)
    }

    /// Scopes from `self` up to the root.
    fn chain(&self) -> impl Iterator<Item = &Environment> {
        std::iter::successors(Some(self), |env| env.parent())
    }

    // Values

    /// Define an untyped, mutable binding holding a native value.
    pub fn define<T: IntoValue>(&self, name: &str, value: T) -> Result<(), EnvError> {
        self.define_value(name, value.into_value())
    }

    pub fn define_value(&self, name: &str, value: Value) -> Result<(), EnvError> {
        self.define_with(name, value, None, Mutability::Mutable)
    }

    /// Define (or redefine) `name` in this scope. A typed binding converts
    /// `value` to `ty` first.
    pub fn define_with(
        &self,
        name: &str,
        value: Value,
        ty: Option<Type>,
        mutability: Mutability,
    ) -> Result<(), EnvError> {
        check_symbol(name)?;
        let value = match &ty {
            Some(ty) => convert_for(name, value, ty)?,
            None => value,
        };
        self.inner
            .values
            .write()
            .insert(name.to_string(), Binding::new(value, ty, mutability));
        Ok(())
    }

    /// Define in the root scope.
    pub fn define_global(&self, name: &str, value: Value) -> Result<(), EnvError> {
        self.root().define_value(name, value)
    }

    pub fn get_binding(&self, name: &str) -> Result<Binding, EnvError> {
        check_symbol(name)?;
        self.chain()
            .find_map(|env| env.inner.values.read().get(name).cloned())
            .ok_or_else(|| EnvError::UnknownSymbol(name.to_string()))
    }

    pub fn get_value(&self, name: &str) -> Result<Value, EnvError> {
        self.get_binding(name).map(|b| b.get())
    }

    /// Read a binding as a native value.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, EnvError> {
        let value = self.get_value(name)?;
        let from = value.type_name();
        T::from_value(value).map_err(|e| EnvError::TypeCannotBeAssigned {
            name: name.to_string(),
            from,
            to: e.to,
        })
    }

    pub fn set<T: IntoValue>(&self, name: &str, value: T) -> Result<(), EnvError> {
        self.set_value(name, value.into_value())
    }

    /// Assign to the nearest scope that defines `name`.
    pub fn set_value(&self, name: &str, value: Value) -> Result<(), EnvError> {
        let binding = self.get_binding(name)?;
        if !binding.is_mutable() {
            return Err(EnvError::ImmutableBinding(name.to_string()));
        }
        let value = match binding.ty() {
            Some(ty) => convert_for(name, value, ty)?,
            None => value,
        };
        *binding.cell.write() = value;
        Ok(())
    }

    /// Pointer aliasing the binding's storage.
    pub fn addr(&self, name: &str) -> Result<Pointer, EnvError> {
        let binding = self.get_binding(name)?;
        if matches!(
            *binding.cell.read(),
            Value::Func(_) | Value::Env(_) | Value::Type(_)
        ) {
            return Err(EnvError::Unaddressable(name.to_string()));
        }
        Ok(Pointer::to_cell(binding.cell))
    }

    pub fn has(&self, name: &str) -> bool {
        self.get_binding(name).is_ok()
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.inner.values.read().contains_key(name)
    }

    /// Remove `name` from this scope only.
    pub fn delete(&self, name: &str) -> Result<(), EnvError> {
        check_symbol(name)?;
        match self.inner.values.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(EnvError::UnknownSymbol(name.to_string())),
        }
    }

    /// Remove `name` from the nearest scope that defines it.
    pub fn delete_global(&self, name: &str) -> Result<(), EnvError> {
        check_symbol(name)?;
        for env in self.chain() {
            if env.inner.values.write().remove(name).is_some() {
                return Ok(());
            }
        }
        Err(EnvError::UnknownSymbol(name.to_string()))
    }

    /// Names defined in this scope, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.values.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    // Types

    pub fn define_type(&self, name: &str, ty: Type) -> Result<(), EnvError> {
        check_symbol(name)?;
        self.inner.types.write().insert(name.to_string(), ty);
        Ok(())
    }

    /// Resolve a type name; `pkg.Name` looks `Name` up in module `pkg`.
    pub fn get_type(&self, name: &str) -> Result<Type, EnvError> {
        let undefined = || EnvError::UndefinedType(name.to_string());
        if let Some((module, inner)) = name.split_once('.') {
            return match self.get_value(module) {
                Ok(Value::Env(env)) => env.get_type(inner).map_err(|_| undefined()),
                _ => Err(undefined()),
            };
        }
        self.chain()
            .find_map(|env| env.inner.types.read().get(name).cloned())
            .ok_or_else(undefined)
    }

    // Copies

    /// Sibling scope with the same parent and fresh cells holding the current
    /// values of this scope's bindings.
    pub fn copy(&self) -> Environment {
        self.copy_with(self.parent().cloned(), false)
    }

    /// Independent copy of the whole chain; slices and maps are duplicated.
    pub fn deep_copy(&self) -> Environment {
        let parent = self.parent().map(Environment::deep_copy);
        self.copy_with(parent, true)
    }

    fn copy_with(&self, parent: Option<Environment>, deep: bool) -> Environment {
        let values = self
            .inner
            .values
            .read()
            .iter()
            .map(|(k, b)| (k.clone(), b.detached(deep)))
            .collect();
        let types = self.inner.types.read().clone();
        Environment::create(
            parent,
            self.inner.name.clone(),
            self.inner.function_scope,
            values,
            types,
        )
    }

    /// Drop every local binding and type. Breaks reference cycles formed by
    /// functions stored in the scope they close over.
    pub fn clear(&self) {
        let values = std::mem::take(&mut *self.inner.values.write());
        self.inner.types.write().clear();
        drop(values);
    }

    // Deferred calls

    /// Schedule `call` on the nearest enclosing function scope.
    pub fn push_defer(&self, call: DeferredCall) {
        let owner = self
            .chain()
            .find(|env| env.inner.function_scope)
            .unwrap_or(self);
        owner.inner.defers.lock().push(call);
    }

    /// Pending deferred calls of this scope, last registered first.
    pub fn take_defers(&self) -> Vec<DeferredCall> {
        let mut calls = std::mem::take(&mut *self.inner.defers.lock());
        calls.reverse();
        calls
    }

    /// Multi-line listing of every scope up to the root.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (depth, env) in self.chain().enumerate() {
            let _ = match env.name() {
                Some(name) => writeln!(out, "scope {depth} ({name}):"),
                None => writeln!(out, "scope {depth}:"),
            };
            let mut bindings: Vec<(String, Binding)> = env
                .inner
                .values
                .read()
                .iter()
                .map(|(k, b)| (k.clone(), b.clone()))
                .collect();
            bindings.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            for (name, binding) in bindings {
                let _ = match binding.ty() {
                    Some(ty) => writeln!(out, "  {name} {ty} = {}", binding.get()),
                    None => writeln!(out, "  {name} = {}", binding.get()),
                };
            }
        }
        out
    }
}

fn convert_for(name: &str, value: Value, ty: &Type) -> Result<Value, EnvError> {
    convert(value, ty).map_err(|e| EnvError::TypeCannotBeAssigned {
        name: name.to_string(),
        from: e.from,
        to: e.to,
    })
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name())
            .field("names", &self.names())
            .field("children", &self.child_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
