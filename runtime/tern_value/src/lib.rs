//! Tern values - the dynamic data model shared by the evaluator and hosts.
//!
//! - `Value`: the dynamically typed runtime datum
//! - `Type`: runtime type descriptors, zero values, built-in type names
//! - `convert`: the conversion rules for typed slots, plus `FromValue` /
//!   `IntoValue` for moving data across the host boundary
//! - `Function`: host and script callables with explicit call-shape
//!   negotiation (fixed, variadic, spread)
//! - `Environment`: reference-counted lexical scopes
//! - `errors`: the runtime error taxonomy
//!
//! Host integration goes through this crate alone:
//!
//! ```text
//! let env = Environment::new();
//! env.define("greeting", "hello")?;
//! env.define_value("add", Value::Func(Function::wrap("add", |a: i64, b: i64| a + b)))?;
//! ```

pub mod convert;
pub mod env;
pub mod errors;
pub mod types;
pub mod value;

pub use convert::{convert, FromValue, HostReturn, IntoValue};
pub use env::{Binding, DeferredCall, Environment, Mutability};
pub use errors::{ConvertError, EnvError, EvalError, EvalErrorKind, EvalResult, HostError, ResultExt};
pub use types::{FloatKind, FuncType, IntKind, Method, StructType, Type};
pub use value::{
    Cell, Channel, Function, MapKey, MapValue, Pointer, ScriptBody, SliceValue, StructValue, Value,
};
