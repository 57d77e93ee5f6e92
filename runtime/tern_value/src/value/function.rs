//! Callable values and call-shape negotiation.
//!
//! Every callable is a `Function`: a name, a `FuncType` describing its
//! parameters, and a body. Host bodies are plain closures over `Vec<Value>`;
//! script bodies are provided by the evaluator through [`ScriptBody`].
//!
//! Arguments always pass through [`marshal_args`] before reaching a body, so
//! a body sees exactly one value per declared parameter, already converted to
//! the parameter's type, with variadic tails collected into a slice.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::convert::{convert, FromValue, HostReturn};
use crate::env::Environment;
use crate::errors::{
    host_failure, host_panic, wrong_argument_count, wrong_argument_type, EvalError, HostError,
};
use crate::types::{FuncType, Type};
use crate::value::Value;

/// Host function body.
pub type HostFn = dyn Fn(Vec<Value>) -> Result<Value, HostError> + Send + Sync;

/// Body of a function literal, implemented by the evaluator.
pub trait ScriptBody: Send + Sync + 'static {
    /// Run the body with marshalled arguments.
    fn invoke(&self, args: Vec<Value>) -> Result<Value, EvalError>;

    /// Scope the body closed over.
    fn closure(&self) -> Option<&Environment> {
        None
    }

    /// Downcast hook.
    fn as_any(&self) -> &dyn Any;
}

#[derive(Clone)]
enum Body {
    Host(Arc<HostFn>),
    Script(Arc<dyn ScriptBody>),
}

impl Body {
    fn id(&self) -> usize {
        match self {
            Body::Host(f) => Arc::as_ptr(f).cast::<()>() as usize,
            Body::Script(s) => Arc::as_ptr(s).cast::<()>() as usize,
        }
    }
}

struct FunctionInner {
    name: String,
    ty: Arc<FuncType>,
    body: Body,
    receiver: Option<Value>,
}

/// A callable value.
#[derive(Clone)]
pub struct Function(Arc<FunctionInner>);

impl Function {
    /// Host function over raw values.
    pub fn host(
        name: impl Into<String>,
        ty: FuncType,
        f: impl Fn(Vec<Value>) -> Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        Function(Arc::new(FunctionInner {
            name: name.into(),
            ty: Arc::new(ty),
            body: Body::Host(Arc::new(f)),
            receiver: None,
        }))
    }

    /// Host function from a typed closure; the signature is derived from the
    /// closure's parameter and return types.
    ///
    /// ```text
    /// let add = Function::wrap("add", |a: i64, b: i64| a + b);
    /// ```
    pub fn wrap<Args, F: IntoHostFn<Args>>(name: impl Into<String>, f: F) -> Self {
        let ty = F::signature();
        Function(Arc::new(FunctionInner {
            name: name.into(),
            ty: Arc::new(ty),
            body: Body::Host(f.into_host_fn()),
            receiver: None,
        }))
    }

    pub fn script(name: impl Into<String>, ty: FuncType, body: Arc<dyn ScriptBody>) -> Self {
        Function(Arc::new(FunctionInner {
            name: name.into(),
            ty: Arc::new(ty),
            body: Body::Script(body),
            receiver: None,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Shape seen by callers (receiver excluded for bound methods).
    pub fn ty(&self) -> &FuncType {
        &self.0.ty
    }

    pub fn is_host(&self) -> bool {
        matches!(self.0.body, Body::Host(_))
    }

    pub fn script_body(&self) -> Option<&Arc<dyn ScriptBody>> {
        match &self.0.body {
            Body::Script(s) => Some(s),
            Body::Host(_) => None,
        }
    }

    /// Identity of the body. Bound copies share their method's identity.
    pub fn id(&self) -> usize {
        self.0.body.id()
    }

    /// Scope a script body closed over, when this handle is the only
    /// reference to both the function and its body.
    pub(crate) fn sole_closure(&self) -> Option<&Environment> {
        if Arc::strong_count(&self.0) != 1 {
            return None;
        }
        match &self.0.body {
            Body::Script(s) if Arc::strong_count(s) == 1 => s.closure(),
            _ => None,
        }
    }

    /// Method bound to `receiver`.
    #[must_use]
    pub fn bind(&self, receiver: Value) -> Function {
        Function(Arc::new(FunctionInner {
            name: self.0.name.clone(),
            ty: Arc::new(self.0.ty.without_receiver()),
            body: self.0.body.clone(),
            receiver: Some(receiver),
        }))
    }

    /// Call with positional arguments.
    pub fn call(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        self.call_with(args, false)
    }

    /// Call; with `spread` set the last argument is a slice to expand into
    /// the variadic tail (`f(xs...)`).
    pub fn call_with(&self, args: Vec<Value>, spread: bool) -> Result<Value, EvalError> {
        let args = marshal_args(&self.0.name, &self.0.ty, args, spread)?;
        self.invoke(args)
    }

    /// Call with arguments that already match the signature.
    pub fn invoke(&self, mut args: Vec<Value>) -> Result<Value, EvalError> {
        if let Some(receiver) = &self.0.receiver {
            args.insert(0, receiver.clone());
        }
        match &self.0.body {
            Body::Host(f) => call_host(&self.0.name, &**f, args),
            Body::Script(s) => s.invoke(args),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func {}{}", self.0.name, &Type::Func(Arc::clone(&self.0.ty)))
    }
}

/// `TERN_DEBUG` set to a non-empty value: host panics propagate.
pub fn debug_escape() -> bool {
    std::env::var_os("TERN_DEBUG").is_some_and(|v| !v.is_empty())
}

fn call_host(name: &str, f: &HostFn, args: Vec<Value>) -> Result<Value, EvalError> {
    let result = if debug_escape() {
        f(args)
    } else {
        match panic::catch_unwind(AssertUnwindSafe(|| f(args))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::debug!(function = name, %message, "host function panicked");
                return Err(host_panic(name, message));
            }
        }
    };
    result.map_err(|e| match e {
        HostError::Eval(inner) => *inner,
        other => host_failure(name, other.to_string()),
    })
}

/// Convert call-site arguments to the callee's parameter shape.
///
/// The call-site and callee shapes combine as follows:
///
/// | callee   | call site     | handling                                        |
/// |----------|---------------|-------------------------------------------------|
/// | fixed    | plain         | counts must match                               |
/// | fixed    | spread        | trailing slice expanded, then counts must match |
/// | variadic | plain         | tail collected into a slice                     |
/// | variadic | spread        | trailing slice passed as the tail               |
pub fn marshal_args(
    name: &str,
    ty: &FuncType,
    mut args: Vec<Value>,
    spread: bool,
) -> Result<Vec<Value>, EvalError> {
    let params = &ty.params;

    if spread && (!ty.variadic || args.len() != params.len()) {
        // Expand the trailing slice into positional arguments.
        if let Some(Value::Slice(tail)) = args.last().cloned() {
            args.pop();
            args.extend(tail.to_vec());
        }
    } else if spread {
        // Variadic callee, slice lands exactly on the variadic parameter.
        return args
            .into_iter()
            .zip(params)
            .enumerate()
            .map(|(i, (arg, param))| convert_arg(name, i, arg, param))
            .collect();
    }

    if !ty.variadic {
        if args.len() != params.len() {
            return Err(wrong_argument_count(name, params.len(), args.len(), false));
        }
        return args
            .into_iter()
            .zip(params)
            .enumerate()
            .map(|(i, (arg, param))| convert_arg(name, i, arg, param))
            .collect();
    }

    let fixed = params.len().saturating_sub(1);
    if args.len() < fixed {
        return Err(wrong_argument_count(name, fixed, args.len(), true));
    }
    let elem = ty.variadic_elem().cloned().unwrap_or(Type::Any);
    let tail: Vec<Value> = args.split_off(fixed);
    let mut out = Vec::with_capacity(params.len());
    for (i, (arg, param)) in args.into_iter().zip(params).enumerate() {
        out.push(convert_arg(name, i, arg, param)?);
    }
    let mut collected = Vec::with_capacity(tail.len());
    for (j, arg) in tail.into_iter().enumerate() {
        collected.push(convert_arg(name, fixed + j, arg, &elem)?);
    }
    out.push(Value::slice(collected, elem));
    Ok(out)
}

fn convert_arg(name: &str, index: usize, arg: Value, param: &Type) -> Result<Value, EvalError> {
    let got = arg.type_name();
    convert(arg, param).map_err(|_| wrong_argument_type(name, index, &param.to_string(), &got))
}

/// Closures usable as typed host functions.
pub trait IntoHostFn<Args>: Send + Sync + 'static {
    fn signature() -> FuncType;
    fn into_host_fn(self) -> Arc<HostFn>;
}

macro_rules! impl_into_host_fn {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> IntoHostFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: HostReturn,
            $($arg: FromValue,)*
        {
            fn signature() -> FuncType {
                FuncType::new(vec![$($arg::ty()),*], false, Some(R::returns()))
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_host_fn(self) -> Arc<HostFn> {
                Arc::new(move |args: Vec<Value>| {
                    let mut args = args.into_iter();
                    $(let $arg = $arg::from_value(args.next().unwrap_or(Value::Invalid))?;)*
                    (self)($($arg),*).into_return()
                })
            }
        }
    };
}

impl_into_host_fn!();
impl_into_host_fn!(A);
impl_into_host_fn!(A, B);
impl_into_host_fn!(A, B, C);
impl_into_host_fn!(A, B, C, D);
impl_into_host_fn!(A, B, C, D, E);
