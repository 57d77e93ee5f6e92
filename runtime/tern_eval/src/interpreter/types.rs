//! Type expressions to runtime types.

use std::sync::Arc;

use tern_ir::TypeExpr;
use tern_value::errors::undefined_type;
use tern_value::{Environment, EvalError, FuncType, StructType, Type, Value};

/// Resolve a type expression. Built-in names win over scope-defined ones;
/// dotted names resolve through module scopes.
pub fn resolve_type(env: &Environment, expr: &TypeExpr) -> Result<Type, EvalError> {
    Ok(match expr {
        TypeExpr::Named(name) => match Type::builtin(name) {
            Some(ty) => ty,
            None => env.get_type(name).map_err(|_| undefined_type(name))?,
        },
        TypeExpr::Slice(elem) => Type::slice(resolve_type(env, elem)?),
        TypeExpr::Array(len, elem) => Type::array(*len as usize, resolve_type(env, elem)?),
        TypeExpr::Map(key, value) => Type::map(resolve_type(env, key)?, resolve_type(env, value)?),
        TypeExpr::Ptr(elem) => Type::ptr(resolve_type(env, elem)?),
        TypeExpr::Chan(elem) => Type::chan(resolve_type(env, elem)?),
        TypeExpr::Func {
            params,
            variadic,
            returns,
        } => {
            let mut resolved = params
                .iter()
                .map(|p| resolve_type(env, p))
                .collect::<Result<Vec<_>, _>>()?;
            if *variadic {
                if let Some(last) = resolved.pop() {
                    resolved.push(Type::slice(last));
                }
            }
            let returns = returns
                .iter()
                .map(|r| resolve_type(env, r))
                .collect::<Result<Vec<_>, _>>()?;
            Type::Func(Arc::new(FuncType::new(
                resolved,
                *variadic,
                Some(returns),
            )))
        }
        TypeExpr::Struct(fields) => {
            let fields = fields
                .iter()
                .map(|(name, ty)| Ok((name.clone(), resolve_type(env, ty)?)))
                .collect::<Result<Vec<_>, EvalError>>()?;
            Type::structure(StructType::new(None, fields))
        }
    })
}

/// Resolve an optional type expression.
pub(super) fn resolve_opt(
    env: &Environment,
    expr: Option<&TypeExpr>,
) -> Result<Option<Type>, EvalError> {
    expr.map(|ty| resolve_type(env, ty)).transpose()
}

/// Zero results of a call to a function with the given declared results:
/// nothing for `()`, the zero value for one result, a slice of zeros for
/// several. Undeclared results are unknown (`Invalid`).
pub(super) fn zero_results(returns: Option<&[Type]>) -> Value {
    match returns {
        None | Some([]) => Value::Invalid,
        Some([single]) => single.zero(),
        Some(many) => Value::slice(many.iter().map(Type::zero).collect(), Type::Any),
    }
}
