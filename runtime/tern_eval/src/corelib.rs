//! Core helper functions available to every script when the executor is
//! built with `import_core(true)`.
//!
//! | name       | behavior                                                        |
//! |------------|-----------------------------------------------------------------|
//! | `typeOf`   | runtime type of a value, as a type value                        |
//! | `toString` | display form                                                    |
//! | `toInt`    | integer from a number, bool or numeric string                   |
//! | `toFloat`  | float from a number, bool or numeric string                     |
//! | `toBool`   | `true t yes y 1 on` (any case) for strings, non-zero for numbers |
//! | `sleep`    | pause for the given milliseconds (default 1); wakes on cancel   |
//! | `keys`     | map keys, module names or struct field names as a slice         |

use std::time::Duration;

use tern_value::errors::cancelled;
use tern_value::{EnvError, Environment, FuncType, Function, HostError, Type, Value};

use crate::interpreter::Interpreter;

/// Define the core helpers in `env`.
pub fn import_core(env: &Environment) -> Result<(), EnvError> {
    let functions = [
        Function::wrap("typeOf", |v: Value| Value::Type(v.type_of())),
        Function::wrap("toString", |v: Value| v.to_string()),
        Function::wrap("toInt", to_int),
        Function::wrap("toFloat", to_float),
        Function::wrap("toBool", |v: Value| to_bool(&v)),
        Function::wrap("keys", keys),
        Function::host(
            "sleep",
            FuncType::new(vec![Type::slice(Type::INT)], true, Some(Vec::new())),
            sleep,
        ),
    ];
    for func in functions {
        let name = func.name().to_string();
        env.define_value(&name, Value::Func(func))?;
    }
    tracing::trace!("core helpers imported");
    Ok(())
}

fn parse_error(v: &Value, to: &str) -> HostError {
    HostError::msg(format!("cannot convert {} {v:?} to {to}", v.type_name()))
}

#[expect(clippy::cast_possible_truncation, reason = "float to int truncates toward zero")]
fn to_int(v: Value) -> Result<i64, HostError> {
    match &v {
        Value::Int(n) => Ok(*n),
        Value::Float(f) => Ok(*f as i64),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .or_else(|_| s.parse::<f64>().map(|f| f as i64))
                .map_err(|_| parse_error(&v, "int"))
        }
        _ => Err(parse_error(&v, "int")),
    }
}

#[expect(clippy::cast_precision_loss, reason = "int to float rounds like the language does")]
fn to_float(v: Value) -> Result<f64, HostError> {
    match &v {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s.trim().parse::<f64>().map_err(|_| parse_error(&v, "float")),
        _ => Err(parse_error(&v, "float")),
    }
}

fn to_bool(v: &Value) -> bool {
    match v {
        Value::Str(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "t" | "yes" | "y" | "1" | "on"
        ),
        other => other.truthy(),
    }
}

fn keys(v: Value) -> Result<Value, HostError> {
    match v {
        Value::Map(m) => Ok(Value::slice(m.keys(), m.key_type().clone())),
        Value::Env(module) => Ok(Value::slice(
            module.names().into_iter().map(Value::string).collect(),
            Type::String,
        )),
        Value::Struct(s) => Ok(Value::slice(
            s.iter().map(|(name, _)| Value::string(name)).collect(),
            Type::String,
        )),
        Value::Nil => Ok(Value::slice(Vec::new(), Type::Any)),
        other => Err(HostError::msg(format!("keys of {}", other.type_name()))),
    }
}

fn sleep(args: Vec<Value>) -> Result<Value, HostError> {
    let millis = match args.first() {
        Some(Value::Slice(tail)) => tail.get(0).and_then(|v| v.as_int()).unwrap_or(1),
        _ => 1,
    };
    let duration = Duration::from_millis(u64::try_from(millis).unwrap_or(0));
    match Interpreter::active() {
        Some(interp) => {
            if interp.context().cancel_token().sleep(duration) {
                return Err(HostError::Eval(Box::new(cancelled())));
            }
        }
        None => std::thread::sleep(duration),
    }
    Ok(Value::Invalid)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use pretty_assertions::assert_eq;
    use tern_value::{Environment, Value};

    use super::import_core;

    fn call(env: &Environment, name: &str, args: Vec<Value>) -> Value {
        env.get_value(name).unwrap().as_func().unwrap().call(args).unwrap()
    }

    #[test]
    fn conversions() {
        let env = Environment::new();
        import_core(&env).unwrap();
        assert_eq!(call(&env, "toInt", vec![Value::string(" 42 ")]), Value::Int(42));
        assert_eq!(call(&env, "toInt", vec![Value::Float(2.9)]), Value::Int(2));
        assert_eq!(call(&env, "toFloat", vec![Value::string("1.5")]), Value::Float(1.5));
        assert_eq!(call(&env, "toString", vec![Value::Int(7)]), Value::string("7"));
        for yes in ["true", "T", "yes", "Y", "1", "on"] {
            assert_eq!(call(&env, "toBool", vec![Value::string(yes)]), Value::Bool(true));
        }
        assert_eq!(call(&env, "toBool", vec![Value::string("off")]), Value::Bool(false));
        assert!(env
            .get_value("toInt")
            .unwrap()
            .as_func()
            .unwrap()
            .call(vec![Value::string("x")])
            .is_err());
    }

    #[test]
    fn keys_and_type_of() {
        let env = Environment::new();
        import_core(&env).unwrap();
        let m = Value::map(tern_value::Type::String, tern_value::Type::INT);
        if let Value::Map(inner) = &m {
            inner.insert(tern_value::MapKey::from_value(&Value::string("b")).unwrap(), Value::Int(2));
            inner.insert(tern_value::MapKey::from_value(&Value::string("a")).unwrap(), Value::Int(1));
        }
        let keys = call(&env, "keys", vec![m]);
        assert_eq!(keys.to_string(), "[a b]");
        assert_eq!(
            call(&env, "typeOf", vec![Value::Int(1)]),
            Value::Type(tern_value::Type::INT)
        );
    }

    #[test]
    fn sleep_defaults_and_accepts_millis() {
        let env = Environment::new();
        import_core(&env).unwrap();
        assert_eq!(call(&env, "sleep", vec![]), Value::Invalid);
        assert_eq!(call(&env, "sleep", vec![Value::Int(2)]), Value::Invalid);
    }
}
