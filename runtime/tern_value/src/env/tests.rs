use pretty_assertions::assert_eq;

use super::*;
use crate::types::StructType;

// === Scoping ===

#[test]
fn test_child_definition_does_not_leak() {
    let root = Environment::new();
    let child = root.new_env();
    child.define("a", 1_i64).unwrap();
    assert_eq!(child.get::<i64>("a").unwrap(), 1);
    assert_eq!(
        root.get_value("a").unwrap_err(),
        EnvError::UnknownSymbol("a".to_string())
    );
}

#[test]
fn test_set_updates_nearest_definer() {
    let root = Environment::new();
    root.define("a", 1_i64).unwrap();
    let child = root.new_env();
    child.set("a", 2_i64).unwrap();
    assert_eq!(root.get::<i64>("a").unwrap(), 2);
    assert!(!child.has_local("a"));
}

#[test]
fn test_shadowing() {
    let root = Environment::new();
    root.define("a", 1_i64).unwrap();
    let child = root.new_env();
    child.define("a", 10_i64).unwrap();
    child.set("a", 11_i64).unwrap();
    assert_eq!(root.get::<i64>("a").unwrap(), 1);
    assert_eq!(child.get::<i64>("a").unwrap(), 11);
}

#[test]
fn test_set_unknown_symbol() {
    let env = Environment::new();
    assert_eq!(
        env.set_value("nope", Value::Int(1)),
        Err(EnvError::UnknownSymbol("nope".to_string()))
    );
}

#[test]
fn test_dotted_names_are_invalid() {
    let env = Environment::new();
    let invalid = Err(EnvError::InvalidSymbol("a.b".to_string()));
    assert_eq!(env.define_value("a.b", Value::Nil), invalid);
    assert_eq!(env.set_value("a.b", Value::Nil), invalid);
    assert_eq!(env.delete("a.b"), invalid);
    assert!(!env.has("a.b"));
}

#[test]
fn test_immutable_binding() {
    let env = Environment::new();
    env.define_with("k", Value::Int(1), None, Mutability::Immutable)
        .unwrap();
    assert_eq!(
        env.set_value("k", Value::Int(2)),
        Err(EnvError::ImmutableBinding("k".to_string()))
    );
}

#[test]
fn test_typed_binding_converts() {
    let env = Environment::new();
    env.define_with("f", Value::Int(1), Some(Type::FLOAT), Mutability::Mutable)
        .unwrap();
    assert_eq!(env.get_value("f").unwrap(), Value::Float(1.0));
    env.set_value("f", Value::Int(3)).unwrap();
    assert!(matches!(env.get_value("f").unwrap(), Value::Float(_)));
    let err = env.set_value("f", Value::string("x")).unwrap_err();
    assert_eq!(
        err,
        EnvError::TypeCannotBeAssigned {
            name: "f".to_string(),
            from: "string".to_string(),
            to: "float64".to_string(),
        }
    );
}

#[test]
fn test_define_global_lands_in_root() {
    let root = Environment::new();
    let inner = root.new_env().new_env();
    inner.define_global("g", Value::Bool(true)).unwrap();
    assert!(root.has_local("g"));
}

// === Addresses ===

#[test]
fn test_addr_aliases_binding() {
    let env = Environment::new();
    env.define("x", 1_i64).unwrap();
    let p = env.addr("x").unwrap();
    p.store(Value::Int(5)).unwrap();
    assert_eq!(env.get::<i64>("x").unwrap(), 5);
    env.set("x", 6_i64).unwrap();
    assert_eq!(p.load().unwrap(), Value::Int(6));
}

#[test]
fn test_unaddressable() {
    let env = Environment::new();
    env.define_value("t", Value::Type(Type::INT)).unwrap();
    env.new_module("m").unwrap();
    assert_eq!(env.addr("t").unwrap_err(), EnvError::Unaddressable("t".to_string()));
    assert_eq!(env.addr("m").unwrap_err(), EnvError::Unaddressable("m".to_string()));
}

// === Types ===

#[test]
fn test_builtin_types_in_root() {
    let env = Environment::new().new_env();
    assert_eq!(env.get_type("int").unwrap(), Type::INT);
    assert_eq!(env.get_type("Point"), Err(EnvError::UndefinedType("Point".to_string())));
    assert!(Environment::bare().get_type("int").is_err());
}

#[test]
fn test_package_types_resolve_dotted() {
    let root = Environment::new();
    let point = Type::structure(StructType::new(
        Some("geo.Point".to_string()),
        vec![("x".to_string(), Type::INT)],
    ));
    root.add_package(
        "geo",
        vec![("origin".to_string(), Value::Int(0))],
        vec![("Point".to_string(), point.clone())],
    )
    .unwrap();
    assert_eq!(root.get_type("geo.Point").unwrap(), point);
    assert!(root.get_type("geo.Line").is_err());
    let Value::Env(geo) = root.get_value("geo").unwrap() else {
        panic!("package is not bound as a scope");
    };
    assert_eq!(geo.name(), Some("geo"));
    assert_eq!(geo.get_value("origin").unwrap(), Value::Int(0));
}

// === Deletion ===

#[test]
fn test_delete_is_local_only() {
    let root = Environment::new();
    root.define("a", 1_i64).unwrap();
    let child = root.new_env();
    assert_eq!(child.delete("a"), Err(EnvError::UnknownSymbol("a".to_string())));
    assert!(root.has("a"));
}

#[test]
fn test_delete_global_removes_first_definer() {
    let root = Environment::new();
    root.define("a", 1_i64).unwrap();
    let mid = root.new_env();
    mid.define("a", 2_i64).unwrap();
    let leaf = mid.new_env();
    leaf.delete_global("a").unwrap();
    assert!(!mid.has_local("a"));
    assert_eq!(leaf.get::<i64>("a").unwrap(), 1);
    leaf.delete_global("a").unwrap();
    assert!(leaf.delete_global("a").is_err());
}

// === Copies ===

#[test]
fn test_copy_has_fresh_cells() {
    let root = Environment::new();
    root.define("shared", 0_i64).unwrap();
    let env = root.new_env();
    env.define("a", 1_i64).unwrap();
    let copy = env.copy();
    copy.set("a", 2_i64).unwrap();
    assert_eq!(env.get::<i64>("a").unwrap(), 1);
    copy.set("shared", 3_i64).unwrap();
    assert_eq!(root.get::<i64>("shared").unwrap(), 3);
}

#[test]
fn test_deep_copy_is_independent() {
    let root = Environment::new();
    root.define("xs", vec![1_i64, 2]).unwrap();
    let copy = root.deep_copy();
    let Value::Slice(xs) = copy.get_value("xs").unwrap() else {
        panic!("not a slice");
    };
    xs.set(0, Value::Int(9));
    assert_eq!(root.get::<Vec<i64>>("xs").unwrap(), vec![1, 2]);
    assert_eq!(copy.get_type("int").unwrap(), Type::INT);
}

// === Live scopes ===

#[test]
fn test_child_count_tracks_live_descendants() {
    let root = Environment::new();
    assert_eq!(root.child_count(), 0);
    let a = root.new_env();
    let b = a.new_function_env();
    assert_eq!(root.child_count(), 2);
    assert_eq!(a.child_count(), 1);
    drop(b);
    assert_eq!(root.child_count(), 1);
    assert_eq!(a.child_count(), 0);
    drop(a);
    assert_eq!(root.child_count(), 0);
}

#[test]
fn test_copy_counts_as_descendant() {
    let root = Environment::new();
    let a = root.new_env();
    let copy = a.copy();
    assert_eq!(root.child_count(), 2);
    drop(copy);
    drop(a);
    assert_eq!(root.child_count(), 0);
}

/// Script body that only remembers the scope it closed over.
struct Closes(Environment);

impl crate::value::ScriptBody for Closes {
    fn invoke(&self, _args: Vec<Value>) -> Result<Value, crate::errors::EvalError> {
        Ok(Value::Nil)
    }

    fn closure(&self) -> Option<&Environment> {
        Some(&self.0)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn closing_over(scope: &Environment) -> Function {
    let ty = crate::types::FuncType::new(Vec::new(), false, None);
    Function::script("f", ty, Arc::new(Closes(scope.clone())))
}

#[test]
fn test_destroy_breaks_closure_cycle() {
    let root = Environment::new();
    let scope = root.new_function_env();
    scope
        .define_value("f", Value::Func(closing_over(&scope)))
        .unwrap();
    let inner = scope.new_env();
    scope
        .define_value("g", Value::Func(closing_over(&inner)))
        .unwrap();
    drop(inner);
    assert_eq!(root.child_count(), 2);

    scope.destroy();
    assert!(scope.is_destroyed());
    assert!(!scope.has_local("f"));
    assert_eq!(root.child_count(), 0);
    scope.destroy();
    drop(scope);
    assert_eq!(root.child_count(), 0);
}

#[test]
fn test_destroy_keeps_escaped_scope() {
    let root = Environment::new();
    let scope = root.new_env();
    let escaped = closing_over(&scope);
    scope
        .define_value("f", Value::Func(escaped.clone()))
        .unwrap();
    scope.destroy();
    assert!(!scope.is_destroyed());
    assert!(scope.has_local("f"));
    assert_eq!(root.child_count(), 1);

    let other = root.new_env();
    let holder = other.clone();
    other.destroy();
    assert!(!other.is_destroyed());
    drop(holder);
    other.destroy();
    assert!(other.is_destroyed());
    assert_eq!(root.child_count(), 1);
    drop(escaped);
}

// === Defers ===

fn noop() -> Function {
    Function::wrap("noop", || ())
}

fn deferred(arg: i64) -> DeferredCall {
    DeferredCall {
        func: noop(),
        args: vec![Value::Int(arg)],
        spread: false,
        pos: Position::NONE,
    }
}

#[test]
fn test_defers_land_on_function_scope_lifo() {
    let root = Environment::new();
    let func = root.new_function_env();
    let block = func.new_env();
    block.push_defer(deferred(1));
    func.push_defer(deferred(2));
    assert!(block.take_defers().is_empty());
    let order: Vec<Value> = func
        .take_defers()
        .into_iter()
        .map(|c| c.args[0].clone())
        .collect();
    assert_eq!(order, vec![Value::Int(2), Value::Int(1)]);
    assert!(func.take_defers().is_empty());
}

// === Introspection ===

#[test]
fn test_names_sorted_and_dump() {
    let env = Environment::new();
    env.define("b", 2_i64).unwrap();
    env.define("a", "x").unwrap();
    assert_eq!(env.names(), vec!["a".to_string(), "b".to_string()]);
    let child = env.new_env();
    child
        .define_with("c", Value::Int(1), Some(Type::INT), Mutability::Mutable)
        .unwrap();
    assert_eq!(child.dump(), "scope 0:\n  c int = 1\nscope 1:\n  a = x\n  b = 2\n");
    assert!(child.root().ptr_eq(&env));
}
