//! Property-based round-trip tests for the bytecode codec.
//!
//! Generates random program trees and checks that `decode(encode(t)) == t`,
//! positions included, and that any strict prefix of an encoding is rejected.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use std::sync::Arc;

use proptest::prelude::*;
use tern_bytecode::{decode, encode, DecodeError};
use tern_ir::{
    BinaryOp, Expr, ExprKind, FuncDecl, Literal, Param, Position, SelectCase, Stmt, StmtKind,
    SwitchCase, TypeExpr, UnaryOp,
};

// -- Strategies --

fn name() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,8}").expect("valid regex")
}

fn text() -> impl Strategy<Value = String> {
    // Any unicode, including empty and multi-byte.
    ".{0,12}"
}

fn position() -> impl Strategy<Value = Position> {
    (0i32..5000, 0i32..200).prop_map(|(l, c)| Position::new(l, c))
}

fn type_expr() -> impl Strategy<Value = TypeExpr> {
    let leaf = prop_oneof![
        Just(TypeExpr::named("int")),
        Just(TypeExpr::named("string")),
        Just(TypeExpr::named("any")),
        name().prop_map(|n| TypeExpr::Named(format!("pkg.{n}"))),
    ];
    leaf.prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| TypeExpr::Slice(Box::new(t))),
            (0u32..16, inner.clone()).prop_map(|(n, t)| TypeExpr::Array(n, Box::new(t))),
            (inner.clone(), inner.clone())
                .prop_map(|(k, v)| TypeExpr::Map(Box::new(k), Box::new(v))),
            inner.clone().prop_map(|t| TypeExpr::Ptr(Box::new(t))),
            inner.clone().prop_map(|t| TypeExpr::Chan(Box::new(t))),
            (
                prop::collection::vec(inner.clone(), 0..3),
                any::<bool>(),
                prop::collection::vec(inner.clone(), 0..2)
            )
                .prop_map(|(params, variadic, returns)| TypeExpr::Func {
                    params,
                    variadic,
                    returns
                }),
            prop::collection::vec((name(), inner), 0..3).prop_map(TypeExpr::Struct),
        ]
    })
}

fn literal() -> impl Strategy<Value = Literal> {
    prop_oneof![
        any::<i64>().prop_map(|n| Literal::Number(n.to_string())),
        any::<f64>().prop_map(|f| Literal::Number(format!("{f:?}"))),
        (0u32..0xFFFF).prop_map(|n| Literal::Number(format!("0x{n:X}"))),
        text().prop_map(Literal::Str),
        any::<bool>().prop_map(Literal::Bool),
        Just(Literal::Nil),
    ]
}

fn binary_op() -> impl Strategy<Value = BinaryOp> {
    prop::sample::select(BinaryOp::ALL.to_vec())
}

fn unary_op() -> impl Strategy<Value = UnaryOp> {
    prop::sample::select(UnaryOp::ALL.to_vec())
}

fn expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (literal(), position()).prop_map(|(l, p)| Expr::new(ExprKind::Literal(l), p)),
        (name(), position()).prop_map(|(n, p)| Expr::new(ExprKind::Ident(n), p)),
    ];
    leaf.prop_recursive(4, 48, 4, |inner| {
        let boxed = inner.clone().prop_map(Box::new);
        let opt_boxed = prop::option::of(inner.clone().prop_map(Box::new));
        let kind = prop_oneof![
            boxed.clone().prop_map(ExprKind::Paren),
            (unary_op(), boxed.clone()).prop_map(|(op, expr)| ExprKind::Unary { op, expr }),
            boxed.clone().prop_map(ExprKind::Addr),
            boxed.clone().prop_map(ExprKind::Deref),
            (binary_op(), boxed.clone(), boxed.clone())
                .prop_map(|(op, lhs, rhs)| ExprKind::Binary { op, lhs, rhs }),
            (boxed.clone(), boxed.clone(), boxed.clone()).prop_map(|(cond, then, otherwise)| {
                ExprKind::Ternary {
                    cond,
                    then,
                    otherwise,
                }
            }),
            (boxed.clone(), name()).prop_map(|(expr, name)| ExprKind::Member { expr, name }),
            (boxed.clone(), boxed.clone())
                .prop_map(|(expr, index)| ExprKind::Index { expr, index }),
            (boxed.clone(), opt_boxed.clone(), opt_boxed.clone())
                .prop_map(|(expr, begin, end)| ExprKind::Slice { expr, begin, end }),
            (
                prop::option::of(type_expr()),
                prop::collection::vec(inner.clone(), 0..4)
            )
                .prop_map(|(ty, elems)| ExprKind::Array { ty, elems }),
            (
                prop::option::of(type_expr()),
                prop::collection::vec((inner.clone(), inner.clone()), 0..3)
            )
                .prop_map(|(ty, entries)| ExprKind::Map { ty, entries }),
            (
                prop::option::of(type_expr()),
                prop::collection::vec((name(), inner.clone()), 0..3)
            )
                .prop_map(|(ty, fields)| ExprKind::Struct { ty, fields }),
            (name(), prop::collection::vec(inner.clone(), 0..4), any::<bool>())
                .prop_map(|(name, args, spread)| ExprKind::Call { name, args, spread }),
            (
                boxed.clone(),
                prop::collection::vec(inner.clone(), 0..3),
                any::<bool>()
            )
                .prop_map(|(callee, args, spread)| ExprKind::AnonCall {
                    callee,
                    args,
                    spread
                }),
            (boxed.clone(), binary_op(), boxed.clone())
                .prop_map(|(target, op, value)| ExprKind::OpAssign { target, op, value }),
            boxed.clone().prop_map(ExprKind::Len),
            (boxed.clone(), boxed.clone())
                .prop_map(|(item, list)| ExprKind::Include { item, list }),
            (type_expr(), opt_boxed.clone(), opt_boxed.clone())
                .prop_map(|(ty, len, cap)| ExprKind::Make { ty, len, cap }),
            boxed.clone().prop_map(ExprKind::Recv),
            (boxed, opt_boxed).prop_map(|(target, key)| ExprKind::Delete { target, key }),
        ];
        (kind, position()).prop_map(|(k, p)| Expr::new(k, p))
    })
}

fn simple_stmt() -> impl Strategy<Value = Stmt> {
    let kind = prop_oneof![
        expr().prop_map(StmtKind::Expr),
        (
            prop::collection::vec(name(), 1..3),
            prop::option::of(type_expr()),
            prop::collection::vec(expr(), 0..3),
            any::<bool>()
        )
            .prop_map(|(names, ty, values, mutable)| StmtKind::Var {
                names,
                ty,
                values,
                mutable
            }),
        (
            prop::collection::vec(expr(), 1..3),
            prop::collection::vec(expr(), 1..3)
        )
            .prop_map(|(targets, values)| StmtKind::Assign { targets, values }),
        expr().prop_map(StmtKind::Throw),
        prop::collection::vec(expr(), 0..3).prop_map(StmtKind::Return),
        Just(StmtKind::Break),
        Just(StmtKind::Continue),
        expr().prop_map(StmtKind::Spawn),
        expr().prop_map(StmtKind::Defer),
        (expr(), expr()).prop_map(|(chan, value)| StmtKind::Send { chan, value }),
        (expr(), prop::option::of(expr()), prop::option::of(expr()))
            .prop_map(|(chan, value, ok)| StmtKind::Receive { chan, value, ok }),
        expr().prop_map(StmtKind::Close),
    ];
    (kind, position()).prop_map(|(k, p)| Stmt::new(k, p))
}

fn stmt() -> impl Strategy<Value = Stmt> {
    simple_stmt().prop_recursive(3, 32, 4, |inner| {
        let body = prop::collection::vec(inner.clone(), 0..3);
        let opt_body = prop::option::of(body.clone());
        let kind = prop_oneof![
            body.clone().prop_map(StmtKind::Block),
            (
                expr(),
                body.clone(),
                prop::collection::vec(inner.clone(), 0..2),
                opt_body.clone()
            )
                .prop_map(|(cond, then, else_ifs, otherwise)| StmtKind::If {
                    cond,
                    then,
                    else_ifs,
                    otherwise
                }),
            (
                body.clone(),
                prop::option::of(name()),
                body.clone(),
                opt_body.clone()
            )
                .prop_map(|(body, binding, catch, finally)| StmtKind::Try {
                    body,
                    binding,
                    catch,
                    finally
                }),
            (prop::option::of(expr()), body.clone())
                .prop_map(|(cond, body)| StmtKind::Loop { cond, body }),
            (prop::collection::vec(name(), 1..3), expr(), body.clone())
                .prop_map(|(vars, iterable, body)| StmtKind::For {
                    vars,
                    iterable,
                    body
                }),
            (
                prop::option::of(inner.clone().prop_map(Box::new)),
                prop::option::of(expr()),
                prop::option::of(expr()),
                body.clone()
            )
                .prop_map(|(init, cond, post, body)| StmtKind::CFor {
                    init,
                    cond,
                    post,
                    body
                }),
            (
                expr(),
                prop::collection::vec(
                    (position(), prop::collection::vec(expr(), 1..3), body.clone())
                        .prop_map(|(pos, values, body)| SwitchCase { pos, values, body }),
                    0..3
                ),
                opt_body.clone()
            )
                .prop_map(|(value, cases, default)| StmtKind::Switch {
                    value,
                    cases,
                    default
                }),
            (
                prop::collection::vec(
                    (position(), inner.clone(), body.clone()).prop_map(|(pos, op, body)| {
                        SelectCase {
                            pos,
                            op: Box::new(op),
                            body,
                        }
                    }),
                    0..3
                ),
                opt_body
            )
                .prop_map(|(cases, default)| StmtKind::Select { cases, default }),
            (name(), body.clone()).prop_map(|(name, body)| StmtKind::Module { name, body }),
            (
                prop::option::of(name()),
                prop::collection::vec(
                    (name(), prop::option::of(type_expr()), any::<bool>())
                        .prop_map(|(name, ty, mutable)| Param { name, ty, mutable }),
                    0..3
                ),
                any::<bool>(),
                prop::option::of(prop::collection::vec(type_expr(), 0..2)),
                body
            )
                .prop_map(|(name, params, variadic, returns, body)| {
                    StmtKind::Expr(Expr::new(
                        ExprKind::Func(Arc::new(FuncDecl {
                            name,
                            params,
                            variadic,
                            returns,
                            body,
                        })),
                        Position::NONE,
                    ))
                }),
        ];
        (kind, position()).prop_map(|(k, p)| Stmt::new(k, p))
    })
}

// -- Properties --

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn decode_inverts_encode(tree in stmt()) {
        let bytes = encode(&tree);
        let decoded = decode(&bytes).expect("encoded tree must decode");
        prop_assert_eq!(decoded, tree);
    }

    #[test]
    fn encoding_is_deterministic(tree in stmt()) {
        prop_assert_eq!(encode(&tree), encode(&tree));
    }

    #[test]
    fn strict_prefix_is_rejected(tree in stmt(), cut in any::<prop::sample::Index>()) {
        let bytes = encode(&tree);
        let len = cut.index(bytes.len());
        prop_assert!(decode(&bytes[..len]).is_err());
    }

    #[test]
    fn reencoding_decoded_tree_is_stable(tree in stmt()) {
        let bytes = encode(&tree);
        let again = encode(&decode(&bytes).expect("encoded tree must decode"));
        prop_assert_eq!(again, bytes);
    }
}

#[test]
fn truncated_header_is_bad_magic() {
    assert!(matches!(decode(b"TERN BYTE"), Err(DecodeError::BadMagic)));
}
