use pretty_assertions::assert_eq;
use tern_ir::build::*;
use tern_ir::{Position, StmtKind, TypeExpr};

use super::*;

fn sample() -> Stmt {
    program(vec![
        assign1("a", int(1)).at(1, 1),
        assign1("b", int(2)).at(2, 1),
        if_(
            eq(ident("a"), ident("b")),
            vec![return1(ident("a"))],
            vec![],
            None,
        )
        .at(3, 1),
        return1(ident("b")).at(4, 1),
    ])
}

#[test]
fn test_header_layout() {
    let bytes = encode(&block(vec![]));
    assert_eq!(&bytes[..13], b"TERN BYTECODE");
    assert_eq!(&bytes[13..15], &[0x00, 0x01]);
    // BLOCK, line 0, column 0, zero children
    assert_eq!(&bytes[15..], &[opcode::BLOCK, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert!(is_bytecode(&bytes));
    assert!(!is_bytecode(b"a = 1"));
}

#[test]
fn test_positions_are_big_endian() {
    let bytes = encode(&break_().at(258, 3));
    assert_eq!(&bytes[15..], &[opcode::BREAK, 0, 0, 1, 2, 0, 0, 0, 3]);
}

#[test]
fn test_roundtrip_sample() {
    let tree = sample();
    assert_eq!(decode(&encode(&tree)).ok(), Some(tree));
}

#[test]
fn test_absent_else_differs_from_empty_else() {
    let absent = if_(boolean(true), vec![], vec![], None);
    let empty = if_(boolean(true), vec![], vec![], Some(vec![]));
    assert_ne!(encode(&absent), encode(&empty));
    assert_eq!(decode(&encode(&absent)).ok(), Some(absent));
    assert_eq!(decode(&encode(&empty)).ok(), Some(empty));
}

#[test]
fn test_roundtrip_func_and_types() {
    let decl = tern_ir::FuncDecl {
        name: Some("f".to_string()),
        params: vec![
            tern_ir::Param::typed("x", TypeExpr::named("int")),
            tern_ir::Param::untyped("rest"),
        ],
        variadic: true,
        returns: Some(vec![TypeExpr::Map(
            Box::new(TypeExpr::named("string")),
            Box::new(TypeExpr::Array(4, Box::new(TypeExpr::named("float64")))),
        )]),
        body: vec![return1(nil())],
    };
    let tree = program(vec![
        expr_stmt(func_decl(decl)),
        expr_stmt(make(
            TypeExpr::Chan(Box::new(TypeExpr::named("int"))),
            Some(int(2)),
            None,
        )),
        expr_stmt(typed_map(
            TypeExpr::Map(
                Box::new(TypeExpr::named("string")),
                Box::new(TypeExpr::named("int")),
            ),
            vec![(string("a"), int(1)), (string("b"), int(2))],
        )),
        cfor(
            Some(assign1("i", int(0))),
            Some(lt(ident("i"), int(3))),
            Some(incr(ident("i"))),
            vec![continue_()],
        ),
    ]);
    assert_eq!(decode(&encode(&tree)).ok(), Some(tree));
}

#[test]
fn test_bad_magic() {
    assert!(matches!(decode(b"NOT BYTECODE!!!"), Err(DecodeError::BadMagic)));
    assert!(matches!(decode(b""), Err(DecodeError::BadMagic)));
}

#[test]
fn test_unsupported_version() {
    let mut bytes = encode(&sample());
    bytes[14] = 9;
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::UnsupportedVersion {
            found: 9,
            expected: 1
        })
    ));
}

#[test]
fn test_unknown_opcode() {
    let mut bytes = encode(&block(vec![]));
    bytes[15] = 0xEE;
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::UnknownOpcode {
            opcode: 0xEE,
            offset: 15
        })
    ));
}

#[test]
fn test_expression_where_statement_expected() {
    let mut bytes = encode(&block(vec![]));
    bytes[15] = opcode::IDENT;
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::UnexpectedOpcode {
            expected: "statement",
            ..
        })
    ));
}

#[test]
fn test_truncated_stream() {
    let bytes = encode(&sample());
    for cut in 15..bytes.len() {
        assert!(
            matches!(decode(&bytes[..cut]), Err(DecodeError::UnexpectedEof { .. })),
            "cut at {cut}"
        );
    }
}

#[test]
fn test_invalid_utf8() {
    let mut bytes = encode(&expr_stmt(ident("ab")));
    let last = bytes.len() - 1;
    bytes[last] = 0xFF;
    assert!(matches!(decode(&bytes), Err(DecodeError::InvalidUtf8 { .. })));
}

#[test]
fn test_negative_length() {
    let mut bytes = encode(&block(vec![]));
    let len_at = bytes.len() - 4;
    bytes[len_at..].copy_from_slice(&(-1i32).to_be_bytes());
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::NegativeLength { len: -1, .. })
    ));
}

#[test]
fn test_trailing_bytes() {
    let mut bytes = encode(&block(vec![]));
    bytes.push(0);
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::TrailingBytes { count: 1 })
    ));
}

#[test]
fn test_reader_writer_variants() {
    let tree = sample();
    let mut out = Vec::new();
    assert!(encode_to(&mut out, &tree).is_ok());
    let decoded = decode_from(&mut out.as_slice());
    assert_eq!(decoded.ok(), Some(tree));
}

#[test]
fn test_decoded_positions() {
    let Ok(tree) = decode(&encode(&sample())) else {
        panic!("sample must decode");
    };
    let StmtKind::Block(stmts) = tree.kind else {
        panic!("root must be a block");
    };
    let lines: Vec<Position> = stmts.iter().map(|s| s.pos).collect();
    assert_eq!(
        lines,
        vec![
            Position::new(1, 1),
            Position::new(2, 1),
            Position::new(3, 1),
            Position::new(4, 1)
        ]
    );
}
