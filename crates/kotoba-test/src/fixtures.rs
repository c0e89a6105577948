//! Token fixtures and a minimal tokenizer guest.

use kotoba_analyzer::Token;

/// The token [`MockTokenizer`](crate::MockTokenizer) emits for `c`.
///
/// Japanese full stops and commas are tagged as symbols; everything else is
/// a noun.
#[must_use]
pub fn char_token(c: char) -> Token {
    let pos = match c {
        '。' => "記号,句点",
        '、' => "記号,読点",
        _ => "名詞,一般",
    };
    Token {
        surface_form: c.to_string(),
        reading: c.to_string(),
        base_form: c.to_string(),
        pos: pos.to_owned(),
        pronunciation: c.to_string(),
        ..Token::default()
    }
}

/// A token with the given surface form and part of speech.
#[must_use]
pub fn test_token(surface: &str, pos: &str) -> Token {
    Token {
        surface_form: surface.to_owned(),
        base_form: surface.to_owned(),
        pos: pos.to_owned(),
        ..Token::default()
    }
}

/// WAT source for a guest that behaves like the kagome module from the
/// host's point of view.
///
/// `run` publishes a global function named `export`. Calling it returns
/// whatever value the host stored as the global `fixture`, so tests decide
/// the tokens.
#[must_use]
pub fn tokenizer_guest_wat(export: &str) -> String {
    let len = export.len();
    format!(
        r#"(module
  (import "gojs" "syscall/js.valueGet" (func $value_get (param i32)))
  (import "gojs" "syscall/js.valueSet" (func $value_set (param i32)))
  (import "gojs" "syscall/js.valueCall" (func $value_call (param i32)))
  (memory (export "mem") 1)
  (global $sp i32 (i32.const 50000))
  (global $ev (mut i64) (i64.const 0))
  (data (i32.const 20000) "_makeFuncWrapper")
  (data (i32.const 20032) "_pendingEvent")
  (data (i32.const 20048) "fixture")
  (data (i32.const 20064) "result")
  (data (i32.const 20080) "\00\00\00\00\00\00\f0\3f")
  (data (i32.const 20096) "{export}")
  (func (export "getsp") (result i32) (global.get $sp))
  (func $put (param $off i32) (param $v i64)
    (i64.store (i32.add (global.get $sp) (local.get $off)) (local.get $v)))
  (func $take (param $off i32) (result i64)
    (i64.load (i32.add (global.get $sp) (local.get $off))))
  (func (export "run") (param i32 i32)
    (call $put (i32.const 8) (i64.const 0x7FF8000100000006))
    (call $put (i32.const 16) (i64.const 20000))
    (call $put (i32.const 24) (i64.const 16))
    (call $put (i32.const 32) (i64.const 20080))
    (call $put (i32.const 40) (i64.const 1))
    (call $put (i32.const 48) (i64.const 1))
    (call $value_call (global.get $sp))
    (call $put (i32.const 32) (call $take (i32.const 56)))
    (call $put (i32.const 8) (i64.const 0x7FF8000100000005))
    (call $put (i32.const 16) (i64.const 20096))
    (call $put (i32.const 24) (i64.const {len}))
    (call $value_set (global.get $sp)))
  (func (export "resume")
    (call $put (i32.const 8) (i64.const 0x7FF8000100000006))
    (call $put (i32.const 16) (i64.const 20032))
    (call $put (i32.const 24) (i64.const 13))
    (call $value_get (global.get $sp))
    (global.set $ev (call $take (i32.const 32)))
    (call $put (i32.const 8) (i64.const 0x7FF8000100000005))
    (call $put (i32.const 16) (i64.const 20048))
    (call $put (i32.const 24) (i64.const 7))
    (call $value_get (global.get $sp))
    (call $put (i32.const 32) (call $take (i32.const 32)))
    (call $put (i32.const 8) (global.get $ev))
    (call $put (i32.const 16) (i64.const 20064))
    (call $put (i32.const 24) (i64.const 6))
    (call $value_set (global.get $sp))))
"#
    )
}
