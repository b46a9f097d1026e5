//! End-to-end source-to-output scenarios, run in-process against a fresh
//! `Vm` per test. No subprocess spawn: `print`'s destination is an
//! injectable writer, so stdout is just another buffer here.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use ember_compile::compile;
use ember_vm::Vm;

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

fn run(source: &str) -> (String, Result<(), String>) {
    let buf = SharedBuf::default();
    let mut vm = Vm::with_output(Box::new(buf.clone()));
    let chunk = compile(source.as_bytes(), &mut vm).expect("source compiles");
    let result = vm.run(&chunk).map_err(|e| e.to_string());
    (buf.contents(), result)
}

#[test]
fn arithmetic_precedence() {
    let (out, result) = run("print 1 + 2 * 3;");
    assert!(result.is_ok());
    assert_eq!(out, "7\n");
}

#[test]
fn string_concatenation() {
    let (out, result) = run(r#"var a = "foo"; var b = "bar"; print a + b;"#);
    assert!(result.is_ok());
    assert_eq!(out, "foobar\n");
}

#[test]
fn for_loop_accumulation() {
    let (out, result) = run("var x = 0; for (var i = 0; i < 3; i = i + 1) x = x + i; print x;");
    assert!(result.is_ok());
    assert_eq!(out, "3\n");
}

#[test]
fn while_loop_with_break() {
    let (out, result) =
        run("var i = 0; while (i < 5) { if (i == 3) break; i = i + 1; } print i;");
    assert!(result.is_ok());
    assert_eq!(out, "3\n");
}

#[test]
fn breaking_out_of_a_for_loop_pops_its_loop_local() {
    // `i` is scoped to the `for`, not the enclosing block. If `break`
    // skipped the cleanup pops for it, `after`'s local slot would be
    // assigned one stack position off from where its value actually
    // lands, and this would read back something other than 99.
    let (out, result) = run(
        r#"
        {
            for (var i = 0; i < 3; i = i + 1) {
                if (i == 1) break;
            }
            var after = 99;
            print after;
        }
        "#,
    );
    assert!(result.is_ok());
    assert_eq!(out, "99\n");
}

#[test]
fn short_circuit_logical_operators() {
    let (out, result) = run(r#"print true and "hi"; print false or 42;"#);
    assert!(result.is_ok());
    assert_eq!(out, "hi\n42\n");
}

#[test]
fn nested_scopes_shadow_independently() {
    let (out, result) = run("{ var a = 1; { var a = 2; print a; } print a; }");
    assert!(result.is_ok());
    assert_eq!(out, "2\n1\n");
}

#[test]
fn adding_number_and_string_is_a_runtime_error() {
    let (_, result) = run(r#"print 1 + "x";"#);
    let message = result.unwrap_err();
    assert!(message.starts_with("Operands must be numbers or strings."));
}

#[test]
fn reading_an_undeclared_global_is_a_runtime_error() {
    let (_, result) = run("print y;");
    let message = result.unwrap_err();
    assert!(message.starts_with("Undefined variable 'y'."));
}

#[test]
fn reading_a_local_in_its_own_initializer_is_a_compile_error() {
    let buf = SharedBuf::default();
    let mut vm = Vm::with_output(Box::new(buf));
    let source = b"{ var a = a; }";
    assert!(compile(source, &mut vm).is_err());
}

#[test]
fn assigning_to_a_non_lvalue_is_a_compile_error() {
    let buf = SharedBuf::default();
    let mut vm = Vm::with_output(Box::new(buf));
    let source = b"a + b = 3;";
    assert!(compile(source, &mut vm).is_err());
}
