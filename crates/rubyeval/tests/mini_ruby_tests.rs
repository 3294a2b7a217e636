//! Language tests for the bundled MiniRuby interpreter, driven through a session
//! so values come back the way callers see them: `inspect` strings and captured
//! output.

use pretty_assertions::assert_eq;
use rubyeval::{EvaluationError, EvaluationResult, NoInput, NoSink, RubyVersion, Session, mini::MiniRuby};

fn new_session() -> Session {
    let version = RubyVersion::default();
    Session::new(version, Box::new(MiniRuby::new(version)), Box::new(NoSink)).unwrap()
}

fn run(code: &str) -> EvaluationResult {
    new_session().evaluate(code, &mut NoInput).unwrap()
}

/// Evaluates `code` in a fresh session and checks the inspected value.
fn expect_value(code: &str, expected: &str) {
    assert_eq!(run(code).value, Ok(expected.to_owned()), "code: {code}");
}

/// Evaluates `code` in a fresh session and checks the exception it raises.
fn expect_error(code: &str, class: &str, message: &str) {
    assert_eq!(run(code).value, Err(EvaluationError::new(class, message)), "code: {code}");
}

/// Evaluates `code` in a fresh session and checks what it wrote to `$stdout`.
fn expect_output(code: &str, expected: &str) {
    assert_eq!(run(code).captured_output.as_deref(), Some(expected), "code: {code}");
}

/// Evaluates `code` with `input` already supplied to `$stdin`.
fn run_with_input(code: &str, input: &[Option<&str>]) -> EvaluationResult {
    let mut session = new_session();
    for chunk in input {
        session.supply_input(*chunk);
    }
    session.evaluate(code, &mut NoInput).unwrap()
}

// ============================================================================
// Numbers
// ============================================================================

#[test]
fn integer_arithmetic() {
    expect_value("2 ** 10", "1024");
    expect_value("7 / 2", "3");
    expect_value("-7 / 2", "-4");
    expect_value("-7 % 3", "2");
    expect_value("(1 + 2) * 3", "9");
    expect_value("10 - 2 - 3", "5");
}

#[test]
fn float_arithmetic() {
    expect_value("7.0 / 2", "3.5");
    expect_value("1 + 2.5", "3.5");
    expect_value("1.0 / 3", "0.3333333333333333");
    expect_value("0.1 + 0.2", "0.30000000000000004");
    expect_value("2.0 * 3", "6.0");
}

#[test]
fn float_rounding_to_digits() {
    expect_value("3.14159.round(2)", "3.14");
    expect_value("1234.5.round(-2)", "1200");
    expect_value("2.5.round", "3");
    expect_value("10.0.round(400)", "10.0");
    expect_value("0.1.round(20)", "0.1");
    expect_value("123.456.round(-400)", "0");
}

#[test]
fn comparisons_and_logic() {
    expect_value("1 < 2 && 2 < 3", "true");
    expect_value("1 == 1.0", "true");
    expect_value("nil || :fallback", ":fallback");
    expect_value("!nil", "true");
    expect_value("not true", "false");
}

#[test]
fn numeric_errors() {
    expect_error("1 / 0", "ZeroDivisionError", "divided by 0");
    expect_error("1 + 'a'", "TypeError", "String can't be coerced into Integer");
    expect_error("1 + nil", "TypeError", "nil can't be coerced into Integer");
    expect_error(
        "9223372036854775807 + 1",
        "RangeError",
        "integer overflow: bignums are not supported",
    );
}

// ============================================================================
// Strings & symbols
// ============================================================================

#[test]
fn string_methods() {
    expect_value("'abc'.upcase", "\"ABC\"");
    expect_value("'abc'.reverse", "\"cba\"");
    expect_value("\"a-b-c\".split('-')", "[\"a\", \"b\", \"c\"]");
    expect_value("'  padded '.strip", "\"padded\"");
    expect_value("\"line\\n\".chomp", "\"line\"");
    expect_value("'5'.to_i + 1", "6");
    expect_value("'ab' * 3", "\"ababab\"");
    expect_value(":sym.to_s", "\"sym\"");
}

#[test]
fn string_repetition_is_bounded() {
    expect_value("'ab' * 0", "\"\"");
    expect_error("'x' * 9999999999", "ArgumentError", "argument too big");
    expect_error("'x' * -1", "ArgumentError", "negative argument");
}

#[test]
fn string_interpolation() {
    expect_value("name = 'Ruby'\n\"Hello, #{name}!\"", "\"Hello, Ruby!\"");
    expect_value("\"#{1 + 1} and #{[1, 2]}\"", "\"2 and [1, 2]\"");
    expect_value("'no #{interpolation}'", "\"no \\#{interpolation}\"");
}

// ============================================================================
// Arrays & blocks
// ============================================================================

#[test]
fn array_methods() {
    expect_value("[3, 1, 2].sort", "[1, 2, 3]");
    expect_value("[1, [2, [3]]].flatten", "[1, 2, 3]");
    expect_value("[1, 2] + [3]", "[1, 2, 3]");
    expect_value("[1, 2, 3].sum", "6");
    expect_value("[1, nil, 2].compact", "[1, 2]");
    expect_value("['a', 'b'].join(', ')", "\"a, b\"");
    expect_value("a = [1, 2]\na << 3\na", "[1, 2, 3]");
    expect_value("[10, 20, 30][-1]", "30");
}

#[test]
fn recursive_arrays() {
    let cyclic = "a = [1]\na << a\n";
    expect_value(&format!("{cyclic}a"), "[1, [...]]");
    expect_output(&format!("{cyclic}puts a"), "1\n[...]\n");
    expect_value(&format!("{cyclic}b = [1]\nb << b\na == b"), "true");
    expect_value(&format!("{cyclic}a == [1, [1]]"), "false");
    expect_error(&format!("{cyclic}a.flatten"), "ArgumentError", "tried to flatten recursive array");
    expect_error("a = [1]\nb = [a]\na << b\na.join", "ArgumentError", "recursive array join");
}

#[test]
fn deeply_nested_arrays() {
    let deep = "a = 0\nb = 0\n100000.times { a = [a]\nb = [b] }\n";
    expect_value(&format!("{deep}a == b"), "true");
    expect_value(&format!("{deep}a.inspect.size"), "517");
    expect_output(&format!("{deep}puts a"), "[...]\n");
    expect_error(&format!("{deep}a.flatten"), "SystemStackError", "stack level too deep");
    expect_error(&format!("{deep}a.join"), "SystemStackError", "stack level too deep");
}

#[test]
fn block_iteration() {
    expect_value("[1, 2, 3].map { |n| n * n }", "[1, 4, 9]");
    expect_value("[1, 2, 3, 4].select { |n| n.even? }", "[2, 4]");
    expect_value("[1, 2, 3].inject(0) { |sum, n| sum + n }", "6");
    expect_value("out = []\n3.times { |i| out << i * 2 }\nout", "[0, 2, 4]");
    expect_value(
        "total = 0\n[1, 2, 3].each do |n|\n  total += n\nend\ntotal",
        "6",
    );
}

#[test]
fn block_parameters_do_not_leak() {
    expect_error("[1].each { |item| item }\nitem", "NameError", "undefined local variable or method 'item' for main");
}

#[test]
fn array_errors() {
    expect_error("[1, 'a'].sort", "ArgumentError", "comparison of Integer with String failed");
    expect_error("[1, 2].each", "LocalJumpError", "no block given (yield)");
    expect_error("nil + 1", "NoMethodError", "undefined method '+' for nil");
}

// ============================================================================
// Control flow & definitions
// ============================================================================

#[test]
fn conditionals() {
    expect_value("x = 5\nx > 3 ? 'big' : 'small'", "\"big\"");
    expect_value("if false\n  1\nelsif true\n  2\nelse\n  3\nend", "2");
    expect_value("unless 1 > 2\n  :ok\nend", ":ok");
    expect_value("if false\n  1\nend", "nil");
    expect_value(":yes if true", ":yes");
}

#[test]
fn loops() {
    expect_value("n = 0\nwhile n < 5\n  n += 1\nend\nn", "5");
    expect_value("n = 10\nuntil n <= 7\n  n -= 1\nend\nn", "7");
    expect_value("h = nil\nh ||= 4\nh ||= 5", "4");
}

#[test]
fn method_definitions() {
    expect_value("def fact(n)\n  n <= 1 ? 1 : n * fact(n - 1)\nend\nfact(10)", "3628800");
    expect_value("def greet(name)\n  \"hi #{name}\"\nend", ":greet");
    expect_value("def early(x)\n  return :neg if x < 0\n  :pos\nend\nearly(-1)", ":neg");
    expect_error(
        "def one(a)\n  a\nend\none(1, 2)",
        "ArgumentError",
        "wrong number of arguments (given 2, expected 1)",
    );
}

#[test]
fn methods_do_not_see_top_level_locals() {
    expect_error(
        "secret = 1\ndef peek\n  secret\nend\npeek",
        "NameError",
        "undefined local variable or method 'secret' for main",
    );
}

#[test]
fn rescue_catches_standard_errors() {
    expect_value("begin\n  1 / 0\nrescue => e\n  e.message\nend", "\"divided by 0\"");
    expect_value("begin\n  raise ArgumentError, 'bad'\nrescue\n  :rescued\nend", ":rescued");
    expect_value("begin\n  :fine\nrescue\n  :rescued\nend", ":fine");
}

#[test]
fn raise_forms() {
    expect_error("raise 'boom'", "RuntimeError", "boom");
    expect_error("raise ArgumentError, 'bad'", "ArgumentError", "bad");
    expect_error("raise ArgumentError", "ArgumentError", "ArgumentError");
    expect_error("Foo", "NameError", "uninitialized constant Foo");
}

// ============================================================================
// $stdout
// ============================================================================

#[test]
fn kernel_output() {
    expect_output("puts 'a', 'b'", "a\nb\n");
    expect_output("puts [1, [2, 3]]", "1\n2\n3\n");
    expect_output("puts", "\n");
    expect_output("puts nil", "\n");
    expect_output("print 'a', 'b'", "ab");
    expect_output("p 'quoted'", "\"quoted\"\n");
}

#[test]
fn p_returns_its_arguments() {
    let result = run("p 1, 2");
    assert_eq!(result.value, Ok("[1, 2]".to_owned()));
    assert_eq!(result.captured_output, Some("1\n2\n".to_owned()));
}

#[test]
fn stdout_object() {
    expect_output("$stdout.puts 'x'", "x\n");
    expect_output("$stdout << 'a' << 'b'", "ab");
    expect_value("$stdout.write('abc')", "3");
    expect_value("$stdout.sync", "true");
    expect_error("$stdout = 1", "TypeError", "$stdout must have write method, Integer given");
}

// ============================================================================
// $stdin
// ============================================================================

#[test]
fn stdin_reads() {
    assert_eq!(
        run_with_input("$stdin.read(3)", &[Some("abcdef")]).value,
        Ok("\"abc\"".to_owned())
    );
    assert_eq!(run_with_input("$stdin.eof?", &[None]).value, Ok("true".to_owned()));
    assert_eq!(run_with_input("$stdin.read", &[Some("all\n"), None]).value, Ok("\"all\\n\"".to_owned()));
    assert_eq!(run_with_input("$stdin.read(1)", &[None]).value, Ok("nil".to_owned()));
    assert_eq!(run_with_input("gets.to_i * 2", &[Some("21\n")]).value, Ok("42".to_owned()));
}

#[test]
fn stdin_each_line() {
    let result = run_with_input("$stdin.each_line { |l| puts l.upcase }", &[Some("a\nb\n"), None]);
    assert_eq!(result.captured_output, Some("A\nB\n".to_owned()));
}

// ============================================================================
// Introspection
// ============================================================================

#[test]
fn version_constant_follows_the_session() {
    let version = RubyVersion::V3_3;
    let mut session = Session::new(version, Box::new(MiniRuby::new(version)), Box::new(NoSink)).unwrap();
    let result = session.evaluate("RUBY_VERSION", &mut NoInput).unwrap();
    assert_eq!(result.value, Ok("\"3.3.0\"".to_owned()));
}

#[test]
fn class_and_type_checks() {
    expect_value("1.class", "Integer");
    expect_value("nil.class", "NilClass");
    expect_value("'s'.is_a?(String)", "true");
    expect_value("[].empty?", "true");
    expect_value("x = 1\ny = 2\nlocal_variables", "[:x, :y]");
}

#[test]
fn syntax_errors_are_raised_as_exceptions() {
    let err = run("1 +").value.unwrap_err();
    assert_eq!(err.class, "SyntaxError");
}
