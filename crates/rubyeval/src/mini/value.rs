use std::{cell::RefCell, cmp::Ordering, fmt::Write, ops::Deref, rc::Rc};

use ahash::AHashSet;

use crate::error::EvaluationError;

pub(crate) type ArrayRef = Rc<ArrayCell>;

/// Storage behind an array value.
///
/// Dropping the last reference releases nested arrays from a work list, so a
/// deeply nested array does not overflow the stack when it goes away.
#[derive(Debug)]
pub(crate) struct ArrayCell(RefCell<Vec<Value>>);

impl Deref for ArrayCell {
    type Target = RefCell<Vec<Value>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for ArrayCell {
    fn drop(&mut self) {
        let mut pending = std::mem::take(self.0.get_mut());
        while let Some(value) = pending.pop() {
            if let Value::Array(nested) = value
                && let Ok(mut cell) = Rc::try_unwrap(nested)
            {
                pending.append(cell.0.get_mut());
            }
        }
    }
}

/// Arrays nested deeper than this print as `[...]`; `join` and `flatten` raise on them.
pub(crate) const MAX_NESTED_DEPTH: usize = 256;

/// Runtime value of the MiniRuby interpreter.
///
/// Arrays are shared by reference like Ruby objects; every other value is immutable
/// and cloned freely.
#[derive(Debug, Clone)]
pub(crate) enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    Array(ArrayRef),
    /// A class object, e.g. `Integer` or `ArgumentError`.
    Class(String),
    Exception(EvaluationError),
    /// The top-level `self`.
    Main,
    Stdout,
    Stdin,
}

impl Value {
    pub fn array(items: Vec<Self>) -> Self {
        Self::Array(Rc::new(ArrayCell(RefCell::new(items))))
    }

    pub fn truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    pub fn class_name(&self) -> &str {
        match self {
            Self::Nil => "NilClass",
            Self::Bool(true) => "TrueClass",
            Self::Bool(false) => "FalseClass",
            Self::Int(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Str(_) => "String",
            Self::Symbol(_) => "Symbol",
            Self::Array(_) => "Array",
            Self::Class(_) => "Class",
            Self::Exception(error) => &error.class,
            Self::Main => "Object",
            Self::Stdout | Self::Stdin => "IO",
        }
    }

    /// How error messages refer to the value: `nil`, `main`, or `an instance of Integer`.
    pub fn describe(&self) -> String {
        match self {
            Self::Nil => "nil".to_owned(),
            Self::Bool(value) => value.to_string(),
            Self::Main => "main".to_owned(),
            Self::Class(name) => format!("class {name}"),
            _ => format!("an instance of {}", self.class_name()),
        }
    }

    /// Ruby's `inspect`.
    pub fn inspect(&self) -> String {
        let mut out = String::new();
        self.inspect_into(&mut out, &mut Vec::new());
        out
    }

    fn inspect_into(&self, out: &mut String, open: &mut Vec<*const ArrayCell>) {
        match self {
            Self::Nil => out.push_str("nil"),
            Self::Str(text) => inspect_str(text, out),
            Self::Symbol(name) => {
                out.push(':');
                out.push_str(name);
            }
            Self::Array(items) => {
                let ptr = Rc::as_ptr(items);
                if open.len() >= MAX_NESTED_DEPTH || open.contains(&ptr) {
                    out.push_str("[...]");
                    return;
                }
                open.push(ptr);
                out.push('[');
                for (index, item) in items.borrow().iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    item.inspect_into(out, open);
                }
                out.push(']');
                open.pop();
            }
            Self::Exception(error) => {
                let _ = write!(out, "#<{}: {}>", error.class, error.message);
            }
            Self::Stdout => out.push_str("#<IO:<STDOUT>>"),
            Self::Stdin => out.push_str("#<IO:<STDIN>>"),
            _ => out.push_str(&self.to_s()),
        }
    }

    /// Ruby's `to_s`, used by `puts`, `print` and interpolation.
    pub fn to_s(&self) -> String {
        match self {
            Self::Nil => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => format_float(*value),
            Self::Str(text) | Self::Symbol(text) | Self::Class(text) => text.clone(),
            Self::Exception(error) => error.message.clone(),
            Self::Main => "main".to_owned(),
            Self::Array(_) | Self::Stdout | Self::Stdin => self.inspect(),
        }
    }

    /// Ruby's `==`. Arrays that contain themselves compare equal when their
    /// structure matches.
    pub fn ruby_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) | (Self::Main, Self::Main) | (Self::Stdout, Self::Stdout) | (Self::Stdin, Self::Stdin) => {
                true
            }
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            #[expect(clippy::cast_precision_loss, reason = "Ruby compares Integer and Float numerically")]
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) | (Self::Symbol(a), Self::Symbol(b)) | (Self::Class(a), Self::Class(b)) => {
                a == b
            }
            (Self::Array(a), Self::Array(b)) => arrays_eq(a, b),
            (Self::Exception(a), Self::Exception(b)) => a == b,
            _ => false,
        }
    }

    /// Ordering used by `<`, `sort`, `min` and `max`; `None` if the values do not compare.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            #[expect(clippy::cast_precision_loss, reason = "Ruby compares Integer and Float numerically")]
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            #[expect(clippy::cast_precision_loss, reason = "Ruby compares Integer and Float numerically")]
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Element-wise array equality with an explicit work list, so neither nesting
/// depth nor cycles grow the call stack. A pair already under comparison counts as
/// equal.
fn arrays_eq(a: &ArrayRef, b: &ArrayRef) -> bool {
    let mut pending = vec![(Rc::clone(a), Rc::clone(b))];
    let mut seen = AHashSet::new();
    while let Some((a, b)) = pending.pop() {
        if Rc::ptr_eq(&a, &b) || !seen.insert((Rc::as_ptr(&a), Rc::as_ptr(&b))) {
            continue;
        }
        let (left, right) = (a.borrow(), b.borrow());
        if left.len() != right.len() {
            return false;
        }
        for (x, y) in left.iter().zip(right.iter()) {
            match (x, y) {
                (Value::Array(x), Value::Array(y)) => pending.push((Rc::clone(x), Rc::clone(y))),
                _ if !x.ruby_eq(y) => return false,
                _ => {}
            }
        }
    }
    true
}

fn inspect_str(text: &str, out: &mut String) {
    out.push('"');
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => out.push_str("\\\""),
            // would read back as interpolation
            '#' if matches!(chars.peek(), Some('{' | '$' | '@')) => out.push_str("\\#"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            '\u{b}' => out.push_str("\\v"),
            '\u{c}' => out.push_str("\\f"),
            '\u{1b}' => out.push_str("\\e"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Formats a float the way Ruby prints it: `1.0`, `0.1`, `1.0e+20`, `Infinity`.
pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        return text.to_owned();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{value:e}");
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let exponent: i32 = exponent.parse().unwrap_or_default();
        let sign = if exponent < 0 { '-' } else { '+' };
        let mantissa = if mantissa.contains('.') {
            mantissa.to_owned()
        } else {
            format!("{mantissa}.0")
        };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }
    let mut formatted = value.to_string();
    if !formatted.contains('.') {
        formatted.push_str(".0");
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_inspect_with_escapes() {
        assert_eq!(Value::Str("hello\n".to_owned()).inspect(), "\"hello\\n\"");
        assert_eq!(Value::Str("say \"hi\"".to_owned()).inspect(), "\"say \\\"hi\\\"\"");
        assert_eq!(Value::Str("#{x} #1".to_owned()).inspect(), "\"\\#{x} #1\"");
    }

    #[test]
    fn floats_format_like_ruby() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e20), "1.0e+20");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(f64::INFINITY), "Infinity");
    }

    #[test]
    fn recursive_arrays_inspect_without_looping() {
        let array = Value::array(vec![Value::Int(1)]);
        if let Value::Array(items) = &array {
            items.borrow_mut().push(array.clone());
        }
        assert_eq!(array.inspect(), "[1, [...]]");
    }

    fn nested(depth: usize) -> Value {
        (0..depth).fold(Value::Int(0), |inner, _| Value::array(vec![inner]))
    }

    #[test]
    fn deep_arrays_inspect_truncated() {
        let text = nested(MAX_NESTED_DEPTH + 10).inspect();
        assert!(text.starts_with(&"[".repeat(MAX_NESTED_DEPTH)));
        assert!(text.contains("[...]"));
        assert!(!text.contains('0'));
        assert_eq!(nested(3).inspect(), "[[[0]]]");
    }

    #[test]
    fn dropping_a_deep_array_does_not_recurse() {
        let deep = nested(1_000_000);
        let Value::Array(outer) = &deep else {
            panic!("expected an array");
        };
        let shared = outer.borrow()[0].clone();
        drop(deep);
        assert_eq!(shared.class_name(), "Array");
        drop(shared);
    }

    #[test]
    fn deep_and_recursive_arrays_compare_without_recursing() {
        assert!(nested(100_000).ruby_eq(&nested(100_000)));
        assert!(!nested(100_000).ruby_eq(&nested(99_999)));

        let cyclic = || {
            let array = Value::array(vec![Value::Int(1)]);
            if let Value::Array(items) = &array {
                items.borrow_mut().push(array.clone());
            }
            array
        };
        assert!(cyclic().ruby_eq(&cyclic()));
        assert!(!cyclic().ruby_eq(&Value::array(vec![Value::Int(1), Value::Int(1)])));
    }

    #[test]
    fn integers_and_floats_compare_numerically() {
        assert!(Value::Int(1).ruby_eq(&Value::Float(1.0)));
        assert_eq!(Value::Int(2).compare(&Value::Float(1.5)), Some(Ordering::Greater));
        assert_eq!(Value::Int(2).compare(&Value::Str("a".to_owned())), None);
    }
}
