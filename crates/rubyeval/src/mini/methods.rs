//! Built-in methods of the core classes.

use std::{cmp::Ordering, ops::RangeInclusive};

use super::{
    ast::Block,
    interp::{EXCEPTION_CLASSES, Eval, MiniRuby, is_standard_error, raise},
    value::{ArrayCell, ArrayRef, MAX_NESTED_DEPTH, Value},
};
use crate::error::EvaluationError;

pub(super) fn no_method<T>(name: &str, receiver: &Value) -> Eval<T> {
    raise(
        "NoMethodError",
        format!("undefined method '{name}' for {}", receiver.describe()),
    )
}

pub(super) fn no_block<T>() -> Eval<T> {
    raise("LocalJumpError", "no block given (yield)")
}

pub(super) fn arity(args: &[Value], expected: RangeInclusive<usize>) -> Eval<()> {
    if expected.contains(&args.len()) {
        return Ok(());
    }
    let expected = if expected.start() == expected.end() {
        expected.start().to_string()
    } else {
        format!("{}..{}", expected.start(), expected.end())
    };
    raise(
        "ArgumentError",
        format!("wrong number of arguments (given {}, expected {expected})", args.len()),
    )
}

fn one_arg(args: Vec<Value>) -> Eval<Value> {
    arity(&args, 1..=1)?;
    Ok(args.into_iter().next().unwrap_or(Value::Nil))
}

fn int_arg(value: &Value) -> Eval<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Nil => raise("TypeError", "no implicit conversion from nil to integer"),
        other => raise(
            "TypeError",
            format!("no implicit conversion of {} into Integer", other.class_name()),
        ),
    }
}

fn str_arg(value: &Value) -> Eval<&str> {
    match value {
        Value::Str(text) => Ok(text),
        other => raise(
            "TypeError",
            format!("no implicit conversion of {} into String", conversion_name(other)),
        ),
    }
}

/// `nil` in conversion errors, the class name otherwise.
fn conversion_name(value: &Value) -> &str {
    match value {
        Value::Nil => "nil",
        other => other.class_name(),
    }
}

/// Largest gap `Array#[]=` fills with `nil`.
const MAX_ARRAY_GROWTH: usize = 1 << 20;

/// Longest string, in bytes, `String#*` builds.
const MAX_REPEAT_BYTES: usize = 1 << 26;

fn overflow<T>() -> Eval<T> {
    raise("RangeError", "integer overflow: bignums are not supported")
}

fn checked(value: Option<i64>) -> Eval<Value> {
    value.map_or_else(overflow, |value| Ok(Value::Int(value)))
}

fn compare_or_raise(left: &Value, right: &Value) -> Eval<Ordering> {
    left.compare(right).map_or_else(
        || {
            raise(
                "ArgumentError",
                format!(
                    "comparison of {} with {} failed",
                    left.class_name(),
                    comparison_name(right)
                ),
            )
        },
        Ok,
    )
}

fn comparison_name(value: &Value) -> String {
    match value {
        Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Symbol(_) => value.inspect(),
        other => other.class_name().to_owned(),
    }
}

fn compare_op(op: &str, ordering: Ordering) -> Value {
    Value::Bool(match op {
        "<" => ordering == Ordering::Less,
        ">" => ordering == Ordering::Greater,
        "<=" => ordering != Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

fn is_comparison(op: &str) -> bool {
    matches!(op, "<" | ">" | "<=" | ">=")
}

/// Whether `value.is_a?(class)` holds for the built-in hierarchy.
fn is_a(value: &Value, class: &str) -> bool {
    let own = value.class_name();
    own == class
        || class == "Object"
        || match value {
            Value::Int(_) | Value::Float(_) => class == "Numeric",
            Value::Exception(_) => class == "Exception" || (class == "StandardError" && is_standard_error(own)),
            _ => false,
        }
}

// =============================================================================
// Kernel conversions
// =============================================================================

pub(super) fn convert_integer(args: Vec<Value>) -> Eval<Value> {
    match one_arg(args)? {
        Value::Int(n) => Ok(Value::Int(n)),
        Value::Float(f) => float_to_int(f),
        Value::Str(text) => {
            let digits: String = text.trim().chars().filter(|ch| *ch != '_').collect();
            digits.parse().map(Value::Int).or_else(|_| {
                raise(
                    "ArgumentError",
                    format!("invalid value for Integer(): {}", Value::Str(text).inspect()),
                )
            })
        }
        Value::Nil => raise("TypeError", "can't convert nil into Integer"),
        other => raise(
            "TypeError",
            format!("can't convert {} into Integer", other.class_name()),
        ),
    }
}

pub(super) fn convert_float(args: Vec<Value>) -> Eval<Value> {
    match one_arg(args)? {
        #[expect(clippy::cast_precision_loss, reason = "Integer to Float conversion is lossy in Ruby too")]
        Value::Int(n) => Ok(Value::Float(n as f64)),
        Value::Float(f) => Ok(Value::Float(f)),
        Value::Str(text) => text.trim().replace('_', "").parse().map(Value::Float).or_else(|_| {
            raise(
                "ArgumentError",
                format!("invalid value for Float(): {}", Value::Str(text.clone()).inspect()),
            )
        }),
        Value::Nil => raise("TypeError", "can't convert nil into Float"),
        other => raise("TypeError", format!("can't convert {} into Float", other.class_name())),
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "range is checked before the cast"
)]
fn float_to_int(value: f64) -> Eval<Value> {
    if !value.is_finite() {
        return raise("FloatDomainError", super::value::format_float(value));
    }
    let truncated = value.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return overflow();
    }
    Ok(Value::Int(truncated as i64))
}

/// `String#to_i`: the leading decimal integer, 0 if there is none.
fn leading_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let mut value: i64 = 0;
    for ch in digits.chars() {
        if ch == '_' {
            continue;
        }
        let Some(digit) = ch.to_digit(10) else { break };
        value = value.saturating_mul(10).saturating_add(i64::from(digit));
    }
    if negative { -value } else { value }
}

/// `String#to_f`: the longest leading float, 0.0 if there is none.
fn leading_float(text: &str) -> f64 {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_digit() || matches!(ch, '.' | '-' | '+' | 'e' | 'E' | '_')))
        .map_or(text.len(), |(index, _)| index);
    let candidate: String = text[..end].chars().filter(|ch| *ch != '_').collect();
    (1..=candidate.len())
        .rev()
        .find_map(|len| candidate[..len].parse::<f64>().ok())
        .unwrap_or(0.0)
}

// =============================================================================
// Dispatch
// =============================================================================

impl MiniRuby {
    /// Calls `name` on `receiver`.
    pub(super) fn call_method(
        &mut self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
        block: Option<&Block>,
    ) -> Eval<Value> {
        match name {
            "inspect" if args.is_empty() => return Ok(Value::Str(receiver.inspect())),
            "to_s" if args.is_empty() => return Ok(Value::Str(receiver.to_s())),
            "class" => return Ok(Value::Class(receiver.class_name().to_owned())),
            "nil?" => return Ok(Value::Bool(matches!(receiver, Value::Nil))),
            "==" | "eql?" | "equal?" => return Ok(Value::Bool(receiver.ruby_eq(&one_arg(args)?))),
            "!=" => return Ok(Value::Bool(!receiver.ruby_eq(&one_arg(args)?))),
            "!" => return Ok(Value::Bool(!receiver.truthy())),
            "is_a?" | "kind_of?" | "instance_of?" => {
                return match one_arg(args)? {
                    Value::Class(class) if name == "instance_of?" => Ok(Value::Bool(receiver.class_name() == class)),
                    Value::Class(class) => Ok(Value::Bool(is_a(&receiver, &class))),
                    _ => raise("TypeError", "class or module required"),
                };
            }
            "itself" | "freeze" => return Ok(receiver),
            "frozen?" => return Ok(Value::Bool(!matches!(receiver, Value::Array(_)))),
            "dup" | "clone" => {
                return Ok(match receiver {
                    Value::Array(items) => Value::array(items.borrow().clone()),
                    other => other,
                });
            }
            _ => {}
        }

        match receiver {
            Value::Int(n) => self.int_method(n, name, args, block),
            Value::Float(f) => float_method(f, name, args),
            Value::Str(text) => self.str_method(text, name, args, block),
            Value::Symbol(symbol) => symbol_method(symbol, name),
            Value::Array(items) => self.array_method(&items, name, args, block),
            Value::Nil => nil_method(name, args),
            Value::Bool(value) => bool_method(value, name, args),
            Value::Class(class) => class_method(class, name, args),
            Value::Exception(error) => exception_method(error, name),
            Value::Stdout => self.stdout_method(name, &args),
            Value::Stdin => self.stdin_method(name, args, block),
            Value::Main => match self.defined_method(name) {
                Some(def) => self.call_defined(&def, args),
                None => self.call_kernel(name, args, block, false),
            },
        }
    }

    // =========================================================================
    // Integer
    // =========================================================================

    fn int_method(&mut self, n: i64, name: &str, args: Vec<Value>, block: Option<&Block>) -> Eval<Value> {
        match name {
            "+" | "-" | "*" | "/" | "%" | "**" | "<" | ">" | "<=" | ">=" => int_binary(n, name, &one_arg(args)?),
            "-@" => checked(n.checked_neg()),
            "to_i" | "to_int" | "floor" | "ceil" | "round" | "truncate" => Ok(Value::Int(n)),
            #[expect(clippy::cast_precision_loss, reason = "Integer to Float conversion is lossy in Ruby too")]
            "to_f" => Ok(Value::Float(n as f64)),
            "abs" => checked(n.checked_abs()),
            "succ" | "next" => checked(n.checked_add(1)),
            "pred" => checked(n.checked_sub(1)),
            "zero?" => Ok(Value::Bool(n == 0)),
            "even?" => Ok(Value::Bool(n % 2 == 0)),
            "odd?" => Ok(Value::Bool(n % 2 != 0)),
            "positive?" => Ok(Value::Bool(n > 0)),
            "negative?" => Ok(Value::Bool(n < 0)),
            "between?" => {
                arity(&args, 2..=2)?;
                let value = Value::Int(n);
                let above = compare_or_raise(&value, &args[0])? != Ordering::Less;
                let below = compare_or_raise(&value, &args[1])? != Ordering::Greater;
                Ok(Value::Bool(above && below))
            }
            "times" => {
                let Some(block) = block else { return no_block() };
                for i in 0..n {
                    self.call_block(block, vec![Value::Int(i)])?;
                }
                Ok(Value::Int(n))
            }
            "upto" | "downto" => {
                let Some(block) = block else { return no_block() };
                let limit = int_arg(&one_arg(args)?)?;
                if name == "upto" {
                    for i in n..=limit {
                        self.call_block(block, vec![Value::Int(i)])?;
                    }
                } else {
                    for i in (limit..=n).rev() {
                        self.call_block(block, vec![Value::Int(i)])?;
                    }
                }
                Ok(Value::Int(n))
            }
            _ => no_method(name, &Value::Int(n)),
        }
    }

    // =========================================================================
    // String
    // =========================================================================

    fn str_method(&mut self, text: String, name: &str, args: Vec<Value>, block: Option<&Block>) -> Eval<Value> {
        match name {
            "+" => {
                let other = one_arg(args)?;
                Ok(Value::Str(text + str_arg(&other)?))
            }
            "*" => {
                let count = int_arg(&one_arg(args)?)?;
                let Ok(count) = usize::try_from(count) else {
                    return raise("ArgumentError", "negative argument");
                };
                match text.len().checked_mul(count) {
                    Some(bytes) if bytes <= MAX_REPEAT_BYTES => Ok(Value::Str(text.repeat(count))),
                    _ => raise("ArgumentError", "argument too big"),
                }
            }
            "<" | ">" | "<=" | ">=" => {
                let other = one_arg(args)?;
                let ordering = compare_or_raise(&Value::Str(text), &other)?;
                Ok(compare_op(name, ordering))
            }
            "length" | "size" => Ok(count_value(text.chars().count())),
            "bytesize" => Ok(count_value(text.len())),
            "upcase" => Ok(Value::Str(text.to_uppercase())),
            "downcase" => Ok(Value::Str(text.to_lowercase())),
            "capitalize" => {
                let mut chars = text.chars();
                Ok(Value::Str(match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                    None => String::new(),
                }))
            }
            "reverse" => Ok(Value::Str(text.chars().rev().collect())),
            "strip" => Ok(Value::Str(text.trim().to_owned())),
            "lstrip" => Ok(Value::Str(text.trim_start().to_owned())),
            "rstrip" => Ok(Value::Str(text.trim_end().to_owned())),
            "chomp" => {
                let trimmed = text
                    .strip_suffix("\r\n")
                    .or_else(|| text.strip_suffix('\n'))
                    .or_else(|| text.strip_suffix('\r'))
                    .unwrap_or(&text);
                Ok(Value::Str(trimmed.to_owned()))
            }
            "chop" => {
                let mut chars = text.chars();
                chars.next_back();
                Ok(Value::Str(chars.as_str().to_owned()))
            }
            "chars" => Ok(string_array(text.chars().map(String::from))),
            "lines" => Ok(string_array(text.split_inclusive('\n').map(str::to_owned))),
            "split" => {
                arity(&args, 0..=1)?;
                let mut parts: Vec<String> = match args.first() {
                    None | Some(Value::Nil) => text.split_whitespace().map(str::to_owned).collect(),
                    Some(separator) => match str_arg(separator)? {
                        " " => text.split_whitespace().map(str::to_owned).collect(),
                        "" => text.chars().map(String::from).collect(),
                        separator => text.split(separator).map(str::to_owned).collect(),
                    },
                };
                while parts.last().is_some_and(String::is_empty) {
                    parts.pop();
                }
                Ok(string_array(parts.into_iter()))
            }
            "to_i" => Ok(Value::Int(leading_int(&text))),
            "to_f" => Ok(Value::Float(leading_float(&text))),
            "to_str" => Ok(Value::Str(text)),
            "to_sym" | "intern" => Ok(Value::Symbol(text)),
            "empty?" => Ok(Value::Bool(text.is_empty())),
            "include?" | "start_with?" | "end_with?" => {
                let other = one_arg(args)?;
                let needle = str_arg(&other)?;
                Ok(Value::Bool(match name {
                    "include?" => text.contains(needle),
                    "start_with?" => text.starts_with(needle),
                    _ => text.ends_with(needle),
                }))
            }
            "index" => {
                let other = one_arg(args)?;
                let needle = str_arg(&other)?;
                Ok(text
                    .find(needle)
                    .map_or(Value::Nil, |byte| count_value(text[..byte].chars().count())))
            }
            "[]" => match one_arg(args)? {
                Value::Int(index) => {
                    let chars: Vec<char> = text.chars().collect();
                    Ok(resolve_index(index, chars.len()).map_or(Value::Nil, |i| Value::Str(chars[i].to_string())))
                }
                Value::Str(needle) => Ok(if text.contains(&needle) {
                    Value::Str(needle)
                } else {
                    Value::Nil
                }),
                other => raise(
                    "TypeError",
                    format!("no implicit conversion of {} into Integer", conversion_name(&other)),
                ),
            },
            "sub" | "gsub" => {
                arity(&args, 2..=2)?;
                let pattern = str_arg(&args[0])?;
                let replacement = str_arg(&args[1])?;
                Ok(Value::Str(if name == "sub" {
                    text.replacen(pattern, replacement, 1)
                } else {
                    text.replace(pattern, replacement)
                }))
            }
            "center" | "ljust" | "rjust" => {
                arity(&args, 1..=2)?;
                let width = usize::try_from(int_arg(&args[0])?).unwrap_or(0);
                let pad = match args.get(1) {
                    Some(pad) => str_arg(pad)?.to_owned(),
                    None => " ".to_owned(),
                };
                if pad.is_empty() {
                    return raise("ArgumentError", "zero width padding");
                }
                Ok(Value::Str(justify(&text, width, &pad, name)))
            }
            "ord" => match text.chars().next() {
                Some(ch) => Ok(Value::Int(i64::from(u32::from(ch)))),
                None => raise("ArgumentError", "empty string"),
            },
            "each_char" => {
                let Some(block) = block else { return no_block() };
                for ch in text.chars() {
                    self.call_block(block, vec![Value::Str(ch.to_string())])?;
                }
                Ok(Value::Str(text))
            }
            _ => no_method(name, &Value::Str(text)),
        }
    }

    // =========================================================================
    // Array
    // =========================================================================

    #[expect(clippy::too_many_lines, reason = "one arm per Array method")]
    fn array_method(&mut self, items: &ArrayRef, name: &str, args: Vec<Value>, block: Option<&Block>) -> Eval<Value> {
        let this = || Value::Array(items.clone());
        match name {
            "length" | "size" => Ok(count_value(items.borrow().len())),
            "empty?" => Ok(Value::Bool(items.borrow().is_empty())),
            "first" | "last" => {
                arity(&args, 0..=1)?;
                let items = items.borrow();
                match args.first() {
                    None => {
                        let item = if name == "first" { items.first() } else { items.last() };
                        Ok(item.cloned().unwrap_or(Value::Nil))
                    }
                    Some(count) => {
                        let count = usize::try_from(int_arg(count)?).unwrap_or(0).min(items.len());
                        let slice = if name == "first" {
                            &items[..count]
                        } else {
                            &items[items.len() - count..]
                        };
                        Ok(Value::array(slice.to_vec()))
                    }
                }
            }
            "push" | "append" | "<<" => {
                if name == "<<" {
                    arity(&args, 1..=1)?;
                }
                items.borrow_mut().extend(args);
                Ok(this())
            }
            "unshift" | "prepend" => {
                let mut items = items.borrow_mut();
                for (index, item) in args.into_iter().enumerate() {
                    items.insert(index, item);
                }
                Ok(this())
            }
            "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Nil)),
            "shift" => {
                let mut items = items.borrow_mut();
                Ok(if items.is_empty() { Value::Nil } else { items.remove(0) })
            }
            "clear" => {
                items.borrow_mut().clear();
                Ok(this())
            }
            "[]" => {
                let index = int_arg(&one_arg(args)?)?;
                let items = items.borrow();
                Ok(resolve_index(index, items.len()).map_or(Value::Nil, |i| items[i].clone()))
            }
            "[]=" => {
                arity(&args, 2..=2)?;
                let mut args = args.into_iter();
                let index = int_arg(&args.next().unwrap_or(Value::Nil))?;
                let value = args.next().unwrap_or(Value::Nil);
                let mut items = items.borrow_mut();
                let len = items.len();
                let slot = if index < 0 {
                    resolve_index(index, len).map_or_else(
                        || {
                            raise(
                                "IndexError",
                                format!("index {index} too small for array; minimum: -{len}"),
                            )
                        },
                        Ok,
                    )?
                } else {
                    usize::try_from(index).unwrap_or(usize::MAX)
                };
                if slot >= items.len() {
                    if slot - items.len() > MAX_ARRAY_GROWTH {
                        return raise("IndexError", format!("index {index} too big"));
                    }
                    items.resize(slot + 1, Value::Nil);
                }
                items[slot] = value.clone();
                Ok(value)
            }
            "include?" => {
                let needle = one_arg(args)?;
                Ok(Value::Bool(items.borrow().iter().any(|item| item.ruby_eq(&needle))))
            }
            "index" | "find_index" => {
                let needle = one_arg(args)?;
                Ok(items
                    .borrow()
                    .iter()
                    .position(|item| item.ruby_eq(&needle))
                    .map_or(Value::Nil, count_value))
            }
            "reverse" => Ok(Value::array(items.borrow().iter().rev().cloned().collect())),
            "join" => {
                arity(&args, 0..=1)?;
                let separator = match args.first() {
                    None | Some(Value::Nil) => String::new(),
                    Some(separator) => str_arg(separator)?.to_owned(),
                };
                let mut out = String::new();
                join_into(items, &separator, &mut out, &mut 0, &mut Vec::new())?;
                Ok(Value::Str(out))
            }
            "sum" => {
                let mut total = args.into_iter().next().unwrap_or(Value::Int(0));
                for item in snapshot(items) {
                    total = self.call_method(total, "+", vec![item], None)?;
                }
                Ok(total)
            }
            "min" | "max" => {
                let wanted = if name == "min" { Ordering::Less } else { Ordering::Greater };
                let mut best: Option<Value> = None;
                for item in snapshot(items) {
                    best = Some(match best {
                        Some(current) if compare_or_raise(&item, &current)? != wanted => current,
                        _ => item,
                    });
                }
                Ok(best.unwrap_or(Value::Nil))
            }
            "sort" => {
                let mut sorted = snapshot(items);
                // every element must compare with the first, which makes the order total
                if let Some(first) = sorted.first() {
                    for item in &sorted {
                        compare_or_raise(first, item)?;
                    }
                }
                sorted.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
                Ok(Value::array(sorted))
            }
            "uniq" => {
                let mut unique: Vec<Value> = Vec::new();
                for item in snapshot(items) {
                    if !unique.iter().any(|seen| seen.ruby_eq(&item)) {
                        unique.push(item);
                    }
                }
                Ok(Value::array(unique))
            }
            "compact" => Ok(Value::array(
                snapshot(items)
                    .into_iter()
                    .filter(|item| !matches!(item, Value::Nil))
                    .collect(),
            )),
            "flatten" => {
                let mut flat = Vec::new();
                flatten_into(items, &mut flat, &mut Vec::new())?;
                Ok(Value::array(flat))
            }
            "+" => match one_arg(args)? {
                Value::Array(other) => {
                    let mut joined = snapshot(items);
                    joined.extend(snapshot(&other));
                    Ok(Value::array(joined))
                }
                other => raise(
                    "TypeError",
                    format!("no implicit conversion of {} into Array", conversion_name(&other)),
                ),
            },
            "-" => match one_arg(args)? {
                Value::Array(other) => {
                    let other = snapshot(&other);
                    Ok(Value::array(
                        snapshot(items)
                            .into_iter()
                            .filter(|item| !other.iter().any(|o| o.ruby_eq(item)))
                            .collect(),
                    ))
                }
                other => raise(
                    "TypeError",
                    format!("no implicit conversion of {} into Array", conversion_name(&other)),
                ),
            },
            "take" | "drop" => {
                let count = int_arg(&one_arg(args)?)?;
                let Ok(count) = usize::try_from(count) else {
                    return raise("ArgumentError", format!("attempt to {name} negative size"));
                };
                let all = snapshot(items);
                let count = count.min(all.len());
                Ok(Value::array(if name == "take" {
                    all[..count].to_vec()
                } else {
                    all[count..].to_vec()
                }))
            }
            "to_a" | "entries" => Ok(this()),
            "count" => match (args.first(), block) {
                (Some(needle), _) => Ok(count_value(
                    items.borrow().iter().filter(|item| item.ruby_eq(needle)).count(),
                )),
                (None, Some(block)) => {
                    let mut count = 0;
                    for item in snapshot(items) {
                        if self.call_block(block, vec![item])?.truthy() {
                            count += 1;
                        }
                    }
                    Ok(count_value(count))
                }
                (None, None) => Ok(count_value(items.borrow().len())),
            },
            "each" | "each_with_index" | "map" | "collect" | "select" | "filter" | "reject" | "find" | "detect"
            | "each_with_object" | "inject" | "reduce" | "any?" | "all?" | "none?" => {
                self.array_iteration(items, name, args, block)
            }
            _ => no_method(name, &this()),
        }
    }

    /// Array methods that run a block per element.
    fn array_iteration(
        &mut self,
        items: &ArrayRef,
        name: &str,
        args: Vec<Value>,
        block: Option<&Block>,
    ) -> Eval<Value> {
        if matches!(name, "any?" | "all?" | "none?") && block.is_none() {
            let all = snapshot(items);
            return Ok(Value::Bool(match name {
                "any?" => all.iter().any(Value::truthy),
                "all?" => all.iter().all(Value::truthy),
                _ => !all.iter().any(Value::truthy),
            }));
        }
        let Some(block) = block else { return no_block() };

        match name {
            "each" => {
                for item in snapshot(items) {
                    self.call_block(block, vec![item])?;
                }
                Ok(Value::Array(items.clone()))
            }
            "each_with_index" => {
                for (index, item) in snapshot(items).into_iter().enumerate() {
                    self.call_block(block, vec![item, count_value(index)])?;
                }
                Ok(Value::Array(items.clone()))
            }
            "map" | "collect" => {
                let mut mapped = Vec::new();
                for item in snapshot(items) {
                    mapped.push(self.call_block(block, vec![item])?);
                }
                Ok(Value::array(mapped))
            }
            "select" | "filter" | "reject" => {
                let keep = name != "reject";
                let mut kept = Vec::new();
                for item in snapshot(items) {
                    if self.call_block(block, vec![item.clone()])?.truthy() == keep {
                        kept.push(item);
                    }
                }
                Ok(Value::array(kept))
            }
            "find" | "detect" => {
                for item in snapshot(items) {
                    if self.call_block(block, vec![item.clone()])?.truthy() {
                        return Ok(item);
                    }
                }
                Ok(Value::Nil)
            }
            "each_with_object" => {
                let memo = one_arg(args)?;
                for item in snapshot(items) {
                    self.call_block(block, vec![item, memo.clone()])?;
                }
                Ok(memo)
            }
            "inject" | "reduce" => {
                arity(&args, 0..=1)?;
                let mut all = snapshot(items).into_iter();
                let mut acc = match args.into_iter().next() {
                    Some(initial) => initial,
                    None => all.next().unwrap_or(Value::Nil),
                };
                for item in all {
                    acc = self.call_block(block, vec![acc, item])?;
                }
                Ok(acc)
            }
            _ => {
                // any? / all? / none? with a block
                let mut hits = 0;
                let all = snapshot(items);
                let total = all.len();
                for item in all {
                    if self.call_block(block, vec![item])?.truthy() {
                        hits += 1;
                    }
                }
                Ok(Value::Bool(match name {
                    "any?" => hits > 0,
                    "all?" => hits == total,
                    _ => hits == 0,
                }))
            }
        }
    }
}

// =============================================================================
// Float, Symbol, nil, booleans, classes, exceptions
// =============================================================================

fn float_method(f: f64, name: &str, args: Vec<Value>) -> Eval<Value> {
    match name {
        "+" | "-" | "*" | "/" | "%" | "**" | "<" | ">" | "<=" | ">=" => float_binary(f, name, &one_arg(args)?),
        "-@" => Ok(Value::Float(-f)),
        "to_f" => Ok(Value::Float(f)),
        "to_i" | "to_int" | "truncate" => float_to_int(f),
        "floor" => float_to_int(f.floor()),
        "ceil" => float_to_int(f.ceil()),
        "round" => {
            arity(&args, 0..=1)?;
            match args.first() {
                None => float_to_int(f.round()),
                Some(digits) => {
                    let digits = int_arg(digits)?;
                    let exponent = i32::try_from(digits.unsigned_abs().min(400)).unwrap_or_default();
                    let scale = 10f64.powi(exponent);
                    if digits <= 0 {
                        let rounded = if scale.is_finite() { (f / scale).round() * scale } else { 0.0 * f };
                        return float_to_int(rounded);
                    }
                    // past 2**52 every float is integral, so there is nothing left to round
                    let scaled = f * scale;
                    if !scaled.is_finite() || scaled.abs() >= 4_503_599_627_370_496.0 {
                        return Ok(Value::Float(f));
                    }
                    Ok(Value::Float(scaled.round() / scale))
                }
            }
        }
        "abs" => Ok(Value::Float(f.abs())),
        "nan?" => Ok(Value::Bool(f.is_nan())),
        "finite?" => Ok(Value::Bool(f.is_finite())),
        "infinite?" => Ok(if f.is_infinite() {
            Value::Int(if f > 0.0 { 1 } else { -1 })
        } else {
            Value::Nil
        }),
        "zero?" => Ok(Value::Bool(f == 0.0)),
        _ => no_method(name, &Value::Float(f)),
    }
}

fn symbol_method(symbol: String, name: &str) -> Eval<Value> {
    match name {
        "to_sym" => Ok(Value::Symbol(symbol)),
        "name" | "id2name" => Ok(Value::Str(symbol)),
        "length" | "size" => Ok(count_value(symbol.chars().count())),
        _ => no_method(name, &Value::Symbol(symbol)),
    }
}

fn nil_method(name: &str, args: Vec<Value>) -> Eval<Value> {
    match name {
        "to_a" => Ok(Value::array(Vec::new())),
        "to_i" => Ok(Value::Int(0)),
        "to_f" => Ok(Value::Float(0.0)),
        "&" => {
            one_arg(args)?;
            Ok(Value::Bool(false))
        }
        "|" => Ok(Value::Bool(one_arg(args)?.truthy())),
        _ => no_method(name, &Value::Nil),
    }
}

fn bool_method(value: bool, name: &str, args: Vec<Value>) -> Eval<Value> {
    match name {
        "&" => Ok(Value::Bool(value && one_arg(args)?.truthy())),
        "|" => Ok(Value::Bool(value || one_arg(args)?.truthy())),
        "^" => Ok(Value::Bool(value != one_arg(args)?.truthy())),
        _ => no_method(name, &Value::Bool(value)),
    }
}

fn class_method(class: String, name: &str, args: Vec<Value>) -> Eval<Value> {
    match name {
        "name" => Ok(Value::Str(class)),
        "new" if EXCEPTION_CLASSES.contains(&class.as_str()) => {
            arity(&args, 0..=1)?;
            let message = args.first().map_or_else(|| class.clone(), Value::to_s);
            Ok(Value::Exception(EvaluationError::new(class, message)))
        }
        "new" if class == "Array" => {
            arity(&args, 0..=2)?;
            let size = match args.first() {
                Some(size) => usize::try_from(int_arg(size)?).or_else(|_| raise("ArgumentError", "negative array size"))?,
                None => 0,
            };
            let fill = args.get(1).cloned().unwrap_or(Value::Nil);
            Ok(Value::array(vec![fill; size]))
        }
        "new" if class == "String" => {
            arity(&args, 0..=1)?;
            match args.first() {
                Some(text) => Ok(Value::Str(str_arg(text)?.to_owned())),
                None => Ok(Value::Str(String::new())),
            }
        }
        _ => no_method(name, &Value::Class(class)),
    }
}

fn exception_method(error: EvaluationError, name: &str) -> Eval<Value> {
    match name {
        "message" => Ok(Value::Str(error.message)),
        "full_message" => Ok(Value::Str(error.to_string())),
        _ => no_method(name, &Value::Exception(error)),
    }
}

// =============================================================================
// Numeric operators
// =============================================================================

fn int_binary(n: i64, op: &str, rhs: &Value) -> Eval<Value> {
    let m = match rhs {
        Value::Int(m) => *m,
        #[expect(clippy::cast_precision_loss, reason = "mixed arithmetic promotes to Float")]
        Value::Float(_) => return float_binary(n as f64, op, rhs),
        other if is_comparison(op) => {
            return raise(
                "ArgumentError",
                format!("comparison of Integer with {} failed", comparison_name(other)),
            );
        }
        other => {
            return raise(
                "TypeError",
                format!("{} can't be coerced into Integer", conversion_name(other)),
            );
        }
    };
    match op {
        "+" => checked(n.checked_add(m)),
        "-" => checked(n.checked_sub(m)),
        "*" => checked(n.checked_mul(m)),
        "/" | "%" if m == 0 => raise("ZeroDivisionError", "divided by 0"),
        "/" => {
            let quotient = n.checked_div(m).map_or_else(overflow, Ok)?;
            // Ruby rounds toward negative infinity
            let floored = if n % m != 0 && ((n < 0) != (m < 0)) { quotient - 1 } else { quotient };
            Ok(Value::Int(floored))
        }
        "%" => {
            let remainder = n.checked_rem(m).map_or_else(overflow, Ok)?;
            // the result takes the sign of the divisor
            let adjusted = if remainder != 0 && ((remainder < 0) != (m < 0)) { remainder + m } else { remainder };
            Ok(Value::Int(adjusted))
        }
        "**" => match u32::try_from(m) {
            Ok(exponent) => checked(n.checked_pow(exponent)),
            #[expect(clippy::cast_precision_loss, reason = "negative powers are fractional")]
            Err(_) => Ok(Value::Float((n as f64).powf(m as f64))),
        },
        _ => Ok(compare_op(op, n.cmp(&m))),
    }
}

fn float_binary(a: f64, op: &str, rhs: &Value) -> Eval<Value> {
    let b = match rhs {
        #[expect(clippy::cast_precision_loss, reason = "mixed arithmetic promotes to Float")]
        Value::Int(m) => *m as f64,
        Value::Float(b) => *b,
        other if is_comparison(op) => {
            return raise(
                "ArgumentError",
                format!("comparison of Float with {} failed", comparison_name(other)),
            );
        }
        other => {
            return raise(
                "TypeError",
                format!("{} can't be coerced into Float", conversion_name(other)),
            );
        }
    };
    Ok(match op {
        "+" => Value::Float(a + b),
        "-" => Value::Float(a - b),
        "*" => Value::Float(a * b),
        "/" => Value::Float(a / b),
        "%" => Value::Float(a - b * (a / b).floor()),
        "**" => Value::Float(a.powf(b)),
        _ => match a.partial_cmp(&b) {
            Some(ordering) => compare_op(op, ordering),
            None => Value::Bool(false),
        },
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn count_value(count: usize) -> Value {
    Value::Int(i64::try_from(count).unwrap_or(i64::MAX))
}

fn string_array(strings: impl Iterator<Item = String>) -> Value {
    Value::array(strings.map(Value::Str).collect())
}

fn snapshot(items: &ArrayRef) -> Vec<Value> {
    items.borrow().clone()
}

/// Resolves a possibly negative index against `len`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

fn justify(text: &str, width: usize, pad: &str, mode: &str) -> String {
    let len = text.chars().count();
    if width <= len {
        return text.to_owned();
    }
    let total = width - len;
    let (left, right) = match mode {
        "ljust" => (0, total),
        "rjust" => (total, 0),
        _ => (total / 2, total - total / 2),
    };
    let padding = |count: usize| pad.chars().cycle().take(count).collect::<String>();
    format!("{}{text}{}", padding(left), padding(right))
}

/// Pushes `items` onto the stack of arrays being walked.
fn enter_array(items: &ArrayRef, open: &mut Vec<*const ArrayCell>, recursive: &str) -> Eval<()> {
    let ptr = std::rc::Rc::as_ptr(items);
    if open.contains(&ptr) {
        return raise("ArgumentError", recursive);
    }
    if open.len() >= MAX_NESTED_DEPTH {
        return raise("SystemStackError", "stack level too deep");
    }
    open.push(ptr);
    Ok(())
}

fn join_into(
    items: &ArrayRef,
    separator: &str,
    out: &mut String,
    written: &mut usize,
    open: &mut Vec<*const ArrayCell>,
) -> Eval<()> {
    enter_array(items, open, "recursive array join")?;
    for item in items.borrow().iter() {
        if let Value::Array(nested) = item {
            join_into(nested, separator, out, written, open)?;
            continue;
        }
        if *written > 0 {
            out.push_str(separator);
        }
        out.push_str(&item.to_s());
        *written += 1;
    }
    open.pop();
    Ok(())
}

fn flatten_into(items: &ArrayRef, flat: &mut Vec<Value>, open: &mut Vec<*const ArrayCell>) -> Eval<()> {
    enter_array(items, open, "tried to flatten recursive array")?;
    for item in items.borrow().iter() {
        match item {
            Value::Array(nested) => flatten_into(nested, flat, open)?,
            other => flat.push(other.clone()),
        }
    }
    open.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mini::interp::Unwind;

    #[test]
    fn integer_division_floors() {
        assert!(matches!(int_binary(-7, "/", &Value::Int(2)), Ok(Value::Int(-4))));
        assert!(matches!(int_binary(7, "%", &Value::Int(-3)), Ok(Value::Int(-2))));
        assert!(matches!(
            int_binary(1, "/", &Value::Int(0)),
            Err(Unwind::Raise(EvaluationError { ref class, .. })) if class == "ZeroDivisionError"
        ));
    }

    #[test]
    fn leading_numbers_parse_like_ruby() {
        assert_eq!(leading_int("  42abc"), 42);
        assert_eq!(leading_int("-1_000"), -1000);
        assert_eq!(leading_int("abc"), 0);
        assert!((leading_float("3.5kg") - 3.5).abs() < f64::EPSILON);
        assert!(leading_float("x").abs() < f64::EPSILON);
    }

    #[test]
    fn negative_indexes_count_from_the_end() {
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(3, 3), None);
        assert_eq!(resolve_index(-4, 3), None);
    }

    #[test]
    fn justify_pads_with_repeating_pattern() {
        assert_eq!(justify("ab", 6, "*-", "center"), "*-ab*-");
        assert_eq!(justify("ab", 5, " ", "rjust"), "   ab");
    }
}
