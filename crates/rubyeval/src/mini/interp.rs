//! Tree-walking evaluator.
//!
//! State that survives between `eval_inspect` calls: top-level locals, globals,
//! constants and `def`-ined methods. Control flow that leaves an expression early
//! (exceptions, `return`, and the input suspension signal) travels as [`Unwind`].

use std::{cell::RefMut, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;

use super::{
    ast::{Block, Expr, ExprLoc, MethodDef, Rescue, StrPart, Target},
    parser::parse_program,
    value::{ArrayCell, MAX_NESTED_DEPTH, Value},
};
use crate::{
    engine::{Channels, Engine, EngineError},
    error::EvaluationError,
    input::{InputChannel, InputError},
    io::OutputCapture,
    version::RubyVersion,
};

/// Nested method calls allowed before `SystemStackError`.
#[cfg(debug_assertions)]
const MAX_CALL_DEPTH: usize = 64;
#[cfg(not(debug_assertions))]
const MAX_CALL_DEPTH: usize = 1_000;

/// Exception classes resolvable as constants.
pub(super) const EXCEPTION_CLASSES: &[&str] = &[
    "Exception",
    "StandardError",
    "RuntimeError",
    "ArgumentError",
    "TypeError",
    "NameError",
    "NoMethodError",
    "ZeroDivisionError",
    "EOFError",
    "IOError",
    "IndexError",
    "KeyError",
    "RangeError",
    "FloatDomainError",
    "LocalJumpError",
    "NotImplementedError",
    "SystemStackError",
];

const CORE_CLASSES: &[&str] = &[
    "Object", "Integer", "Float", "Numeric", "String", "Symbol", "Array", "NilClass", "TrueClass", "FalseClass", "IO",
    "Class",
];

/// Exceptions a bare `rescue` does not catch.
const NON_STANDARD_ERRORS: &[&str] = &["Exception", "NotImplementedError", "SystemStackError", "SyntaxError"];

pub(super) fn is_standard_error(class: &str) -> bool {
    !NON_STANDARD_ERRORS.contains(&class)
}

/// Early exit from evaluation.
#[derive(Debug)]
pub(super) enum Unwind {
    Raise(EvaluationError),
    /// `$stdin` ran dry; the statement is abandoned and replayed later.
    InputRequired,
    Return(Value),
}

impl From<EvaluationError> for Unwind {
    fn from(error: EvaluationError) -> Self {
        Self::Raise(error)
    }
}

impl From<InputError> for Unwind {
    fn from(error: InputError) -> Self {
        match EngineError::from(error) {
            EngineError::InputRequired => Self::InputRequired,
            EngineError::Raised(error) => Self::Raise(error),
        }
    }
}

pub(super) type Eval<T> = Result<T, Unwind>;

pub(super) fn raise<T>(class: &str, message: impl Into<String>) -> Eval<T> {
    Err(Unwind::Raise(EvaluationError::new(class, message)))
}

/// A small Ruby interpreter with persistent state.
///
/// Covers the statement-level core of the language: literals, local and global
/// variables, operators, `if`/`unless`/`while`/`until`, `def`, blocks on the common
/// iteration methods, `begin`/`rescue`, and `$stdout`/`$stdin`.
pub struct MiniRuby {
    version: RubyVersion,
    channels: Option<Channels>,
    /// Locals of the running method, or the top-level locals when `depth` is 0.
    locals: IndexMap<String, Value>,
    depth: usize,
    globals: AHashMap<String, Value>,
    constants: AHashMap<String, Value>,
    methods: AHashMap<String, Rc<MethodDef>>,
}

impl MiniRuby {
    #[must_use]
    pub fn new(version: RubyVersion) -> Self {
        let mut constants = AHashMap::new();
        constants.insert(
            "RUBY_VERSION".to_owned(),
            Value::Str(version.ruby_version_string().to_owned()),
        );
        constants.insert("STDOUT".to_owned(), Value::Stdout);
        constants.insert("STDIN".to_owned(), Value::Stdin);
        Self {
            version,
            channels: None,
            locals: IndexMap::new(),
            depth: 0,
            globals: AHashMap::new(),
            constants,
            methods: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn version(&self) -> RubyVersion {
        self.version
    }

    // -------------------------------------------------------------------------
    // channels
    // -------------------------------------------------------------------------

    fn output(&self) -> Eval<RefMut<'_, OutputCapture>> {
        match &self.channels {
            Some(channels) => Ok(channels.output.borrow_mut()),
            None => raise("IOError", "not opened for writing"),
        }
    }

    fn input(&self) -> Eval<RefMut<'_, InputChannel>> {
        match &self.channels {
            Some(channels) => Ok(channels.input.borrow_mut()),
            None => raise("IOError", "not opened for reading"),
        }
    }

    pub(super) fn write_out(&self, text: &str) -> Eval<()> {
        self.output()?
            .write(Some(text))
            .or_else(|err| raise("IOError", err.to_string()))
    }

    pub(super) fn flush_out(&self) -> Eval<()> {
        self.output()?.flush().or_else(|err| raise("IOError", err.to_string()))
    }

    // -------------------------------------------------------------------------
    // evaluation
    // -------------------------------------------------------------------------

    fn eval(&mut self, node: &ExprLoc) -> Eval<Value> {
        match &node.expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::True => Ok(Value::Bool(true)),
            Expr::False => Ok(Value::Bool(false)),
            Expr::SelfRef => Ok(Value::Main),
            Expr::Int(value) => Ok(Value::Int(*value)),
            Expr::Float(value) => Ok(Value::Float(*value)),
            Expr::Str(parts) => self.interpolate(parts).map(Value::Str),
            Expr::Symbol(name) => Ok(Value::Symbol(name.clone())),
            Expr::Array(items) => Ok(Value::array(self.eval_all(items)?)),
            Expr::LocalVar(name) => Ok(self.locals.get(name).cloned().unwrap_or(Value::Nil)),
            Expr::GlobalVar(name) => Ok(self.globals.get(name).cloned().unwrap_or(Value::Nil)),
            Expr::Const(name) => self.constant(name),
            Expr::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value.clone())?;
                Ok(value)
            }
            Expr::OpAssign { target, op, value } => self.op_assign(target, op.map(|op| op.method_name()), value),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.call_method(left, op.method_name(), vec![right], None)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() { self.eval(right) } else { Ok(left) }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() { Ok(left) } else { self.eval(right) }
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.truthy())),
            Expr::Neg(inner) => {
                let value = self.eval(inner)?;
                self.call_method(value, "-@", Vec::new(), None)
            }
            Expr::Call {
                receiver: Some(receiver),
                name,
                args,
                block,
            } => {
                let receiver = self.eval(receiver)?;
                let args = self.eval_all(args)?;
                self.call_method(receiver, name, args, block.as_deref())
            }
            Expr::Call {
                receiver: None,
                name,
                args,
                block,
            } => self.call_function(name, args, block.as_deref()),
            Expr::Index { receiver, index } => {
                let receiver = self.eval(receiver)?;
                let index = self.eval(index)?;
                self.call_method(receiver, "[]", vec![index], None)
            }
            Expr::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval_body(then_body)
                } else {
                    self.eval_body(else_body)
                }
            }
            Expr::While { cond, body, until } => {
                while self.eval(cond)?.truthy() != *until {
                    self.eval_body(body)?;
                }
                Ok(Value::Nil)
            }
            Expr::Def(def) => {
                self.methods.insert(def.name.clone(), Rc::clone(def));
                Ok(Value::Symbol(def.name.clone()))
            }
            Expr::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(value)?,
                    None => Value::Nil,
                };
                Err(Unwind::Return(value))
            }
            Expr::Begin { body, rescue } => self.begin(body, rescue.as_ref()),
        }
    }

    fn eval_all(&mut self, nodes: &[ExprLoc]) -> Eval<Vec<Value>> {
        nodes.iter().map(|node| self.eval(node)).collect()
    }

    fn eval_body(&mut self, body: &[ExprLoc]) -> Eval<Value> {
        let mut last = Value::Nil;
        for node in body {
            last = self.eval(node)?;
        }
        Ok(last)
    }

    fn interpolate(&mut self, parts: &[StrPart]) -> Eval<String> {
        let mut text = String::new();
        for part in parts {
            match part {
                StrPart::Lit(literal) => text.push_str(literal),
                StrPart::Interp(body) => text.push_str(&self.eval_body(body)?.to_s()),
            }
        }
        Ok(text)
    }

    fn constant(&self, name: &str) -> Eval<Value> {
        if let Some(value) = self.constants.get(name) {
            return Ok(value.clone());
        }
        if EXCEPTION_CLASSES.contains(&name) || CORE_CLASSES.contains(&name) {
            return Ok(Value::Class(name.to_owned()));
        }
        raise("NameError", format!("uninitialized constant {name}"))
    }

    fn assign(&mut self, target: &Target, value: Value) -> Eval<()> {
        match target {
            Target::Local(name) => {
                self.locals.insert(name.clone(), value);
            }
            Target::Global(name) => self.assign_global(name, value)?,
            Target::Const(name) => {
                self.constants.insert(name.clone(), value);
            }
            Target::Index { receiver, index } => {
                let receiver = self.eval(receiver)?;
                let index = self.eval(index)?;
                self.call_method(receiver, "[]=", vec![index, value], None)?;
            }
        }
        Ok(())
    }

    fn assign_global(&mut self, name: &str, value: Value) -> Eval<()> {
        if name == "stdout" && !matches!(value, Value::Stdout) {
            return raise(
                "TypeError",
                format!("$stdout must have write method, {} given", value.class_name()),
            );
        }
        self.globals.insert(name.to_owned(), value);
        Ok(())
    }

    /// `target op= value`; `op` is `None` for `||=`.
    fn op_assign(&mut self, target: &Target, op: Option<&str>, value: &ExprLoc) -> Eval<Value> {
        // an indexed target evaluates its receiver and index once
        let (current, place) = match target {
            Target::Index { receiver, index } => {
                let receiver = self.eval(receiver)?;
                let index = self.eval(index)?;
                let current = self.call_method(receiver.clone(), "[]", vec![index.clone()], None)?;
                (current, Some((receiver, index)))
            }
            Target::Local(name) => (self.locals.get(name).cloned().unwrap_or(Value::Nil), None),
            Target::Global(name) => (self.globals.get(name).cloned().unwrap_or(Value::Nil), None),
            Target::Const(name) => (self.constants.get(name).cloned().unwrap_or(Value::Nil), None),
        };

        let result = match op {
            None if current.truthy() => return Ok(current),
            None => self.eval(value)?,
            Some(op) => {
                let rhs = self.eval(value)?;
                self.call_method(current, op, vec![rhs], None)?
            }
        };

        match place {
            Some((receiver, index)) => {
                self.call_method(receiver, "[]=", vec![index, result.clone()], None)?;
            }
            None => self.assign(target, result.clone())?,
        }
        Ok(result)
    }

    fn begin(&mut self, body: &[ExprLoc], rescue: Option<&Rescue>) -> Eval<Value> {
        match self.eval_body(body) {
            Err(Unwind::Raise(error)) => match rescue {
                Some(rescue) if is_standard_error(&error.class) => {
                    if let Some(name) = &rescue.binding {
                        self.locals.insert(name.clone(), Value::Exception(error));
                    }
                    self.eval_body(&rescue.body)
                }
                _ => Err(Unwind::Raise(error)),
            },
            other => other,
        }
    }

    // -------------------------------------------------------------------------
    // calls
    // -------------------------------------------------------------------------

    /// A call without an explicit receiver: a user method or a `Kernel` method.
    fn call_function(&mut self, name: &str, arg_nodes: &[ExprLoc], block: Option<&Block>) -> Eval<Value> {
        if arg_nodes.is_empty()
            && block.is_none()
            && let Some(value) = self.locals.get(name)
        {
            return Ok(value.clone());
        }
        let args = self.eval_all(arg_nodes)?;
        if let Some(def) = self.defined_method(name) {
            return self.call_defined(&def, args);
        }
        self.call_kernel(name, args, block, arg_nodes.is_empty())
    }

    pub(super) fn defined_method(&self, name: &str) -> Option<Rc<MethodDef>> {
        self.methods.get(name).cloned()
    }

    pub(super) fn call_defined(&mut self, def: &MethodDef, args: Vec<Value>) -> Eval<Value> {
        if args.len() != def.params.len() {
            return raise(
                "ArgumentError",
                format!(
                    "wrong number of arguments (given {}, expected {})",
                    args.len(),
                    def.params.len()
                ),
            );
        }
        if self.depth >= MAX_CALL_DEPTH {
            return raise("SystemStackError", "stack level too deep");
        }

        let frame: IndexMap<String, Value> = def.params.iter().cloned().zip(args).collect();
        let outer = std::mem::replace(&mut self.locals, frame);
        self.depth += 1;
        let result = self.eval_body(&def.body);
        self.depth -= 1;
        self.locals = outer;

        match result {
            Err(Unwind::Return(value)) => Ok(value),
            other => other,
        }
    }

    /// Runs a block with `args` bound to its parameters.
    ///
    /// Parameters and variables first assigned inside the block are dropped afterwards;
    /// outer variables the block assigns keep their new values.
    pub(super) fn call_block(&mut self, block: &Block, args: Vec<Value>) -> Eval<Value> {
        let mark = self.locals.len();
        let shadowed: Vec<(String, Value)> = block
            .params
            .iter()
            .filter_map(|param| self.locals.get(param).map(|value| (param.clone(), value.clone())))
            .collect();

        // a single array argument is spread over several parameters
        let spread = match args.as_slice() {
            [Value::Array(items)] if block.params.len() > 1 => Some(items.borrow().clone()),
            _ => None,
        };
        let values = spread.unwrap_or(args);
        for (index, param) in block.params.iter().enumerate() {
            let value = values.get(index).cloned().unwrap_or(Value::Nil);
            self.locals.insert(param.clone(), value);
        }

        let result = self.eval_body(&block.body);

        self.locals.truncate(mark);
        for (name, value) in shadowed {
            self.locals.insert(name, value);
        }
        result
    }

    /// `Kernel` methods callable on `main`.
    pub(super) fn call_kernel(&mut self, name: &str, args: Vec<Value>, block: Option<&Block>, bare: bool) -> Eval<Value> {
        match name {
            "puts" => self.puts(&args),
            "print" => {
                for arg in &args {
                    self.write_out(&arg.to_s())?;
                }
                Ok(Value::Nil)
            }
            "p" => {
                for arg in &args {
                    self.write_out(&format!("{}\n", arg.inspect()))?;
                }
                let mut args = args;
                Ok(match args.len() {
                    0 => Value::Nil,
                    1 => args.pop().unwrap_or(Value::Nil),
                    _ => Value::array(args),
                })
            }
            "gets" | "readline" | "readlines" => self.stdin_method(name, args, block),
            "raise" | "fail" => Err(Unwind::Raise(exception_from_args(args)?)),
            "require" | "require_relative" => Ok(Value::Bool(true)),
            "Integer" => super::methods::convert_integer(args),
            "Float" => super::methods::convert_float(args),
            "String" => {
                super::methods::arity(&args, 1..=1)?;
                Ok(Value::Str(args[0].to_s()))
            }
            "local_variables" => Ok(Value::array(
                self.locals.keys().map(|name| Value::Symbol(name.clone())).collect(),
            )),
            "block_given?" => Ok(Value::Bool(false)),
            _ if bare => raise(
                "NameError",
                format!("undefined local variable or method '{name}' for main"),
            ),
            _ => raise("NoMethodError", format!("undefined method '{name}' for main")),
        }
    }

    pub(super) fn puts(&self, args: &[Value]) -> Eval<Value> {
        let mut text = String::new();
        if args.is_empty() {
            text.push('\n');
        }
        for arg in args {
            puts_line(arg, &mut text, &mut Vec::new());
        }
        self.write_out(&text)?;
        Ok(Value::Nil)
    }

    // -------------------------------------------------------------------------
    // $stdout / $stdin
    // -------------------------------------------------------------------------

    pub(super) fn stdout_method(&mut self, name: &str, args: &[Value]) -> Eval<Value> {
        match name {
            "write" | "print" | "<<" => {
                let mut written = 0;
                for arg in args {
                    let text = arg.to_s();
                    written += text.len();
                    self.write_out(&text)?;
                }
                Ok(match name {
                    "write" => Value::Int(i64::try_from(written).unwrap_or(i64::MAX)),
                    "<<" => Value::Stdout,
                    _ => Value::Nil,
                })
            }
            "puts" => self.puts(args),
            "flush" | "fsync" => {
                self.flush_out()?;
                Ok(Value::Stdout)
            }
            "sync" => Ok(Value::Bool(true)),
            "tty?" | "isatty" => Ok(Value::Bool(false)),
            "fileno" => Ok(Value::Int(1)),
            _ => super::methods::no_method(name, &Value::Stdout),
        }
    }

    pub(super) fn stdin_method(&mut self, name: &str, args: Vec<Value>, block: Option<&Block>) -> Eval<Value> {
        match name {
            "gets" => Ok(self.input()?.read_line()?.map_or(Value::Nil, Value::Str)),
            "readline" => Ok(Value::Str(self.input()?.read_line_strict()?)),
            "readlines" => {
                let lines = self.input()?.read_lines()?;
                Ok(Value::array(lines.into_iter().map(Value::Str).collect()))
            }
            "read" => {
                let max = match args.first() {
                    None | Some(Value::Nil) => None,
                    Some(Value::Int(length)) => match usize::try_from(*length) {
                        Ok(length) => Some(length),
                        Err(_) => return raise("ArgumentError", format!("negative length {length} given")),
                    },
                    Some(other) => {
                        return raise(
                            "TypeError",
                            format!("no implicit conversion of {} into Integer", other.class_name()),
                        );
                    }
                };
                let text = self.input()?.read(max)?;
                // a sized read at end of input answers nil
                if text.is_empty() && max.is_some_and(|max| max > 0) {
                    Ok(Value::Nil)
                } else {
                    Ok(Value::Str(text))
                }
            }
            "getc" => {
                let text = self.input()?.read(Some(1))?;
                Ok(if text.is_empty() { Value::Nil } else { Value::Str(text) })
            }
            "each_line" => {
                let Some(block) = block else {
                    return super::methods::no_block();
                };
                loop {
                    let line = self.input()?.read_line()?;
                    let Some(line) = line else { break };
                    self.call_block(block, vec![Value::Str(line)])?;
                }
                Ok(Value::Stdin)
            }
            "eof?" | "eof" => Ok(Value::Bool(self.input()?.at_eof()?)),
            "tty?" | "isatty" => Ok(Value::Bool(false)),
            "fileno" => Ok(Value::Int(0)),
            _ => super::methods::no_method(name, &Value::Stdin),
        }
    }
}

/// Arrays print one element per line; an array already being printed, or one
/// nested too deeply, prints as `[...]`.
fn puts_line(value: &Value, out: &mut String, open: &mut Vec<*const ArrayCell>) {
    if let Value::Array(items) = value {
        let ptr = Rc::as_ptr(items);
        if open.len() >= MAX_NESTED_DEPTH || open.contains(&ptr) {
            out.push_str("[...]\n");
            return;
        }
        open.push(ptr);
        let items = items.borrow();
        if items.is_empty() {
            out.push('\n');
        }
        for item in items.iter() {
            puts_line(item, out, open);
        }
        open.pop();
        return;
    }
    let text = value.to_s();
    out.push_str(&text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

/// The exception `raise` builds from its arguments.
fn exception_from_args(args: Vec<Value>) -> Eval<EvaluationError> {
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (None, _) => Ok(EvaluationError::new("RuntimeError", "unhandled exception")),
        (Some(Value::Str(message)), None) => Ok(EvaluationError::new("RuntimeError", message)),
        (Some(Value::Exception(error)), None) => Ok(error),
        (Some(Value::Class(class)), message) if EXCEPTION_CLASSES.contains(&class.as_str()) => {
            let message = message.map_or_else(|| class.clone(), |message| message.to_s());
            Ok(EvaluationError::new(class, message))
        }
        _ => raise("TypeError", "exception class/object expected"),
    }
}

impl Engine for MiniRuby {
    fn install(&mut self, channels: Channels) -> Result<(), EngineError> {
        if self.channels.is_some() {
            return Err(EvaluationError::new("RuntimeError", "$stdout and $stdin are already installed").into());
        }
        self.globals.insert("stdout".to_owned(), Value::Stdout);
        self.globals.insert("stdin".to_owned(), Value::Stdin);
        self.channels = Some(channels);
        tracing::debug!(version = %self.version, "installed $stdout and $stdin");
        Ok(())
    }

    fn eval_inspect(&mut self, code: &str) -> Result<String, EngineError> {
        if self.channels.is_none() {
            return Err(EvaluationError::new("IOError", "$stdout and $stdin are not installed").into());
        }
        let program = parse_program(code, self.locals.keys().cloned())
            .map_err(|err| EvaluationError::new("SyntaxError", err.message))?;

        let mut value = Value::Nil;
        for statement in program.statements.iter().flatten() {
            match self.eval(statement) {
                Ok(result) => value = result,
                // a top-level `return` ends the snippet
                Err(Unwind::Return(result)) => {
                    value = result;
                    break;
                }
                Err(Unwind::Raise(error)) => return Err(EngineError::Raised(error)),
                Err(Unwind::InputRequired) => return Err(EngineError::InputRequired),
            }
        }
        Ok(value.inspect())
    }
}

impl std::fmt::Debug for MiniRuby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniRuby")
            .field("version", &self.version)
            .field("locals", &self.locals.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
