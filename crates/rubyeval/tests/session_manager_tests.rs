//! Integration tests for `SessionManager`.
//!
//! Covers construction from configuration, reset and version switching, and
//! whole-document evaluation.

use std::{cell::Cell, rc::Rc};

use pretty_assertions::assert_eq;
use rubyeval::{
    Config, Engine, EngineProvider, EvaluationError, InputRequest, NoInput, RubyVersion, SessionError,
    mini::{MiniRuby, MiniRubyParser, MiniRubyProvider},
    session_manager::SessionManager,
};

fn quiet_config() -> Config {
    Config {
        echo_output: false,
        ..Config::default()
    }
}

fn new_manager() -> SessionManager {
    SessionManager::new(Box::new(MiniRubyProvider), quiet_config()).unwrap()
}

fn value(mgr: &mut SessionManager, code: &str) -> Result<String, EvaluationError> {
    mgr.evaluate(code, &mut NoInput).unwrap().value
}

/// Provider that builds MiniRuby engines until `budget` runs out, then fails.
fn limited_provider(budget: usize) -> (Box<dyn EngineProvider>, Rc<Cell<usize>>) {
    let created = Rc::new(Cell::new(0));
    let counter = Rc::clone(&created);
    let provider = move |version: RubyVersion| -> Result<Box<dyn Engine>, SessionError> {
        if counter.get() >= budget {
            return Err(SessionError::construction(version, "runtime image unavailable"));
        }
        counter.set(counter.get() + 1);
        Ok(Box::new(MiniRuby::new(version)))
    };
    (Box::new(provider), created)
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn first_session_uses_the_configured_version() {
    let config = Config {
        ruby_version: RubyVersion::V3_3,
        ..quiet_config()
    };
    let mut mgr = SessionManager::new(Box::new(MiniRubyProvider), config).unwrap();
    assert_eq!(mgr.session().version(), RubyVersion::V3_3);
    assert_eq!(value(&mut mgr, "RUBY_VERSION"), Ok("\"3.3.0\"".to_owned()));
}

#[test]
fn construction_failure_is_reported() {
    let (provider, _) = limited_provider(0);
    let err = SessionManager::new(provider, quiet_config()).unwrap_err();
    match err {
        SessionError::Construction { version, message } => {
            assert_eq!(version, RubyVersion::V3_4);
            assert_eq!(message, "runtime image unavailable");
        }
        other => panic!("expected a construction error, got {other:?}"),
    }
}

#[test]
fn create_session_is_independent_of_the_current_one() {
    let mut mgr = new_manager();
    value(&mut mgr, "x = 1").unwrap();
    let mut other = mgr.create_session(RubyVersion::V3_2).unwrap();
    assert_eq!(other.version(), RubyVersion::V3_2);
    assert!(other.evaluate("x", &mut NoInput).unwrap().is_error());
    assert_eq!(value(&mut mgr, "x"), Ok("1".to_owned()));
}

// ============================================================================
// Reset & version switching
// ============================================================================

#[test]
fn reset_discards_variables() {
    let mut mgr = new_manager();
    value(&mut mgr, "x = 1").unwrap();
    mgr.reset_session().unwrap();
    let err = value(&mut mgr, "x").unwrap_err();
    assert_eq!(err.class, "NameError");
}

#[test]
fn reset_discards_buffered_input() {
    let mut mgr = new_manager();
    mgr.session_mut().supply_input(Some("left over\n"));
    mgr.reset_session().unwrap();
    assert_eq!(value(&mut mgr, "gets"), Ok("nil".to_owned()));
}

#[test]
fn failed_reset_keeps_the_old_session() {
    let (provider, created) = limited_provider(1);
    let mut mgr = SessionManager::new(provider, quiet_config()).unwrap();
    value(&mut mgr, "kept = :yes").unwrap();

    assert!(mgr.reset_session().is_err());
    assert_eq!(created.get(), 1);
    assert_eq!(value(&mut mgr, "kept"), Ok(":yes".to_owned()));
}

#[test]
fn set_version_rebuilds_only_on_change() {
    let mut mgr = new_manager();
    value(&mut mgr, "x = 1").unwrap();

    assert!(!mgr.set_version(RubyVersion::V3_4).unwrap());
    assert_eq!(value(&mut mgr, "x"), Ok("1".to_owned()));

    assert!(mgr.set_version(RubyVersion::V3_2).unwrap());
    assert_eq!(mgr.config().ruby_version, RubyVersion::V3_2);
    assert_eq!(mgr.session().version(), RubyVersion::V3_2);
    assert!(value(&mut mgr, "x").is_err());
    assert_eq!(value(&mut mgr, "RUBY_VERSION"), Ok("\"3.2.0\"".to_owned()));
}

#[test]
fn failed_version_switch_keeps_config_and_session() {
    let (provider, _) = limited_provider(1);
    let mut mgr = SessionManager::new(provider, quiet_config()).unwrap();
    assert!(mgr.set_version(RubyVersion::V3_3).is_err());
    assert_eq!(mgr.config().ruby_version, RubyVersion::V3_4);
    assert_eq!(mgr.session().version(), RubyVersion::V3_4);
}

// ============================================================================
// Documents
// ============================================================================

#[test]
fn evaluate_document_runs_every_statement_in_order() {
    let mut mgr = new_manager();
    let outcomes = mgr
        .evaluate_document(&MiniRubyParser, "a = 1\nputs a\na + 1", &mut NoInput)
        .unwrap();

    let annotations: Vec<String> = outcomes.iter().map(|outcome| outcome.annotation()).collect();
    assert_eq!(annotations, vec![" => 1", " => nil", " => 2"]);
    assert_eq!(outcomes[1].span.source, "puts a");
    assert_eq!(outcomes[1].result.captured_output, Some("1\n".to_owned()));
    assert_eq!(outcomes[2].span.start, 13);
}

#[test]
fn failing_statements_do_not_stop_the_document() {
    let mut mgr = new_manager();
    let outcomes = mgr
        .evaluate_document(&MiniRubyParser, "raise ArgumentError, 'bad'\n:after", &mut NoInput)
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].result.value, Err(EvaluationError::new("ArgumentError", "bad")));
    assert_eq!(outcomes[1].result.value, Ok(":after".to_owned()));
}

#[test]
fn unparsable_document_evaluates_nothing() {
    let mut mgr = new_manager();
    let err = mgr
        .evaluate_document(&MiniRubyParser, "z = 1\nif z\n", &mut NoInput)
        .unwrap_err();
    assert!(matches!(err, SessionError::Parse(_)), "got {err:?}");
    assert!(value(&mut mgr, "z").is_err(), "no statement may run before the parse succeeds");
}

#[test]
fn document_statements_can_prompt_for_input() {
    let mut mgr = new_manager();
    let mut prompt = |_: &InputRequest| Some("Ada\n".to_owned());
    let outcomes = mgr
        .evaluate_document(&MiniRubyParser, "print 'name? '\nname = gets.chomp\n\"hi #{name}\"", &mut prompt)
        .unwrap();
    assert_eq!(outcomes[2].result.value, Ok("\"hi Ada\"".to_owned()));
}

#[test]
fn outcomes_serialize_to_json() {
    let mut mgr = new_manager();
    let outcomes = mgr.evaluate_document(&MiniRubyParser, "p 1", &mut NoInput).unwrap();
    let json = serde_json::to_value(&outcomes[0]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "span": { "start": 0, "end": 3, "length": 3, "source": "p 1" },
            "result": { "value": { "Ok": "1" }, "captured_output": "1\n" },
        })
    );
}
