//! Integration tests for the host-facing engine API.
//!
//! The production guest module is an externally supplied artifact, so these
//! tests instantiate small WAT guests that honor the same entry-point table
//! and answer every packed call with a canned payload. That exercises the
//! full path a real module takes: marshalling, the entry-point call, packed
//! result decoding, and envelope interpretation.

use cedar_host::{
    CedarEngine, Decision, EngineConfig, EngineError, EvalRequest,
};

/// Build a guest that answers every packed entry point with `canned`.
fn guest_with_response(canned: &str) -> String {
    let data: String = canned.bytes().map(|b| format!("\\{b:02x}")).collect();
    let len = canned.len();
    let heap = 2048 + len.max(8);
    format!(
        r#"
(module
  (memory (export "memory") 4 64)
  (global $heap (mut i32) (i32.const {heap}))
  (data (i32.const 2048) "{data}")

  (func $bump (param $size i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    (local.set $ptr (global.get $heap))
    (local.set $end (i32.add (local.get $ptr) (local.get $size)))
    (block $grown
      (loop $more
        (br_if $grown
          (i32.le_u (local.get $end)
                    (i32.mul (memory.size) (i32.const 65536))))
        (if (i32.eq (memory.grow (i32.const 16)) (i32.const -1))
          (then (return (i32.const 0))))
        (br $more)))
    (global.set $heap (local.get $end))
    (local.get $ptr))

  (func $respond (result i64)
    (local $ptr i32)
    (local.set $ptr (call $bump (i32.const {len})))
    (memory.copy (local.get $ptr) (i32.const 2048) (i32.const {len}))
    (i64.or (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
            (i64.extend_i32_u (i32.const {len}))))

  (func (export "allocate") (param $size i32) (result i32)
    (call $bump (local.get $size)))
  (func (export "deallocate") (param i32 i32))
  (func (export "set_entities") (param i32 i32))
  (func (export "set_policies") (param i32 i32))
  (func (export "is_authorized_string")
        (param i32 i32 i32 i32 i32 i32 i32 i32) (result i64)
    (call $respond))
  (func (export "is_authorized_json")
        (param i32 i32 i32 i32 i32 i32 i32 i32) (result i64)
    (call $respond))
  (func (export "is_authorized_partial")
        (param i32 i32 i32 i32 i32 i32 i32 i32) (result i64)
    (call $respond))
  (func (export "validate") (param i32 i32 i32 i32) (result i64)
    (call $respond))
  (func (export "ffi") (param i32 i32) (result i64)
    (call $respond))
)
"#
    )
}

fn engine_answering(canned: &str) -> CedarEngine {
    CedarEngine::from_bytes(&EngineConfig::default(), guest_with_response(canned))
        .expect("fixture instantiation failed")
}

fn request() -> EvalRequest {
    EvalRequest::new(
        "User::\"alice\"",
        "Action::\"update\"",
        "Photo::\"VacationPhoto94.jpg\"",
        "{}",
    )
}

#[test]
fn eval_returns_allow() {
    let engine = engine_answering("Allow");
    engine.set_entities("[]").unwrap();
    engine
        .set_policies("permit(principal, action, resource);")
        .unwrap();

    assert_eq!(engine.eval(&request()).unwrap(), Decision::Allow);
    assert!(engine.is_authorized(&request()).unwrap());
}

#[test]
fn eval_returns_deny() {
    let engine = engine_answering("Deny");
    assert_eq!(engine.eval(&request()).unwrap(), Decision::Deny);
    assert!(!engine.is_authorized(&request()).unwrap());
}

#[test]
fn unknown_decision_token_is_contract_violation() {
    let engine = engine_answering("Maybe");
    let err = engine.eval(&request()).unwrap_err();
    assert!(matches!(err, EngineError::EnvelopeDecode(_)));
}

#[test]
fn eval_with_response_cites_contributing_policy() {
    let engine = engine_answering(
        r#"{"decision":"Allow","diagnostics":{"reason":["policy0"],"errors":[]}}"#,
    );
    let res = engine.eval_with_response(&request()).unwrap();
    assert_eq!(res.decision, Decision::Allow);
    assert_eq!(res.diagnostics.reason, vec!["policy0"]);
    assert!(res.diagnostics.errors.is_empty());
}

#[test]
fn eval_with_response_deny_cites_nothing() {
    let engine = engine_answering(
        r#"{"decision":"Deny","diagnostics":{"reason":[],"errors":[]}}"#,
    );
    let res = engine.eval_with_response(&request()).unwrap();
    assert_eq!(res.decision, Decision::Deny);
    assert!(res.diagnostics.reason.is_empty());
    assert!(res.diagnostics.errors.is_empty());
}

#[test]
fn partial_eval_returns_raw_json() {
    let payload = r#"{"decision":"Allow","diagnostics":{"reason":["policy0"],"errors":[]}}"#;
    let engine = engine_answering(payload);
    assert_eq!(engine.is_authorized_partial(&request()).unwrap(), payload);
}

#[test]
fn ffi_failure_envelope_is_data_not_error() {
    // a guest that rejects its input still answers with a well-formed
    // envelope; the bridge must not turn that into a transport failure
    let engine = engine_answering(
        r#"{"success":"false","isInternal":false,"errors":["couldn't parse input: expected value"]}"#,
    );
    let res = engine.ffi(r#"{"principal": "User::\"alice\","#).unwrap();
    assert!(!res.success);
    assert!(!res.is_internal);
    assert!(!res.errors.is_empty());
    assert!(res.result.is_none());
}

#[test]
fn ffi_success_envelope_decodes_nested_result() {
    let inner = serde_json::json!({
        "decision": "Allow",
        "diagnostics": { "reason": ["001"], "errors": [] }
    })
    .to_string();
    let envelope = serde_json::json!({ "success": "true", "result": inner }).to_string();

    let engine = engine_answering(&envelope);
    let res = engine
        .ffi(r#"{"principal":"User::\"alice\"","action":"Action::\"view\"","resource":"Resource::\"thing\"","context":{},"slice":{"policies":{"001":"permit(principal, action, resource);"},"entities":[]}}"#)
        .unwrap();
    assert!(res.success);
    let result = res.result.expect("success envelope carries a result");
    assert_eq!(result.decision, Decision::Allow);
    assert_eq!(result.diagnostics.reason, vec!["001"]);
}

#[test]
fn ffi_success_with_undecodable_result_is_contract_violation() {
    let engine = engine_answering(r#"{"success":"true","result":"certainly not json"}"#);
    let err = engine.ffi("{}").unwrap_err();
    assert!(matches!(err, EngineError::EnvelopeDecode(_)));
}

#[test]
fn validate_reports_schema_parse_error_alone() {
    // an unparsable schema yields a schema error and nothing else; the
    // validation-errors list stays empty
    let engine = engine_answering(
        r#"{"schema_error":"JSON Schema file could not be parsed","policy_error":null,"validation_errors":[]}"#,
    );
    let res = engine
        .validate("permit(principal, action, resource);", "")
        .unwrap();
    assert!(res.schema_error.is_some());
    assert!(res.policy_error.is_none());
    assert!(res.validation_errors.is_empty());
    assert!(!res.is_valid());
}

#[test]
fn validate_reports_findings_with_locations() {
    let engine = engine_answering(
        r#"{"schema_error":null,"policy_error":null,"validation_errors":[
            {"error_kind":"unrecognized entity type Not::UserGroup",
             "location":{"policy_id":"policy0","range_start":22,"range_end":51}}
        ]}"#,
    );
    let res = engine
        .validate("permit(principal in Not::UserGroup::\"x\", action, resource);", "{}")
        .unwrap();
    assert!(res.schema_error.is_none());
    assert_eq!(res.validation_errors.len(), 1);
    let finding = &res.validation_errors[0];
    assert_eq!(finding.location.policy_id, "policy0");
    assert_eq!(finding.location.range_start, Some(22));
}

#[test]
fn undecodable_validation_payload_is_contract_violation() {
    let engine = engine_answering("Allow");
    let err = engine.validate("permit(principal, action, resource);", "{}").unwrap_err();
    assert!(matches!(err, EngineError::EnvelopeDecode(_)));
}

#[test]
fn engine_survives_many_sequential_calls() {
    let engine = engine_answering("Allow");
    engine.set_entities("[]").unwrap();
    engine
        .set_policies("permit(principal, action, resource);")
        .unwrap();
    for _ in 0..100 {
        assert_eq!(engine.eval(&request()).unwrap(), Decision::Allow);
    }
}

#[test]
fn shared_engine_serializes_calls_across_threads() {
    use std::sync::Arc;

    // one instance, many threads: every call funnels through the
    // per-instance lock, so interleaved requests stay well-formed
    let engine = Arc::new(engine_answering("Allow"));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    assert_eq!(engine.eval(&request()).unwrap(), Decision::Allow);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn independent_engines_run_in_parallel() {
    let handles: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(|| {
                let engine = engine_answering("Allow");
                for _ in 0..10 {
                    assert_eq!(engine.eval(&request()).unwrap(), Decision::Allow);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn fueled_engine_still_answers() {
    let config = EngineConfig::default().fuel_limit(1_000_000_000);
    let engine = CedarEngine::from_bytes(&config, guest_with_response("Allow")).unwrap();
    assert_eq!(engine.eval(&request()).unwrap(), Decision::Allow);
}
