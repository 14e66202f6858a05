//! Shared generators.

use proptest::prelude::*;

/// Identity values, possibly padded with whitespace.
pub fn arb_identity() -> impl Strategy<Value = String> {
    ("[ \t]{0,2}", "[a-zA-Z0-9@._-]{1,32}", "[ \t]{0,2}").prop_map(|(l, id, r)| format!("{l}{id}{r}"))
}

/// Values that carry no identity.
pub fn arb_blank() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        "[ \t]{0,4}".prop_map(serde_json::Value::String),
        any::<i64>().prop_map(|n| serde_json::json!(n)),
    ]
}

/// Cookie names free of separators.
pub fn arb_cookie_name() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_-]{0,15}"
}

/// Cookie values free of separators.
pub fn arb_cookie_value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9._-]{0,24}"
}
