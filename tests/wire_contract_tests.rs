/// Wire-contract tests for the pieces shared with other deployed
/// implementations: the routing digest, the request signature and the
/// composite uid layout. These recompute each contract from its definition
/// rather than importing the service, so a drift in either side shows up.
use md5::{Digest, Md5};

/// crc32 (IEEE) over the lowercase-hex md5 of the input.
fn routing_digest(s: &str) -> u32 {
    let md5_hex = hex::encode(Md5::digest(s.as_bytes()));
    crc32fast::hash(md5_hex.as_bytes())
}

#[test]
fn routing_digest_is_stable_and_case_sensitive() {
    let a = routing_digest("user@example.com");
    assert_eq!(a, routing_digest("user@example.com"));
    assert_ne!(a, routing_digest("User@example.com"));
    assert_ne!(a, routing_digest("user@example.org"));
}

#[test]
fn partition_arithmetic_stays_one_indexed() {
    for i in 0..500 {
        let d = routing_digest(&format!("probe-{i}"));
        let account_db = d % 3 + 1;
        let account_table = d % 100 + 1;
        let apply_table = d % 5 + 1;
        assert!((1..=3).contains(&account_db));
        assert!((1..=100).contains(&account_table));
        assert!((1..=5).contains(&apply_table));
    }
}

#[test]
fn identity_and_uid_keys_route_independently() {
    // The account space is keyed by either the identity string or the
    // decimal uid; the two key forms must not be assumed to collide.
    let by_identity = routing_digest("user@example.com") % 3 + 1;
    let by_uid = routing_digest("10011000000000001") % 3 + 1;
    // Both are valid shard ids whatever their relation.
    assert!((1..=3).contains(&by_identity));
    assert!((1..=3).contains(&by_uid));
}

/// md5 over sorted `key=value&` pairs (excluding `sign`) with the app
/// secret appended, lowercase hex.
fn request_sign(fields: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<_> = fields.iter().filter(|(k, _)| *k != "sign").collect();
    sorted.sort_by_key(|(k, _)| *k);
    let mut buf = String::new();
    for (k, v) in sorted {
        buf.push_str(k);
        buf.push('=');
        buf.push_str(v);
        buf.push('&');
    }
    buf.push_str(secret);
    hex::encode(Md5::digest(buf.as_bytes()))
}

#[test]
fn request_signature_ignores_field_order() {
    let forward = request_sign(
        &[("app_id", "1"), ("account", "x"), ("game_id", "7")],
        "secret",
    );
    let shuffled = request_sign(
        &[("game_id", "7"), ("account", "x"), ("app_id", "1")],
        "secret",
    );
    assert_eq!(forward, shuffled);
    assert_eq!(forward.len(), 32);
}

#[test]
fn request_signature_excludes_the_sign_field() {
    let without = request_sign(&[("app_id", "1")], "secret");
    let with = request_sign(&[("app_id", "1"), ("sign", "garbage")], "secret");
    assert_eq!(without, with);
}

#[test]
fn composite_uid_is_reversible_by_decimal_slicing() {
    // game id (6 digits) | platform id (3 digits) | account uid (10 digits)
    let game_id: i64 = 100_001;
    let platform_id: i64 = 101;
    let account_uid: i64 = 42;
    let composite = (game_id * 1_000 + platform_id) * 10_000_000_000 + account_uid;

    assert_eq!(composite % 10_000_000_000, account_uid);
    assert_eq!(composite / 10_000_000_000 % 1_000, platform_id);
    assert_eq!(composite / 10_000_000_000 / 1_000, game_id);
}
