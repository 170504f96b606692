//! `update_code` against a simulated GitHub contents API.

use sensornode::admin::engine::DispatchOutcome;
use sensornode::error::{AdminError, TransportError, ValidationError};
use serde_json::{Value, json};

use crate::mock_ports::{COMMITS_URL, CONTENTS_URL, Node};

const RAW: &str = "https://raw.githubusercontent.com/VirtualWolf/esp32-sensor-reader-mqtt/main/src";
const API: &str = "https://api.github.com/repos/VirtualWolf/esp32-sensor-reader-mqtt/contents/src";
const SHA: &str = "abcdef1234567890abcdef1234567890abcdef12";

fn file(name: &str, path: &str) -> Value {
    json!({
        "name": name,
        "path": format!("src/{path}"),
        "type": "file",
        "download_url": format!("{RAW}/{path}"),
    })
}

fn dir(name: &str, path: &str) -> Value {
    json!({
        "name": name,
        "path": format!("src/{path}"),
        "type": "dir",
        "url": format!("{API}/{path}?ref=main"),
        "download_url": null,
    })
}

fn listing(entries: Vec<Value>) -> Vec<u8> {
    Value::Array(entries).to_string().into_bytes()
}

/// `main.py`, `lib/a.py`, `lib/sensors/{bme.py, broken.py}` plus a
/// symlink. `broken.py` answers 500.
fn serve_tree(node: &mut Node, reversed: bool) {
    let mut root = vec![
        file("main.py", "main.py"),
        dir("lib", "lib"),
        json!({ "name": "link", "type": "symlink", "download_url": null }),
    ];
    let mut lib = vec![file("a.py", "lib/a.py"), dir("sensors", "lib/sensors")];
    let mut sensors = vec![
        file("bme.py", "lib/sensors/bme.py"),
        file("broken.py", "lib/sensors/broken.py"),
    ];
    if reversed {
        root.reverse();
        lib.reverse();
        sensors.reverse();
    }

    node.http
        .route(CONTENTS_URL, 200, listing(root))
        .route(&format!("{API}/lib?ref=main"), 200, listing(lib))
        .route(&format!("{API}/lib/sensors?ref=main"), 200, listing(sensors))
        .route(&format!("{RAW}/main.py"), 200, "import lib\n")
        .route(&format!("{RAW}/lib/a.py"), 200, "A = 1\n")
        .route(&format!("{RAW}/lib/sensors/bme.py"), 200, vec![b'#'; 3000])
        .route(&format!("{RAW}/lib/sensors/broken.py"), 500, "oops")
        .route(COMMITS_URL, 200, json!([{ "sha": SHA }]).to_string());
}

fn assert_mirrored(node: &Node) {
    assert_eq!(node.file("main.py").unwrap(), b"import lib\n");
    assert_eq!(node.file("lib/a.py").unwrap(), b"A = 1\n");
    assert_eq!(node.file("lib/sensors/bme.py").unwrap(), vec![b'#'; 3000]);
    assert!(!node.exists("lib/sensors/broken.py"));
    assert!(!node.exists("link"));
    assert_eq!(node.file(".version").unwrap(), b"abcdef1");
}

#[test]
fn mirrors_nested_tree_and_writes_version() {
    let mut node = Node::new();
    serve_tree(&mut node, false);

    let outcome = node.dispatch(r#"{"command":"update_code"}"#);

    assert_eq!(outcome, DispatchOutcome::Reset);
    assert_mirrored(&node);
    assert_eq!(node.system.resets(), 1);

    let messages = node.reporter.messages();
    assert_eq!(messages[0], "Beginning code update from GitHub...");
    assert_eq!(
        messages[1],
        format!("Getting repository contents from {CONTENTS_URL}")
    );
    assert!(messages.contains(&"Fetching lib/sensors/bme.py"));
    assert!(messages.contains(&"Successfully saved lib/sensors/bme.py"));
    assert!(messages.contains(&"Latest commit hash is abcdef1, writing to .version file..."));

    let last = node.reporter.last();
    assert_eq!(
        last.get_str("message"),
        Some("Code update successful, restarting board...")
    );
    assert_eq!(last.get_str("version"), Some("abcdef1"));
    assert_eq!(last.get("files_written").unwrap(), 3);
    assert_eq!(last.get("failures").unwrap(), 1);
}

#[test]
fn failed_file_is_reported_with_path() {
    let mut node = Node::new();
    serve_tree(&mut node, false);

    node.dispatch(r#"{"command":"update_code"}"#);

    let errors = node.reporter.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].get_str("operation"), Some("update_code"));
    assert_eq!(errors[0].get_str("path"), Some("lib/sensors/broken.py"));
    assert_eq!(errors[0].get_str("kind"), Some("transport"));
    assert!(errors[0].get_str("error").unwrap().contains("500"));
}

#[test]
fn sibling_order_does_not_matter() {
    let mut node = Node::new();
    serve_tree(&mut node, true);

    assert_eq!(node.dispatch(r#"{"command":"update_code"}"#), DispatchOutcome::Reset);
    assert_mirrored(&node);
}

#[test]
fn root_listing_failure_aborts() {
    let mut node = Node::new();
    node.http.route(COMMITS_URL, 200, json!([{ "sha": SHA }]).to_string());

    let outcome = node.dispatch(r#"{"command":"update_code"}"#);

    assert_eq!(
        outcome,
        DispatchOutcome::Failed(TransportError::Status(404).into())
    );
    assert_eq!(node.system.resets(), 0);
    assert!(!node.exists(".version"));
    assert!(!node.http.was_requested(COMMITS_URL));
}

#[test]
fn unreachable_api_aborts() {
    let mut node = Node::new();
    node.http.unreachable(CONTENTS_URL);

    let outcome = node.dispatch(r#"{"command":"update_code"}"#);

    assert_eq!(outcome, DispatchOutcome::Failed(TransportError::Connect.into()));
    assert_eq!(node.reporter.last().get_str("error"), Some("transport: connection failed"));
}

#[test]
fn failing_subdirectory_does_not_stop_siblings() {
    let mut node = Node::new();
    node.http
        .route(
            CONTENTS_URL,
            200,
            listing(vec![dir("lib", "lib"), file("main.py", "main.py")]),
        )
        .route(&format!("{API}/lib?ref=main"), 403, r#"{"message":"rate limited"}"#)
        .route(&format!("{RAW}/main.py"), 200, "x")
        .route(COMMITS_URL, 200, json!([{ "sha": SHA }]).to_string());

    assert_eq!(node.dispatch(r#"{"command":"update_code"}"#), DispatchOutcome::Reset);

    assert_eq!(node.file("main.py").unwrap(), b"x");
    assert!(!node.exists("lib"));
    let errors = node.reporter.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].get_str("path"), Some("lib"));
}

#[test]
fn commit_lookup_failure_keeps_files_but_fails() {
    let mut node = Node::new();
    node.http
        .route(CONTENTS_URL, 200, listing(vec![file("main.py", "main.py")]))
        .route(&format!("{RAW}/main.py"), 200, "x")
        .route(COMMITS_URL, 500, "");

    let outcome = node.dispatch(r#"{"command":"update_code"}"#);

    assert_eq!(
        outcome,
        DispatchOutcome::Failed(TransportError::Status(500).into())
    );
    assert_eq!(node.file("main.py").unwrap(), b"x");
    assert!(!node.exists(".version"));
    assert_eq!(node.system.resets(), 0);
}

#[test]
fn empty_commit_list_is_malformed() {
    let mut node = Node::new();
    node.http
        .route(CONTENTS_URL, 200, listing(vec![file("main.py", "main.py")]))
        .route(&format!("{RAW}/main.py"), 200, "x")
        .route(COMMITS_URL, 200, "[]");

    let outcome = node.dispatch(r#"{"command":"update_code"}"#);

    assert_eq!(
        outcome,
        DispatchOutcome::Failed(TransportError::Malformed("empty commit list").into())
    );
}

#[test]
fn nothing_written_is_not_a_success() {
    let mut node = Node::new();
    node.http
        .route(CONTENTS_URL, 200, listing(vec![file("main.py", "main.py")]))
        .route(&format!("{RAW}/main.py"), 404, "")
        .route(COMMITS_URL, 200, json!([{ "sha": SHA }]).to_string());

    let outcome = node.dispatch(r#"{"command":"update_code"}"#);

    assert_eq!(
        outcome,
        DispatchOutcome::Failed(ValidationError::NothingSynced.into())
    );
    assert_eq!(node.system.resets(), 0);
    assert!(!node.exists(".version"));
}

#[test]
fn missing_entry_point_blocks_reset() {
    let mut node = Node::with_config(
        r#"{"client_id":"w","server":"b","port":1883,"ssid":"s","wifi_pw":"p","topic":"t","code_entry_point":"main.py"}"#,
    );
    node.write_file(".version", b"1234567");
    node.http
        .route(CONTENTS_URL, 200, listing(vec![file("boot.py", "boot.py")]))
        .route(&format!("{RAW}/boot.py"), 200, "x")
        .route(COMMITS_URL, 200, json!([{ "sha": SHA }]).to_string());

    let outcome = node.dispatch(r#"{"command":"update_code"}"#);

    assert_eq!(
        outcome,
        DispatchOutcome::Failed(ValidationError::EntryPointMissing("main.py".into()).into())
    );
    assert_eq!(node.system.resets(), 0);
    assert_eq!(node.file(".version").unwrap(), b"1234567");

    node.dispatch(r#"{"command":"get_system_info"}"#);
    assert_eq!(node.reporter.last().get_str("code_version"), Some("1234567"));
}

#[test]
fn token_and_user_agent_headers_are_sent() {
    let mut node = Node::with_config(
        r#"{"client_id":"w","server":"b","port":1883,"ssid":"s","wifi_pw":"p","topic":"t","github_token":"ghp_secret"}"#,
    );
    serve_tree(&mut node, false);

    node.dispatch(r#"{"command":"update_code"}"#);

    let requests = node.http.requests();
    assert!(!requests.is_empty());
    for request in requests {
        let header = |name: &str| {
            request
                .headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(header("User-Agent"), Some("VirtualWolf"));
        assert_eq!(header("Authorization"), Some("token ghp_secret"));
    }
}

#[test]
fn no_authorization_header_without_token() {
    let mut node = Node::new();
    serve_tree(&mut node, false);

    node.dispatch(r#"{"command":"update_code"}"#);

    assert!(node
        .http
        .requests()
        .iter()
        .all(|r| r.headers.iter().all(|(k, _)| k != "Authorization")));
}

#[test]
fn custom_source_identity_changes_urls() {
    let mut node = Node::with_config(
        r#"{"client_id":"w","server":"b","port":1883,"ssid":"s","wifi_pw":"p","topic":"t","github_username":"me","github_repository":"fork","github_ref":"dev"}"#,
    );

    node.dispatch(r#"{"command":"update_code"}"#);

    assert!(node
        .http
        .was_requested("https://api.github.com/repos/me/fork/contents/src?ref=dev"));
}

#[test]
fn unsafe_names_are_rejected() {
    let mut node = Node::new();
    node.http
        .route(
            CONTENTS_URL,
            200,
            listing(vec![file("..", "evil"), file("main.py", "main.py")]),
        )
        .route(&format!("{RAW}/evil"), 200, "pwned")
        .route(&format!("{RAW}/main.py"), 200, "x")
        .route(COMMITS_URL, 200, json!([{ "sha": SHA }]).to_string());

    assert_eq!(node.dispatch(r#"{"command":"update_code"}"#), DispatchOutcome::Reset);

    assert!(!node.http.was_requested(&format!("{RAW}/evil")));
    let errors = node.reporter.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].get_str("kind"), Some("validation"));
}

#[test]
fn interrupted_download_keeps_previous_file() {
    let mut node = Node::new();
    node.write_file("main.py", b"old contents");
    node.http
        .route(
            CONTENTS_URL,
            200,
            listing(vec![file("main.py", "main.py"), file("boot.py", "boot.py")]),
        )
        .route_broken(&format!("{RAW}/main.py"), vec![b'n'; 5000], 1500)
        .route(&format!("{RAW}/boot.py"), 200, "b")
        .route(COMMITS_URL, 200, json!([{ "sha": SHA }]).to_string());

    assert_eq!(node.dispatch(r#"{"command":"update_code"}"#), DispatchOutcome::Reset);

    assert_eq!(node.file("main.py").unwrap(), b"old contents");
    assert!(!node.exists("main.py.tmp"));
    let errors = node.reporter.errors();
    assert_eq!(errors[0].get_str("path"), Some("main.py"));
    assert_eq!(
        errors[0].get_str("error"),
        Some("transport: response read failed")
    );
}

#[test]
fn non_array_listing_is_malformed() {
    let mut node = Node::new();
    node.http.route(CONTENTS_URL, 200, r#"{"message":"this is a file"}"#);

    let outcome = node.dispatch(r#"{"command":"update_code"}"#);

    assert_eq!(
        outcome,
        DispatchOutcome::Failed(AdminError::Transport(TransportError::Malformed(
            "contents listing"
        )))
    );
}

#[test]
fn store_owned_files_are_never_overwritten() {
    let mut node = Node::new();
    let config_before = node.config_bytes();
    node.http
        .route(
            CONTENTS_URL,
            200,
            listing(vec![
                file("main.py", "main.py"),
                file("config.json", "config.json"),
                file(".version", ".version"),
                file("main.py.tmp", "main.py.tmp"),
            ]),
        )
        .route(&format!("{RAW}/main.py"), 200, "x")
        .route(&format!("{RAW}/config.json"), 200, r#"{"client_id":""}"#)
        .route(&format!("{RAW}/.version"), 200, "0000000")
        .route(&format!("{RAW}/main.py.tmp"), 200, "junk")
        .route(COMMITS_URL, 200, json!([{ "sha": SHA }]).to_string());

    assert_eq!(node.dispatch(r#"{"command":"update_code"}"#), DispatchOutcome::Reset);

    assert_eq!(node.config_bytes(), config_before);
    assert_eq!(node.file(".version").unwrap(), b"abcdef1");
    assert_eq!(node.file("main.py").unwrap(), b"x");
    assert!(!node.http.was_requested(&format!("{RAW}/config.json")));
    assert!(!node.http.was_requested(&format!("{RAW}/.version")));

    let rejected: Vec<&str> = node
        .reporter
        .errors()
        .iter()
        .filter_map(|r| r.get_str("path"))
        .collect();
    assert_eq!(rejected, ["config.json", ".version", "main.py.tmp"]);
    assert!(node
        .reporter
        .errors()
        .iter()
        .all(|r| r.get_str("kind") == Some("validation")));
}

#[test]
fn config_json_inside_subdirectory_is_ordinary() {
    let mut node = Node::new();
    let config_before = node.config_bytes();
    node.http
        .route(CONTENTS_URL, 200, listing(vec![dir("lib", "lib")]))
        .route(
            &format!("{API}/lib?ref=main"),
            200,
            listing(vec![file("config.json", "lib/config.json")]),
        )
        .route(&format!("{RAW}/lib/config.json"), 200, "{}")
        .route(COMMITS_URL, 200, json!([{ "sha": SHA }]).to_string());

    assert_eq!(node.dispatch(r#"{"command":"update_code"}"#), DispatchOutcome::Reset);

    assert_eq!(node.file("lib/config.json").unwrap(), b"{}");
    assert_eq!(node.config_bytes(), config_before);
}

#[test]
fn recursion_stops_at_max_depth() {
    let mut node = Node::new();
    let chain: Vec<String> = (0..10).map(|i| format!("d{i}")).collect();

    node.http
        .route(
            CONTENTS_URL,
            200,
            listing(vec![file("main.py", "main.py"), dir("d0", "d0")]),
        )
        .route(&format!("{RAW}/main.py"), 200, "x")
        .route(COMMITS_URL, 200, json!([{ "sha": SHA }]).to_string());
    for level in 0..chain.len() {
        let path = chain[..=level].join("/");
        let mut entries = vec![file("f.py", &format!("{path}/f.py"))];
        if let Some(next) = chain.get(level + 1) {
            entries.push(dir(next, &format!("{path}/{next}")));
        }
        node.http
            .route(&format!("{API}/{path}?ref=main"), 200, listing(entries))
            .route(&format!("{RAW}/{path}/f.py"), 200, path.clone());
    }

    assert_eq!(node.dispatch(r#"{"command":"update_code"}"#), DispatchOutcome::Reset);

    let deepest_kept = chain[..8].join("/");
    assert_eq!(
        node.file(&format!("{deepest_kept}/f.py")).unwrap(),
        deepest_kept.as_bytes()
    );
    let too_deep = chain[..9].join("/");
    assert!(!node.exists(&too_deep));
    assert!(!node.http.was_requested(&format!("{API}/{too_deep}?ref=main")));

    let errors = node.reporter.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].get_str("path"), Some(too_deep.as_str()));
    assert_eq!(errors[0].get_str("kind"), Some("validation"));
    assert_eq!(node.file(".version").unwrap(), b"abcdef1");
}
