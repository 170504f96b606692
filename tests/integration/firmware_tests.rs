//! `update_firmware`: streaming, verification and abort paths.

use sensornode::adapters::ota_partition::SimPartition;
use sensornode::admin::engine::DispatchOutcome;
use sensornode::app::ports::PartitionError;
use sensornode::error::{AdminError, IntegrityError, TransportError, ValidationError};
use serde_json::json;

use crate::mock_ports::Node;

const IMAGE_URL: &str = "https://firmware.example.com/sensornode-1.2.0.bin";
const IMAGE_LEN: usize = 150_000;

fn image() -> Vec<u8> {
    (0..IMAGE_LEN).map(|i| (i % 251) as u8).collect()
}

fn sha_hex(bytes: &[u8]) -> String {
    hex::encode(hmac_sha256::Hash::hash(bytes))
}

fn command(url: &str, size: usize, sha256: &str) -> String {
    json!({
        "command": "update_firmware",
        "firmware": { "url": url, "size": size, "sha256": sha256 },
    })
    .to_string()
}

#[test]
fn verified_image_is_activated_and_node_resets() {
    let mut node = Node::new();
    let image = image();
    node.http.route(IMAGE_URL, 200, image.clone());

    let outcome = node.dispatch(&command(IMAGE_URL, IMAGE_LEN, &sha_hex(&image)));

    assert_eq!(outcome, DispatchOutcome::Reset);
    assert_eq!(node.partition.activated_image(), Some(image.as_slice()));
    assert_eq!(node.partition.aborts(), 0);
    assert_eq!(node.system.resets(), 1);
    assert!(node.watchdog.feeds() > 0);

    let progress = node
        .reporter
        .messages()
        .into_iter()
        .filter(|m| *m == "Firmware download in progress")
        .count();
    assert_eq!(progress, 2);
    assert!(node.reporter.has_message_starting_with("Beginning firmware update"));
    assert!(node.reporter.has_message_starting_with("Firmware image verified"));

    let last = node.reporter.last();
    assert_eq!(
        last.get_str("message"),
        Some("Firmware update successful, restarting board...")
    );
    assert_eq!(last.get("bytes_written").unwrap(), IMAGE_LEN as u64);
    assert_eq!(last.get_str("sha256"), Some(sha_hex(&image).as_str()));
}

#[test]
fn no_http_headers_are_sent_for_image() {
    let mut node = Node::new();
    let image = image();
    node.http.route(IMAGE_URL, 200, image.clone());

    node.dispatch(&command(IMAGE_URL, IMAGE_LEN, &sha_hex(&image)));

    assert!(node.http.requests()[0].headers.is_empty());
}

#[test]
fn missing_descriptor_field_is_rejected_before_download() {
    let mut node = Node::new();

    let outcome = node.dispatch(
        r#"{"command":"update_firmware","firmware":{"url":"https://x/fw.bin","size":10}}"#,
    );

    assert_eq!(
        outcome,
        DispatchOutcome::Failed(ValidationError::MissingField("firmware.sha256").into())
    );
    assert!(node.http.requests().is_empty());
    assert_eq!(node.partition.begin_calls(), 0);
    assert_eq!(node.system.resets(), 0);
}

#[test]
fn invalid_descriptor_values_are_rejected() {
    let sha = "0".repeat(64);
    for (url, size, sha256) in [
        ("ftp://x/fw.bin", 10, sha.as_str()),
        ("https://x/fw.bin", 0, sha.as_str()),
        ("https://x/fw.bin", 10, "abc"),
        ("https://x/fw.bin", 64 * 1024 * 1024, sha.as_str()),
    ] {
        let mut node = Node::new();
        let outcome = node.dispatch(&command(url, size, sha256));
        assert!(
            matches!(
                outcome,
                DispatchOutcome::Failed(AdminError::Validation(ValidationError::InvalidField(_)))
            ),
            "{url} {size} {sha256}: {outcome:?}"
        );
        assert_eq!(node.partition.begin_calls(), 0);
    }
}

#[test]
fn hash_mismatch_aborts_without_activation() {
    let mut node = Node::new();
    let image = image();
    node.http.route(IMAGE_URL, 200, image.clone());
    let wrong = sha_hex(b"something else");

    let outcome = node.dispatch(&command(IMAGE_URL, IMAGE_LEN, &wrong));

    assert!(matches!(
        outcome,
        DispatchOutcome::Failed(AdminError::Integrity(IntegrityError::HashMismatch { .. }))
    ));
    assert_eq!(node.partition.aborts(), 1);
    assert_eq!(node.partition.activated_image(), None);
    assert_eq!(node.system.resets(), 0);
    let report = node.reporter.last();
    assert_eq!(report.get_str("kind"), Some("integrity"));
    assert!(report.get_str("error").unwrap().contains(&wrong));
}

#[test]
fn short_image_is_a_size_mismatch() {
    let mut node = Node::new();
    let image = image();
    node.http.route(IMAGE_URL, 200, image[..1000].to_vec());

    let outcome = node.dispatch(&command(IMAGE_URL, IMAGE_LEN, &sha_hex(&image)));

    assert_eq!(
        outcome,
        DispatchOutcome::Failed(
            IntegrityError::SizeMismatch {
                expected: IMAGE_LEN as u32,
                actual: 1000,
            }
            .into()
        )
    );
    assert_eq!(node.partition.aborts(), 1);
}

#[test]
fn oversized_body_is_cut_off() {
    let mut node = Node::new();
    node.http.route(IMAGE_URL, 200, vec![0u8; 10_000]);

    let outcome = node.dispatch(&command(IMAGE_URL, 2_000, &"0".repeat(64)));

    assert!(matches!(
        outcome,
        DispatchOutcome::Failed(AdminError::Integrity(IntegrityError::SizeMismatch {
            expected: 2_000,
            ..
        }))
    ));
    assert!(node.partition.bytes_staged() <= 2_000);
    assert_eq!(node.partition.aborts(), 1);
}

#[test]
fn unavailable_partition_is_reported_before_download() {
    let mut node = Node::new();
    node.partition = SimPartition::unavailable();

    let outcome = node.dispatch(&command(IMAGE_URL, 10, &"0".repeat(64)));

    assert_eq!(
        outcome,
        DispatchOutcome::Failed(ValidationError::OtaNotReady.into())
    );
    assert!(node.http.requests().is_empty());
}

#[test]
fn http_error_status_never_begins() {
    let mut node = Node::new();

    let outcome = node.dispatch(&command(IMAGE_URL, 10, &"0".repeat(64)));

    assert_eq!(
        outcome,
        DispatchOutcome::Failed(TransportError::Status(404).into())
    );
    assert_eq!(node.partition.begin_calls(), 0);
    assert_eq!(node.partition.aborts(), 0);
}

#[test]
fn broken_stream_aborts() {
    let mut node = Node::new();
    let image = image();
    node.http.route_broken(IMAGE_URL, image.clone(), 70_000);

    let outcome = node.dispatch(&command(IMAGE_URL, IMAGE_LEN, &sha_hex(&image)));

    assert_eq!(outcome, DispatchOutcome::Failed(TransportError::Read.into()));
    assert_eq!(node.partition.aborts(), 1);
    assert_eq!(node.partition.activated_image(), None);
    assert_eq!(node.system.resets(), 0);
}

#[test]
fn retry_after_failure_succeeds() {
    let mut node = Node::new();
    let image = image();
    node.http.route(IMAGE_URL, 200, image.clone());

    node.dispatch(&command(IMAGE_URL, IMAGE_LEN, &"0".repeat(64)));
    let outcome = node.dispatch(&command(IMAGE_URL, IMAGE_LEN, &sha_hex(&image)));

    assert_eq!(outcome, DispatchOutcome::Reset);
    assert_eq!(node.partition.begin_calls(), 2);
    assert_eq!(node.partition.aborts(), 1);
}

#[test]
fn partition_errors_map_to_partition_kind() {
    let err = AdminError::from(PartitionError::WriteFailed);
    assert_eq!(err.kind(), "partition");
}
