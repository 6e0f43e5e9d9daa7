use std::path::PathBuf;

use dhcpd_conf::{parse, parse_file, write, write_file, HostRecord, Placement};
use pretty_assertions::assert_eq;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn unmodified_document_serializes_byte_for_byte() {
    let source = std::fs::read_to_string(fixture("fixtures/dhcpd.conf")).expect("read");
    assert_eq!(write(&parse(&source)), source);
}

#[test]
fn odd_layouts_serialize_byte_for_byte() {
    for text in [
        "host a { hardware ethernet 00:11:22:33:44:55; fixed-address 10.0.0.2; }",
        "\r\nhost a {\r\n hardware ethernet 00:11:22:33:44:55;\r\n fixed-address 10.0.0.2;\r\n}\r\n",
        "subnet x {\n\thost a {\n\t}\n\t# Data: 2024-01-01 00:00:00   \n}",
        "}}}{{{",
    ] {
        assert_eq!(write(&parse(text)), text);
    }
}

#[test]
fn insert_then_write_file_reparses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dhcpd.conf");
    std::fs::copy(fixture("fixtures/dhcpd.conf"), &path).expect("copy fixture");

    let mut doc = parse_file(&path).expect("parse");
    let placement = doc.insert_host(&HostRecord {
        name: "camera_2".to_string(),
        mac_address: "AA:BB:CC:DD:EE:10".to_string(),
        ip_address: "10.0.0.31".to_string(),
        registration_date: "2025-02-03 04:05:06".to_string(),
    });
    assert_eq!(placement, Placement::BeforeTerminator);
    write_file(&doc, &path).expect("write");

    let text = std::fs::read_to_string(&path).expect("read back");
    assert!(text.ends_with(
        "        # Data: 2024-05-20 17:42:08\n\
         host camera_2 {\n        hardware ethernet AA:BB:CC:DD:EE:10;\n        fixed-address 10.0.0.31;\n        }\n        # Data: 2025-02-03 04:05:06\n\
         }\n"
    ));

    let reparsed = parse_file(&path).expect("reparse");
    assert_eq!(reparsed, doc);
    assert_eq!(reparsed.hosts().len(), 4);
}

#[test]
fn write_file_leaves_no_temp_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dhcpd.conf");
    write_file(&parse("authoritative;\n"), &path).expect("write");

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read_dir")
        .map(|e| e.expect("entry").file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("dhcpd.conf")]);
}

#[cfg(unix)]
#[test]
fn write_file_keeps_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dhcpd.conf");
    std::fs::write(&path, "authoritative;\n").expect("seed");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).expect("chmod");

    write_file(&parse("authoritative;\nlog-facility local7;\n"), &path).expect("write");

    let mode = std::fs::metadata(&path).expect("meta").permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
}
