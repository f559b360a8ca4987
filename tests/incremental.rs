// Reloading an encoded database and continuing to insert.

use sing_geoip::{BuildOptions, Database, GeoIpError, LoadOptions, Prefix, RecordSize, Trie};
use std::net::IpAddr;

fn p(s: &str) -> Prefix {
    s.parse().unwrap()
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn test_load_insert_reencode() {
    let mut trie = Trie::new(BuildOptions::new(["us"]));
    trie.insert(p("1.0.0.0/8"), "us");
    let original = trie.to_bytes().unwrap();

    let mut reloaded = Trie::load(&original, LoadOptions::default().with_languages(["jp"])).unwrap();
    reloaded.insert(p("1.2.0.0/16"), "jp");
    let updated = reloaded.to_bytes().unwrap();

    let db = Database::from_bytes(updated).unwrap();
    assert_eq!(db.lookup_label(ip("1.2.3.4")).unwrap().as_deref(), Some("jp"));
    assert_eq!(db.lookup_label(ip("1.5.5.5")).unwrap().as_deref(), Some("us"));
    assert_eq!(db.metadata().languages, vec!["us", "jp"]);
}

#[test]
fn test_reload_keeps_file_settings() {
    let trie = Trie::new(
        BuildOptions::new(["cn"])
            .with_record_size(RecordSize::Bits28)
            .with_description("en", "Country codes"),
    );
    let bytes = trie.to_bytes().unwrap();

    let reloaded = Trie::load(&bytes, LoadOptions::default().with_build_epoch(99)).unwrap();
    let options = reloaded.options();
    assert_eq!(options.record_size, RecordSize::Bits28);
    assert_eq!(options.description.get("en").map(String::as_str), Some("Country codes"));
    assert_eq!(options.build_epoch, 99);
    assert_eq!(options.database_type, "sing-geoip");
}

#[test]
fn test_reload_refuses_other_schemas() {
    let trie = Trie::new(BuildOptions::default().with_database_type("GeoIP2-City"));
    let bytes = trie.to_bytes().unwrap();

    match Trie::load(&bytes, LoadOptions::default()) {
        Err(GeoIpError::FormatMismatch { expected, found }) => {
            assert_eq!(expected, "sing-geoip");
            assert_eq!(found, "GeoIP2-City");
        }
        other => panic!("expected FormatMismatch, got {:?}", other.map(|_| ())),
    }

    // Accepted when that schema is expected
    assert!(Trie::load(
        &bytes,
        LoadOptions::default().with_expected_database_type("GeoIP2-City")
    )
    .is_ok());
}

#[test]
fn test_reload_corrupt_files() {
    let mut trie = Trie::default();
    trie.insert(p("1.0.0.0/8"), "us");
    let mut bytes = trie.to_bytes().unwrap();

    // Point the root's left record past the end of the data section
    bytes[0] = 0xFF;
    bytes[1] = 0xFF;
    bytes[2] = 0xFF;
    assert!(matches!(
        Trie::load(&bytes, LoadOptions::default()),
        Err(GeoIpError::CorruptData(_))
    ));

    assert!(matches!(
        Trie::load(b"", LoadOptions::default()),
        Err(GeoIpError::CorruptData(_))
    ));
}

#[test]
fn test_reload_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geoip.db");

    let mut trie = Trie::new(BuildOptions::new(["us"]));
    trie.insert(p("2001:db8::/32"), "us");
    trie.write_to_path(&path).unwrap();

    let mut reloaded = Trie::load_path(&path, LoadOptions::default()).unwrap();
    reloaded.insert(p("2001:db8:1::/48"), "jp");
    reloaded.write_to_path(&path).unwrap();

    let db = Database::open(&path).unwrap();
    assert_eq!(db.lookup_label(ip("2001:db8:1::5")).unwrap().as_deref(), Some("jp"));
    assert_eq!(db.lookup_label(ip("2001:db8:2::5")).unwrap().as_deref(), Some("us"));
}
