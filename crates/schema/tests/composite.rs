//! Composite objects over real files.

use std::path::Path;
use std::time::Duration;

use keepsake_persist::{ContainerConfig, LockedAccess, PersistError, PersistentData};
use keepsake_schema::{
    Composite, FieldSpec, ObjectError, PersistentObject, Schema, SchemaError,
};

fn service_schema() -> Schema {
    Schema::builder()
        .field(FieldSpec::list::<String>("hosts"))
        .field(FieldSpec::value::<u32>("retries").default_value(3u32))
        .field(FieldSpec::map::<String, String>("labels"))
        .build()
        .unwrap()
}

fn manual() -> ContainerConfig {
    ContainerConfig {
        background_writer: false,
        flush_on_drop: false,
        ..ContainerConfig::default()
    }
}

fn open_manual(path: &Path) -> PersistentObject {
    PersistentObject::open_with(path, service_schema(), manual()).unwrap()
}

#[test]
fn list_field_starts_empty_and_persists_appends() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("service.json");
    let service = PersistentObject::open(&path, service_schema()).unwrap();

    let hosts = service.list::<String>("hosts").unwrap();
    assert!(hosts.is_empty());
    assert_eq!(service.get::<u32>("retries").unwrap(), 3);
    assert!(!path.exists());

    hosts.push("alpha".into());
    assert!(service.is_dirty());
    assert!(service.wait_for_flush(Duration::from_secs(5)));

    let reopened = open_manual(&path);
    assert_eq!(reopened.get::<Vec<String>>("hosts").unwrap(), vec!["alpha"]);
    assert_eq!(reopened.get::<u32>("retries").unwrap(), 3);
    assert_eq!(
        reopened.to_json().unwrap(),
        serde_json::json!({"hosts": ["alpha"], "labels": {}, "retries": 3})
    );
}

#[test]
fn views_and_puts_share_one_root() {
    let tmp = tempfile::tempdir().unwrap();
    let service = open_manual(&tmp.path().join("service.json"));
    let labels = service.map::<String, String>("labels").unwrap();
    let retries = service.value::<u32>("retries").unwrap();

    labels.insert("tier".into(), "gold".into());
    retries.set(5);
    service.put("hosts", vec!["h1".to_string()]).unwrap();

    let (host_count, tier) = service.read_locked(|record| {
        (
            record.get::<Vec<String>>("hosts").map(Vec::len),
            record
                .get::<std::collections::BTreeMap<String, String>>("labels")
                .and_then(|m| m.get("tier").cloned()),
        )
    });
    assert_eq!(host_count, Some(1));
    assert_eq!(tier.as_deref(), Some("gold"));
    assert_eq!(service.get::<u32>("retries").unwrap(), 5);

    service.write_locked(|record| {
        if let Some(n) = record.get_mut::<u32>("retries") {
            *n += 1;
        }
    });
    assert_eq!(retries.get(), 6);
}

#[test]
fn reload_is_seen_through_existing_views() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("service.json");
    let service = open_manual(&path);
    let hosts = service.list::<String>("hosts").unwrap();
    hosts.push("stale".into());

    std::fs::write(&path, r#"{"hosts": ["x", "y"], "retries": 1}"#).unwrap();
    service.reload().unwrap();

    assert_eq!(hosts.to_vec(), vec!["x", "y"]);
    assert_eq!(service.get::<u32>("retries").unwrap(), 1);
    assert!(service.map::<String, String>("labels").unwrap().is_empty());
    assert!(!service.is_dirty());
}

#[test]
fn swapping_in_a_foreign_record_keeps_the_schema_shape() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("service.json");
    let service = open_manual(&path);
    let hosts = service.list::<String>("hosts").unwrap();
    hosts.push("alpha".into());
    service.flush().unwrap();

    let flags_schema = Schema::builder()
        .field(FieldSpec::value::<bool>("enabled").default_value(true))
        .build()
        .unwrap();
    let flags =
        PersistentObject::open_with(tmp.path().join("flags.json"), flags_schema, manual()).unwrap();

    service.write_locked(|mine| flags.write_locked(|theirs| std::mem::swap(mine, theirs)));

    assert!(hosts.is_empty());
    hosts.push("beta".into());
    assert_eq!(service.get::<u32>("retries").unwrap(), 3);
    assert!(flags.get::<bool>("enabled").unwrap());
    assert!(service.is_dirty());
    assert!(flags.is_dirty());

    assert!(service.flush().unwrap());
    assert!(flags.flush().unwrap());
    assert_eq!(
        open_manual(&path).to_json().unwrap(),
        serde_json::json!({"hosts": ["beta"], "labels": {}, "retries": 3})
    );
}

#[test]
fn test_write_marks_dirty_when_record_needed_repair() {
    let tmp = tempfile::tempdir().unwrap();
    let service = open_manual(&tmp.path().join("service.json"));
    let empty = Schema::builder().build().unwrap();
    let bare = PersistentObject::open_with(tmp.path().join("bare.json"), empty, manual()).unwrap();

    service.test_write_locked(|record| record.len(), |_| false);
    assert!(!service.is_dirty());

    service.test_write_locked(
        |mine| bare.test_write_locked(|theirs| std::mem::swap(mine, theirs), |_| false),
        |_| false,
    );
    assert!(service.is_dirty());
    assert!(bare.is_dirty());
    assert_eq!(service.get::<u32>("retries").unwrap(), 3);
    assert!(bare.read_locked(|record| record.is_empty()));
}

#[test]
fn accessors_check_names_and_types() {
    let tmp = tempfile::tempdir().unwrap();
    let service = open_manual(&tmp.path().join("service.json"));

    assert!(matches!(
        service.get::<u32>("port"),
        Err(ObjectError::UnknownField(name)) if name == "port"
    ));
    assert!(matches!(
        service.get::<String>("retries"),
        Err(ObjectError::FieldType { .. })
    ));
    assert!(matches!(
        service.list::<u8>("hosts"),
        Err(ObjectError::FieldType { .. })
    ));
    assert!(service.set::<String>("hosts").is_err());
    assert!(service.put("retries", 7i64).is_err());
    assert!(!service.is_dirty());
}

#[test]
fn non_object_document_fails_open() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("service.json");
    std::fs::write(&path, "[1, 2, 3]").unwrap();

    let err = PersistentObject::open_with(&path, service_schema(), manual()).unwrap_err();
    match err {
        ObjectError::Persist(PersistError::Load { source, .. }) => {
            assert!(matches!(*source, PersistError::Document(_)));
        }
        other => panic!("expected load failure, got {other}"),
    }
}

#[test]
fn equal_content_means_equal_objects() {
    let tmp = tempfile::tempdir().unwrap();
    let left = open_manual(&tmp.path().join("left.json"));
    let right = open_manual(&tmp.path().join("right.json"));
    assert_eq!(left, right);

    left.list::<String>("hosts").unwrap().push("a".into());
    assert_ne!(left, right);
    assert_eq!(left, left.clone());
    assert_eq!(
        format!("{left:?}"),
        r#"{"hosts":["a"],"labels":{},"retries":3}"#
    );
}

struct Service(PersistentObject);

impl Composite for Service {
    fn schema() -> Result<Schema, SchemaError> {
        Schema::builder()
            .field(FieldSpec::list::<String>("hosts"))
            .field(FieldSpec::value::<u32>("retries").default_value(3u32))
            .build()
    }

    fn from_object(object: PersistentObject) -> Self {
        Service(object)
    }
}

impl Service {
    fn add_host(&self, host: &str) -> Result<(), ObjectError> {
        self.0.list::<String>("hosts")?.push(host.to_owned());
        Ok(())
    }

    fn primary(&self) -> Result<Option<String>, ObjectError> {
        Ok(self.0.list::<String>("hosts")?.first())
    }
}

#[test]
fn composite_wrapper_adds_convenience_methods() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("wrapped.json");
    let service = PersistentObject::open_as::<Service>(&path).unwrap();
    assert_eq!(service.primary().unwrap(), None);
    service.add_host("edge-1").unwrap();
    service.add_host("edge-2").unwrap();
    assert_eq!(service.primary().unwrap().as_deref(), Some("edge-1"));
    assert!(service.0.flush().unwrap());

    let again = PersistentObject::open_as::<Service>(&path).unwrap();
    assert_eq!(again.0.get::<Vec<String>>("hosts").unwrap().len(), 2);
}

struct Broken;

impl Composite for Broken {
    fn schema() -> Result<Schema, SchemaError> {
        Schema::builder()
            .field(FieldSpec::value::<u32>("retries"))
            .build()
    }

    fn from_object(_: PersistentObject) -> Self {
        Broken
    }
}

#[test]
fn invalid_schema_prevents_open() {
    let tmp = tempfile::tempdir().unwrap();
    let result = PersistentObject::open_as::<Broken>(tmp.path().join("never.json"));
    assert!(matches!(
        result,
        Err(ObjectError::Schema(SchemaError::MissingDefault(_)))
    ));
    assert!(!tmp.path().join("never.json").exists());
}
