//! Create, fetch, update, search and delete against the in-memory transport.

mod common;

use chrono::NaiveDate;

use common::{single_device, Observation, USER_ID};
use phr_core::{DateRange, PhrError, MODEL_VERSION};
use phr_crypto::tags;
use phr_records::{Record, RecordQuery};
use phr_storage::RecordTransport;

#[tokio::test]
async fn test_create_then_fetch_roundtrip() {
    let (device, _, _) = single_device().await;
    let date = NaiveDate::from_ymd_opt(2021, 3, 14);

    let created = device
        .pipeline
        .create_record(Observation::new("glucose", 5.4), vec!["fasting".into()], date)
        .await
        .unwrap();
    assert!(!created.identifier.is_empty());
    assert_eq!(created.meta.created_date, date);

    let fetched: Record<Observation> = device
        .pipeline
        .fetch_record(&created.identifier)
        .await
        .unwrap();
    assert_eq!(fetched.resource, Observation::new("glucose", 5.4));
    assert_eq!(fetched.annotations, vec!["fasting"]);
    assert_eq!(fetched.meta.created_date, date);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_wire_record_carries_no_plaintext() {
    let (device, _, transport) = single_device().await;
    let created = device
        .pipeline
        .create_record(Observation::new("heart-rate", 61.0), vec!["resting".into()], None)
        .await
        .unwrap();

    let wire = transport
        .fetch_record(USER_ID, &created.identifier)
        .await
        .unwrap();
    assert_eq!(wire.model_version, MODEL_VERSION);
    assert_eq!(wire.common_key_id.as_deref(), Some("ck-1"));
    assert!(wire.encrypted_attachment_key.is_none());
    assert!(!wire.encrypted_body.contains("heart-rate"));
    for tag in &wire.encrypted_tags {
        assert!(!tag.starts_with("resourcetype"), "plaintext tag on the wire: {tag}");
        assert!(!tag.contains("resting"));
        assert!(!tag.contains("Observation"));
    }

    let tag_key = device.ctx.keyring().require_tag_key().unwrap();
    let plain = tags::decrypt_tags(&tag_key, &wire.encrypted_tags).unwrap();
    assert!(plain.contains(&"resourcetype=Observation".to_string()));
    assert!(plain.contains(&"client=acme#tests".to_string()));
    assert!(plain.contains(&"partner=acme".to_string()));
    assert!(plain.contains(&"custom=resting".to_string()));
}

#[tokio::test]
async fn test_update_keeps_creation_data() {
    let (device, _, transport) = single_device().await;
    let date = NaiveDate::from_ymd_opt(2019, 7, 1);
    let created = device
        .pipeline
        .create_record(Observation::new("weight", 80.0), vec!["scale".into()], date)
        .await
        .unwrap();
    let before = transport
        .fetch_record(USER_ID, &created.identifier)
        .await
        .unwrap();

    let updated = device
        .pipeline
        .update_record(&created.identifier, Observation::new("weight", 78.5), None)
        .await
        .unwrap();
    assert_eq!(updated.identifier, created.identifier);
    assert_eq!(updated.resource.value, 78.5);
    assert_eq!(updated.annotations, vec!["scale"]);
    assert_eq!(updated.meta.created_date, date);

    let after = transport
        .fetch_record(USER_ID, &created.identifier)
        .await
        .unwrap();
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.custom_creation_date, date);
    assert_ne!(after.encrypted_body, before.encrypted_body);

    let tag_key = device.ctx.keyring().require_tag_key().unwrap();
    let plain = tags::decrypt_tags(&tag_key, &after.encrypted_tags).unwrap();
    assert!(plain.contains(&"updatedbyclient=acme#tests".to_string()));

    let fetched: Record<Observation> = device
        .pipeline
        .fetch_record(&created.identifier)
        .await
        .unwrap();
    assert_eq!(fetched.resource, Observation::new("weight", 78.5));
}

#[tokio::test]
async fn test_update_replaces_annotations_when_given() {
    let (device, _, _) = single_device().await;
    let created = device
        .pipeline
        .create_record(Observation::new("steps", 9000.0), vec!["walk".into()], None)
        .await
        .unwrap();

    let updated = device
        .pipeline
        .update_record(
            &created.identifier,
            Observation::new("steps", 12000.0),
            Some(vec!["run".into(), "park".into()]),
        )
        .await
        .unwrap();
    assert_eq!(updated.annotations, vec!["run", "park"]);
}

#[tokio::test]
async fn test_search_by_type_annotation_and_date() {
    let (device, _, _) = single_device().await;
    let pipeline = &device.pipeline;
    pipeline
        .create_record(
            Observation::new("bp", 120.0),
            vec!["morning".into()],
            NaiveDate::from_ymd_opt(2022, 1, 10),
        )
        .await
        .unwrap();
    pipeline
        .create_record(
            Observation::new("bp", 135.0),
            vec!["evening".into()],
            NaiveDate::from_ymd_opt(2022, 6, 10),
        )
        .await
        .unwrap();

    let all = RecordQuery {
        resource_type: Some("Observation".into()),
        ..Default::default()
    };
    let found = pipeline.search_records::<Observation>(&all).await.unwrap();
    assert_eq!(found.successful.len(), 2);
    assert!(found.is_complete_success());
    assert_eq!(pipeline.count_records(&all).await.unwrap(), 2);

    let morning = RecordQuery {
        annotations: vec!["morning".into()],
        ..all.clone()
    };
    let found = pipeline.search_records::<Observation>(&morning).await.unwrap();
    assert_eq!(found.successful.len(), 1);
    assert_eq!(found.successful[0].resource.value, 120.0);

    let first_half = RecordQuery {
        date_range: DateRange {
            start: NaiveDate::from_ymd_opt(2022, 1, 1),
            end: NaiveDate::from_ymd_opt(2022, 3, 31),
        },
        ..all.clone()
    };
    assert_eq!(pipeline.count_records(&first_half).await.unwrap(), 1);

    let other_type = RecordQuery {
        resource_type: Some("Patient".into()),
        ..Default::default()
    };
    assert_eq!(pipeline.count_records(&other_type).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_then_fetch_fails() {
    let (device, _, _) = single_device().await;
    let created = device
        .pipeline
        .create_record(Observation::new("temp", 36.6), Vec::new(), None)
        .await
        .unwrap();

    device
        .pipeline
        .delete_record(&created.identifier)
        .await
        .unwrap();
    let err = device
        .pipeline
        .fetch_record::<Observation>(&created.identifier)
        .await
        .unwrap_err();
    assert!(matches!(err, PhrError::TransportFailed { .. }));
}

#[tokio::test]
async fn test_newer_model_version_rejected() {
    let (device, _, transport) = single_device().await;
    let created = device
        .pipeline
        .create_record(Observation::new("spo2", 98.0), Vec::new(), None)
        .await
        .unwrap();

    let mut wire = transport
        .fetch_record(USER_ID, &created.identifier)
        .await
        .unwrap();
    wire.model_version = MODEL_VERSION + 1;
    transport
        .update_record(USER_ID, &created.identifier, wire)
        .await
        .unwrap();

    let err = device
        .pipeline
        .fetch_record::<Observation>(&created.identifier)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PhrError::ModelVersionNotSupported { found, supported }
            if found == MODEL_VERSION + 1 && supported == MODEL_VERSION
    ));
}

#[tokio::test]
async fn test_empty_annotation_rejected() {
    let (device, _, _) = single_device().await;
    let err = device
        .pipeline
        .create_record(Observation::new("bmi", 22.0), vec![String::new()], None)
        .await
        .unwrap_err();
    assert!(matches!(err, PhrError::ValidationFailed(_)));
}

#[tokio::test]
async fn test_operations_require_login() {
    let (device, _, _) = single_device().await;
    device.ctx.logout().unwrap();
    assert!(!device.ctx.is_logged_in());

    let err = device
        .pipeline
        .create_record(Observation::new("bmi", 22.0), Vec::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PhrError::UnsupportedOperation(_)));
}
