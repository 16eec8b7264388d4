//! Integration tests for persisting and reopening recordings

use sigrec::format::keys;
use sigrec::{
    ByteOrder, ParamValue, Recording, RecordingPaths, SampleBuffer, SampleRange, SampleStore,
    SampleType, SaveOptions, Tag, TagQuery,
};
use tempfile::tempdir;

fn sample_recording() -> Recording {
    let rows = vec![
        (0..500).map(|s| s as f64 * 0.5).collect(),
        (0..500).map(|s| -(s as f64)).collect(),
    ];
    let buffer = SampleBuffer::from_rows(rows).unwrap();
    let mut recording = Recording::new(250.0, vec!["Fp1".into(), "Fp2".into()], buffer).unwrap();
    recording.set_param(keys::FIRST_SAMPLE_TIMESTAMP, ParamValue::simple(1000.0));
    recording.set_tags(vec![
        Tag::new("blink", 1000.5, 1000.75).with_desc("eye", "left"),
        Tag::instant("cue", 1001.0).with_channels("0"),
    ]);
    recording
}

fn is_cached(recording: &Recording) -> bool {
    match recording.sample_store() {
        SampleStore::File(file) => file.is_cached(),
        SampleStore::Memory(_) => true,
    }
}

#[test]
fn test_save_and_reopen() {
    let dir = tempdir().unwrap();
    let paths = RecordingPaths::from_base(dir.path(), "session");
    let mut saved = sample_recording();
    saved.save(&paths).unwrap();

    assert!(paths.info.exists());
    assert!(paths.data.exists());

    let mut reopened = Recording::open(&paths).unwrap();
    assert_eq!(reopened.sampling_frequency().unwrap(), 250.0);
    assert_eq!(reopened.channel_names().unwrap(), vec!["Fp1", "Fp2"]);
    assert_eq!(reopened.number_of_samples().unwrap(), 500);
    assert_eq!(reopened.first_sample_timestamp().unwrap(), 1000.0);
    assert_eq!(reopened.duration().unwrap(), 2.0);

    assert_eq!(
        reopened.all_samples().unwrap(),
        saved.all_samples().unwrap()
    );
    assert_eq!(reopened.all_tags(), saved.all_tags());
}

#[test]
fn test_save_with_narrow_big_endian_samples() {
    let dir = tempdir().unwrap();
    let paths = RecordingPaths::from_base(dir.path(), "narrow");
    let mut saved = sample_recording();
    saved
        .save_with(
            &paths,
            SaveOptions {
                sample_type: Some(SampleType::Float32),
                byte_order: Some(ByteOrder::BigEndian),
            },
        )
        .unwrap();

    // 2 channels x 500 samples x 4 bytes
    assert_eq!(std::fs::metadata(&paths.data).unwrap().len(), 4000);

    let mut reopened = Recording::open(&paths).unwrap();
    assert_eq!(
        reopened.param(keys::SAMPLE_TYPE).unwrap().as_str(),
        Some("FLOAT")
    );
    assert_eq!(
        reopened.param(keys::BYTE_ORDER).unwrap().as_str(),
        Some("BIG_ENDIAN")
    );
    assert_eq!(
        reopened.all_samples().unwrap(),
        saved.all_samples().unwrap()
    );
}

#[test]
fn test_windowed_reads_stay_on_disk() {
    let dir = tempdir().unwrap();
    let paths = RecordingPaths::from_base(dir.path(), "lazy");
    sample_recording().save(&paths).unwrap();

    let mut recording = Recording::open(&paths).unwrap();
    let window = recording.samples(SampleRange::samples(10, 5)).unwrap();
    assert_eq!(window.sample_count(), 5);
    assert_eq!(window.row(0).unwrap(), &[5.0, 5.5, 6.0, 6.5, 7.0]);
    assert!(!is_cached(&recording));

    let seconds = recording.samples(SampleRange::seconds(1.0, 0.02)).unwrap();
    assert_eq!(seconds.sample_count(), 5);
    assert_eq!(seconds.row(1).unwrap()[0], -250.0);
    assert!(!is_cached(&recording));

    let err = recording
        .samples(SampleRange::samples(498, 5))
        .unwrap_err();
    assert!(err.is_stream_exhausted());

    recording.all_samples().unwrap();
    assert!(is_cached(&recording));
}

#[test]
fn test_open_from_any_artifact() {
    let dir = tempdir().unwrap();
    let paths = RecordingPaths::from_base(dir.path(), "any");
    sample_recording().save(&paths).unwrap();

    let from_data = RecordingPaths::from_any(&paths.data).unwrap();
    assert_eq!(from_data, paths);
    let from_tags = RecordingPaths::from_any(paths.tags.as_ref().unwrap()).unwrap();
    assert_eq!(from_tags, paths);

    assert!(RecordingPaths::from_any(dir.path().join("notes.txt")).is_none());
}

#[test]
fn test_missing_tags_artifact_yields_no_tags() {
    let dir = tempdir().unwrap();
    let paths = RecordingPaths::from_base(dir.path(), "untagged");
    sample_recording().save(&paths).unwrap();
    std::fs::remove_file(paths.tags.as_ref().unwrap()).unwrap();

    let recording = Recording::open(&paths).unwrap();
    assert!(recording.all_tags().is_empty());

    let without = RecordingPaths::new(&paths.info, &paths.data, None);
    let recording = Recording::open(&without).unwrap();
    assert!(recording.all_tags().is_empty());
}

#[test]
fn test_tag_queries_on_reopened_recording() {
    let dir = tempdir().unwrap();
    let paths = RecordingPaths::from_base(dir.path(), "queries");
    sample_recording().save(&paths).unwrap();
    let recording = Recording::open(&paths).unwrap();

    let blinks = recording.tags(&TagQuery::named("blink"));
    assert_eq!(blinks.len(), 1);
    assert_eq!(blinks[0].description.get("eye").map(String::as_str), Some("left"));
    assert_eq!(blinks[0].channels, None);

    let late = recording.tags(&TagQuery::all().from(1000.9));
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].name, "cue");
    assert_eq!(late[0].channels.as_deref(), Some("0"));
}

#[test]
fn test_parameter_overlay_on_file_store() {
    let dir = tempdir().unwrap();
    let paths = RecordingPaths::from_base(dir.path(), "overlay");
    sample_recording().save(&paths).unwrap();

    let mut recording = Recording::open(&paths).unwrap();
    recording.set_param(keys::SAMPLING_FREQUENCY, ParamValue::simple(500));
    assert_eq!(recording.sampling_frequency().unwrap(), 500.0);

    // The persisted header is untouched until saved
    let untouched = Recording::open(&paths).unwrap();
    assert_eq!(untouched.sampling_frequency().unwrap(), 250.0);

    recording.reset_params();
    assert_eq!(recording.sampling_frequency().unwrap(), 250.0);
}

#[test]
fn test_missing_info_artifact_fails() {
    let dir = tempdir().unwrap();
    let paths = RecordingPaths::from_base(dir.path(), "absent");
    assert!(Recording::open(&paths).is_err());
}

#[test]
fn test_unstorable_description_key_writes_nothing() {
    let dir = tempdir().unwrap();
    let paths = RecordingPaths::from_base(dir.path(), "described");
    let mut recording = sample_recording();
    recording.set_tags(vec![Tag::instant("cue", 1000.2).with_desc("stimulus type", "tone")]);

    let err = recording.save(&paths).unwrap_err();
    assert!(matches!(err, sigrec::RecordingError::InvalidArgument(_)));
    assert!(!paths.info.exists());
    assert!(!paths.data.exists());
    assert!(!paths.tags.as_ref().unwrap().exists());

    recording.set_tags(vec![Tag::instant("cue", 1000.2).with_desc("stimulus_type", "tone")]);
    recording.save(&paths).unwrap();
    let reopened = Recording::open(&paths).unwrap();
    assert_eq!(
        reopened.all_tags()[0].description.get("stimulus_type").map(String::as_str),
        Some("tone")
    );
}
