use beam_core::{
    file::FileRecord, BeamError, SessionMode, SignalingPayload,
};
use chrono::{TimeZone, Utc};
use rstest::rstest;
use url::Url;

fn batch(names: &[&str]) -> Vec<FileRecord> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mime = mime_guess::from_path(name)
                .first_or_octet_stream()
                .to_string();
            FileRecord::new(i, *name, (i as u64 + 1) * 1024, mime)
        })
        .collect()
}

fn uploaded(records: Vec<FileRecord>) -> Vec<FileRecord> {
    records
        .into_iter()
        .map(|r| {
            let url = Url::parse("https://res.example.com/beam/")
                .unwrap()
                .join(&r.name)
                .unwrap();
            r.with_locator(url)
        })
        .collect()
}

#[rstest]
#[case::single(&["report.pdf"])]
#[case::mixed(&["a.png", "b.mp4", "notes.txt", "archive.tar.gz"])]
#[case::unicode(&["résumé final.docx", "фото.jpg"])]
fn direct_payloads_survive_the_code(#[case] names: &[&str]) {
    let payload = SignalingPayload::build(
        SessionMode::Direct,
        batch(names),
        Some("192.168.1.20:40411"),
    )
    .unwrap();

    let decoded = SignalingPayload::decode(&payload.encode().unwrap()).unwrap();
    assert_eq!(decoded, payload);
    assert_eq!(SessionMode::dispatch(&decoded), SessionMode::Direct);
}

#[rstest]
#[case::single(&["sunset.jpg"])]
#[case::album(&["1.jpg", "2.jpg", "3.heic", "clip.mov"])]
fn relay_payloads_survive_the_code(#[case] names: &[&str]) {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
    let payload =
        SignalingPayload::relay(uploaded(batch(names)), created_at).unwrap();

    let decoded = SignalingPayload::decode(&payload.encode().unwrap()).unwrap();
    assert_eq!(decoded, payload);
    assert_eq!(SessionMode::dispatch(&decoded), SessionMode::Relay);
}

#[test]
fn relay_timestamps_keep_sub_second_precision() {
    let payload = SignalingPayload::build(
        SessionMode::Relay,
        uploaded(batch(&["a.png"])),
        None,
    )
    .unwrap();
    let decoded = SignalingPayload::decode(&payload.encode().unwrap()).unwrap();
    assert_eq!(decoded, payload);
}

#[test]
fn decode_errors_read_as_invalid_code() {
    let malformed = SignalingPayload::decode("not json").unwrap_err();
    assert!(matches!(malformed, BeamError::MalformedPayload(_)));
    assert!(malformed.is_invalid_code());

    let empty = SignalingPayload::decode(r#"{"files":[]}"#).unwrap_err();
    assert!(matches!(empty, BeamError::UnrecognizedShape(_)));
    assert!(empty.is_invalid_code());

    assert!(!BeamError::CameraUnavailable.is_invalid_code());
}

#[test]
fn payload_written_by_another_client_decodes() {
    let raw = r#"{
        "mode": "DIRECT",
        "sessionHostId": "peer-7f3c",
        "files": [
            {"name": "a.txt", "size": 10, "mimeType": "text/plain", "sequenceIndex": 0},
            {"name": "b.txt", "size": 20, "mimeType": "text/plain", "sequenceIndex": 1}
        ]
    }"#;
    match SignalingPayload::decode(raw).unwrap() {
        SignalingPayload::Direct(direct) => {
            assert_eq!(direct.session_host_id, "peer-7f3c");
            assert_eq!(direct.files[1].size, 20);
        }
        other => panic!("decoded as {:?}", other),
    }
}
