fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chunkflow_protocol::{ApiResponse, ChunkUploadInfo, InitUploadRequest, UploadStatus};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON numbers so that `100` and `100.0` compare equal.
    ///
    /// The server writes whole-number progress without a fraction while
    /// `f64` fields always serialize with one.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture, re-serializes it and compares the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  server: {fixture}\n  client: {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_init_response() {
        let resp = roundtrip_test::<ApiResponse<ChunkUploadInfo>>("init_response.json");
        assert!(resp.is_success());
        let info = resp.data.expect("init data");
        assert_eq!(info.upload_id, "7f3c9a2e41d04b8f");
        assert_eq!(info.chunk_size, Some(5_242_880));
        assert_eq!(info.total_chunks, Some(3));
        assert_eq!(info.status, Some(UploadStatus::Uploading));
    }

    #[test]
    fn fixture_progress_completed() {
        let resp = roundtrip_test::<ApiResponse<ChunkUploadInfo>>("progress_completed.json");
        let info = resp.data.expect("progress data");
        assert_eq!(info.status, Some(UploadStatus::Completed));
        assert!(!info.status.is_some_and(UploadStatus::accepts_chunks));
        assert!((info.percentage() - 100.0).abs() < f64::EPSILON);
        assert!(info.final_path.is_some());
        assert!(info.expires_at.is_none());
    }

    #[test]
    fn fixture_merge_response() {
        let resp = roundtrip_test::<ApiResponse<String>>("merge_response.json");
        assert_eq!(
            resp.into_result(),
            Ok(Some("/data/uploads/2026/10/19/quarterly-report.pdf".into()))
        );
    }

    #[test]
    fn fixture_chunk_check_response() {
        let resp = roundtrip_test::<ApiResponse<bool>>("chunk_check_response.json");
        assert_eq!(resp.data, Some(false));
    }

    #[test]
    fn fixture_cleanup_response() {
        let resp = roundtrip_test::<ApiResponse<u32>>("cleanup_response.json");
        assert_eq!(resp.data, Some(4));
    }

    #[test]
    fn fixture_error_response() {
        let resp = roundtrip_test::<ApiResponse<serde_json::Value>>("error_response.json");
        assert!(!resp.is_success());
        assert_eq!(resp.into_result(), Err((404, "上传任务不存在".into())));
    }

    #[test]
    fn fixture_init_upload_request() {
        let req = roundtrip_test::<InitUploadRequest>("init_upload_request.json");
        let keys: Vec<_> = req.query_pairs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            ["fileName", "fileSize", "totalChunks", "md5Hash", "userId"]
        );
    }
}
