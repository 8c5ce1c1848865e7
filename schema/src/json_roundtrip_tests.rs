//! JSON wire-format tests for script types
//!
//! The control protocol is consumed by other tools, so key names and tag
//! values are pinned here rather than only checked for round-trips.

#[cfg(test)]
mod tests {
    use crate::*;
    use serde_json::json;

    fn test_json_roundtrip<T>(original: &T)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let json = serde_json::to_string(original).expect("Failed to serialize to JSON");
        let deserialized: T = serde_json::from_str(&json).expect("Failed to deserialize from JSON");
        assert_eq!(*original, deserialized, "Round-trip failed for JSON: {}", json);
    }

    #[test]
    fn test_log_entry_wire_format() {
        let entry = LogEntry {
            seq: 12,
            timestamp: "2024-05-01T10:00:00.123Z".to_string(),
            stream_kind: LogStream::Stderr,
            message: "Traceback (most recent call last):".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "seq": 12,
                "timestamp": "2024-05-01T10:00:00.123Z",
                "streamKind": "stderr",
                "message": "Traceback (most recent call last):",
            })
        );
        test_json_roundtrip(&entry);
    }

    #[test]
    fn test_status_report_wire_format() {
        let finished = ScriptStatusReport::Finished {
            pid: 4242,
            start_time: "2024-05-01T10:00:00.000Z".to_string(),
            command: vec!["python3".to_string(), "scripts/a.py".to_string()],
            return_code: Some(1),
        };
        let value = serde_json::to_value(&finished).unwrap();
        assert_eq!(value["status"], "finished");
        assert_eq!(value["returnCode"], 1);
        assert_eq!(value["startTime"], "2024-05-01T10:00:00.000Z");
        test_json_roundtrip(&finished);

        // Death by signal carries no return code at all
        let killed = ScriptStatusReport::Finished {
            pid: 4242,
            start_time: "t".to_string(),
            command: vec![],
            return_code: None,
        };
        let value = serde_json::to_value(&killed).unwrap();
        assert!(value.get("returnCode").is_none());
        test_json_roundtrip(&killed);

        assert_eq!(
            serde_json::to_value(ScriptStatusReport::NotRunning).unwrap(),
            json!({ "status": "not_running" })
        );
    }

    #[test]
    fn test_running_listing_wire_format() {
        let response = Response::Running {
            scripts: vec![RunningScript {
                name: "a.py".to_string(),
                pid: 10,
                start_time: "t".to_string(),
                status: ScriptState::Running,
                command: vec!["a.py".to_string()],
                task: "web".to_string(),
            }],
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "running");
        assert_eq!(value["scripts"][0]["status"], "running");
        assert_eq!(value["scripts"][0]["task"], "web");
    }

    #[test]
    fn test_logs_response_flattens_snapshot() {
        let response = Response::Logs(LogSnapshot {
            next_seq: 3,
            total_dropped: 1,
            entries: vec![],
        });
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "type": "logs", "nextSeq": 3, "totalDropped": 1, "entries": [] })
        );
    }

    #[test]
    fn test_started_response_wire_format() {
        let response = Response::Started(StartedScript {
            pid: 99,
            command: vec!["/bin/sh".to_string(), "x.sh".to_string()],
            task: String::new(),
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "started");
        assert_eq!(value["pid"], 99);

        let back: Response = serde_json::from_value(value).unwrap();
        assert!(matches!(back, Response::Started(s) if s.pid == 99));
    }
}
