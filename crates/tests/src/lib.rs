//! # Integration Tests
//!
//! Workspace-level tests.
//!
//! Covers:
//! - Wire format snapshots of the shared contracts
//! - End-to-end measurement runs against the mock device client
//! - Fleet behaviour (clash rejection, eviction, target state reconciliation)

#[cfg(test)]
mod contract_tests {
    use contracts::{DevicePayload, MeasurementId, TargetState, TargetStatePatch};

    #[test]
    fn test_heartbeat_payload_snapshot() {
        let payload: DevicePayload = serde_json::from_value(serde_json::json!({
            "name": "rpi-01",
            "fs": 500,
            "samplesPerBatch": 125,
            "accelerometerEnabled": true,
            "accelerometerSens": 4,
            "gyroEnabled": true,
            "gyroSens": 500,
            "status": "INITIALISED",
            "serviceURL": "http://rpi-01:10002"
        }))
        .unwrap();

        assert!(TargetState::default().drift_from(&payload).is_empty());
        assert!(payload.is_idle());
    }

    #[test]
    fn test_patch_body_is_full_state() {
        let state = TargetState::default().merge(&TargetStatePatch {
            gyro_sens: Some(1000),
            ..Default::default()
        });
        let body = serde_json::to_value(state).unwrap();
        let mut keys: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "accelerometerEnabled",
                "accelerometerSens",
                "fs",
                "gyroEnabled",
                "gyroSens",
                "samplesPerBatch"
            ]
        );
        assert_eq!(body["gyroSens"], 1000);
    }

    #[test]
    fn test_config_example_loads() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            include_str!("../../../coordinator.toml"),
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(blueprint.dispatcher.workers, 1);
        let id = MeasurementId::from_raw("20240101_120000_a_b");
        assert_eq!(id.as_path().components().count(), 3);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeDelta, Utc};
    use contracts::{
        format_time, CoordinatorBlueprint, DeviceId, DevicePayload, DeviceStatus,
        MeasurementStatus, RecordStatus, Sample, SampleBatch, TargetState, TargetStatePatch,
    };
    use coordinator::{Coordinator, RunningCoordinator, SchedulerError};
    use device_client::{MockDeviceClient, MockMethod};

    fn blueprint(dir: &Path) -> CoordinatorBlueprint {
        let mut blueprint = CoordinatorBlueprint::default();
        blueprint.storage.data_dir = dir.to_path_buf();
        blueprint.scheduler.sweep_interval_ms = 20;
        blueprint.registry.eviction_interval_ms = 20;
        blueprint
    }

    fn launch(dir: &Path) -> (RunningCoordinator<MockDeviceClient>, Arc<MockDeviceClient>) {
        let client = Arc::new(MockDeviceClient::new());
        (Coordinator::launch(&blueprint(dir), Arc::clone(&client)), client)
    }

    fn heartbeat(name: &str, status: DeviceStatus) -> DevicePayload {
        let target = TargetState::default();
        DevicePayload {
            name: name.to_string(),
            fs: target.fs,
            samples_per_batch: target.samples_per_batch,
            accelerometer_enabled: target.accelerometer_enabled,
            accelerometer_sens: target.accelerometer_sens,
            gyro_enabled: target.gyro_enabled,
            gyro_sens: target.gyro_sens,
            status,
            service_url: format!("http://{name}"),
            failure_code: None,
            extra: Default::default(),
        }
    }

    fn batch(rows: &[(f64, f64)]) -> SampleBatch {
        rows.iter()
            .map(|(time, ax)| {
                let mut record = serde_json::Map::new();
                record.insert("time".into(), (*time).into());
                record.insert("ax".into(), (*ax).into());
                Sample::Record(record)
            })
            .collect()
    }

    /// One device records "first" end to end
    #[tokio::test]
    async fn test_e2e_single_device_measurement() {
        let dir = tempfile::tempdir().unwrap();
        let (running, client) = launch(dir.path());
        let coordinator = Arc::clone(running.coordinator());
        let d1 = DeviceId::from("d1");
        coordinator.heartbeat(d1.clone(), heartbeat("d1", DeviceStatus::Initialised));

        let now = Utc::now();
        let id = coordinator
            .schedule_measurement("first", 0.2, now, Some("desc".into()))
            .await
            .unwrap();

        let puts = client.calls_to(MockMethod::Put, "http://d1");
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].url, format!("http://d1/measurements/{id}"));
        assert_eq!(puts[0].body["duration"], 0.2);
        assert_eq!(puts[0].body["at"], format_time(&now));

        assert!(coordinator.start_measurement(&id, &d1).await);
        assert!(coordinator.record_data(&id, &d1, batch(&[(0.0, 1.0), (0.002, 1.1)])));
        assert!(coordinator.record_data(&id, &d1, batch(&[(0.004, 1.2)])));
        assert!(coordinator.record_data(&id, &d1, batch(&[(0.006, 1.3), (0.008, 1.4)])));
        assert!(coordinator.complete_measurement(&id, &d1).await);

        let deadline = tokio::time::Instant::now() + Duration::from_millis(1500);
        let complete = loop {
            if let Some(m) = coordinator.get_measurement(id.as_str(), Some(MeasurementStatus::Complete)) {
                break m;
            }
            assert!(tokio::time::Instant::now() < deadline, "not complete within 1.5s");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };

        assert_eq!(complete.description.as_deref(), Some("desc"));
        assert_eq!(complete.devices[&d1].state, RecordStatus::Complete);
        assert_eq!(complete.devices[&d1].count, 5);

        let data = std::fs::read_to_string(
            dir.path().join(id.as_path()).join("d1").join("data.out"),
        )
        .unwrap();
        let lines: Vec<&str> = data.lines().collect();
        assert_eq!(
            lines,
            vec!["time,ax", "0.0,1.0", "0.002,1.1", "0.004,1.2", "0.006,1.3", "0.008,1.4"]
        );

        running.shutdown().await;

        // a restarted coordinator reloads the record
        let (running, _) = launch(dir.path());
        let reloaded = running
            .coordinator()
            .get_measurement(id.as_str(), Some(MeasurementStatus::Complete))
            .unwrap();
        assert_eq!(reloaded.devices[&d1].count, 5);
        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_clash_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let (running, client) = launch(dir.path());
        let coordinator = Arc::clone(running.coordinator());
        coordinator.heartbeat("d1".into(), heartbeat("d1", DeviceStatus::Initialised));

        let start = Utc::now() + TimeDelta::minutes(5);
        let first = coordinator
            .schedule_measurement("first", 30.0, start, None)
            .await
            .unwrap();
        let before = coordinator.list_measurements(None);

        let err = coordinator
            .schedule_measurement("second", 30.0, start + TimeDelta::seconds(15), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Clash { existing } if existing == first));
        assert_eq!(coordinator.list_measurements(None), before);
        assert_eq!(client.calls_to(MockMethod::Put, "http://d1").len(), 1);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_silent_device_evicted_by_background_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut blueprint = blueprint(dir.path());
        blueprint.registry.max_age_secs = 0.1;
        let running = Coordinator::launch(&blueprint, Arc::new(MockDeviceClient::new()));
        let coordinator = Arc::clone(running.coordinator());

        coordinator.heartbeat("quiet".into(), heartbeat("quiet", DeviceStatus::Initialised));
        coordinator.heartbeat("chatty".into(), heartbeat("chatty", DeviceStatus::Initialised));

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            coordinator.heartbeat("chatty".into(), heartbeat("chatty", DeviceStatus::Initialised));
        }

        let ids: Vec<_> = coordinator
            .list_devices(None)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![DeviceId::from("chatty")]);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconciler_patch_counts() {
        let dir = tempfile::tempdir().unwrap();
        let (running, client) = launch(dir.path());
        let coordinator = Arc::clone(running.coordinator());

        // matching heartbeats never patch
        for _ in 0..3 {
            coordinator.heartbeat("d1".into(), heartbeat("d1", DeviceStatus::Initialised));
        }

        // every drifted idle heartbeat patches once, busy ones never
        let mut drifted = heartbeat("d2", DeviceStatus::Initialised);
        drifted.fs = 250;
        coordinator.heartbeat("d2".into(), drifted.clone());
        coordinator.heartbeat("d2".into(), drifted.clone());
        drifted.status = DeviceStatus::Recording;
        coordinator.heartbeat("d2".into(), drifted);

        let mut busy = heartbeat("d3", DeviceStatus::Recording);
        busy.gyro_enabled = false;
        coordinator.heartbeat("d3".into(), busy);

        let updated = coordinator.update_target_state(&TargetStatePatch {
            samples_per_batch: Some(250),
            ..Default::default()
        });

        running.shutdown().await;

        // d1 drifts only after the update; d2 is busy at the time of it
        assert_eq!(client.patch_count("http://d1"), 1);
        assert_eq!(client.patch_count("http://d2"), 2);
        assert_eq!(client.patch_count("http://d3"), 0);

        let last = client.calls_to(MockMethod::Patch, "http://d1").pop().unwrap();
        assert_eq!(last.body, serde_json::to_value(updated).unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_devices_fail_measurement() {
        let dir = tempfile::tempdir().unwrap();
        let (running, client) = launch(dir.path());
        let coordinator = Arc::clone(running.coordinator());
        client.set_failing("http://d1", true);
        client.set_status("http://d2", 409);
        coordinator.heartbeat("d1".into(), heartbeat("d1", DeviceStatus::Initialised));
        coordinator.heartbeat("d2".into(), heartbeat("d2", DeviceStatus::Initialised));

        let id = coordinator
            .schedule_measurement("doomed", 0.1, Utc::now(), None)
            .await
            .unwrap();
        let m = coordinator.get_measurement(id.as_str(), None).unwrap();
        assert_eq!(m.status, MeasurementStatus::Scheduled);
        assert!(m.all_devices(RecordStatus::Failed));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(4);
        while coordinator
            .get_measurement(id.as_str(), Some(MeasurementStatus::Failed))
            .is_none()
        {
            assert!(tokio::time::Instant::now() < deadline, "never failed");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let deleted = coordinator.delete_measurement(id.as_str()).unwrap();
        assert_eq!(deleted.id, id);
        assert!(coordinator.list_measurements(None).is_empty());

        running.shutdown().await;
    }
}
