use std::{path::PathBuf, time::Duration};

use dm_capture::{create_tasks, CaptureConfig, CaptureEvent};
use dm_client::Task;
use dm_depth::FrameEncoding;
use dm_types::{ImageResponse, ImageType};
use dm_vehicle::{
    testing::{depth_response, Journal, ScriptedVehicleInterface},
    VehicleLink, VehicleTask,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("dm-capture-{}", uuid::Uuid::new_v4()))
}

fn config(save_path: PathBuf) -> CaptureConfig {
    CaptureConfig {
        save_path,
        frame_rate: 0.5,
        encoding: FrameEncoding::RawFloat,
        camera_name: "1".into(),
        image_type: ImageType::DepthVis,
        request_scene: true,
        preview: None,
    }
}

async fn connected(interface: ScriptedVehicleInterface) -> (VehicleLink, Journal, CancellationToken) {
    let journal = interface.journal();
    let task = VehicleTask::new(Box::new(interface), Duration::from_secs(10));
    let link = task.link();
    let cancel = CancellationToken::new();
    tokio::spawn(Box::new(task).run(cancel.clone()));

    link.connect().await.unwrap();
    (link, journal, cancel)
}

#[tokio::test(start_paused = true)]
async fn missing_image_is_skipped() {
    let interface = ScriptedVehicleInterface::new().with_images(vec![
        vec![depth_response(4, 2, 1)],
        vec![],
        vec![depth_response(4, 2, 3)],
    ]);
    let (link, _journal, _vehicle) = connected(interface).await;

    let root = scratch_dir();
    let (capture, preview) = create_tasks(config(root.clone()), link).unwrap();
    assert!(preview.is_none());

    let save_dir = capture.save_dir().to_owned();
    assert!(save_dir.starts_with(&root));

    let events = capture.events();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Box::new(capture).run(cancel.clone()));

    let mut received = vec![];
    for _ in 0..3 {
        received.push(events.recv_async().await.unwrap());
    }
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(
        received[0],
        CaptureEvent::Persisted {
            timestamp: 1,
            path: save_dir.join("1.f32"),
        }
    );
    assert!(matches!(received[1], CaptureEvent::Missed { .. }));
    assert_eq!(
        received[2],
        CaptureEvent::Persisted {
            timestamp: 3,
            path: save_dir.join("3.f32"),
        }
    );

    assert!(save_dir.join("1.f32").exists());
    assert!(save_dir.join("1.json").exists());
    assert!(save_dir.join("3.f32").exists());

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test(start_paused = true)]
async fn captures_at_the_configured_rate() {
    let (link, _journal, _vehicle) = connected(ScriptedVehicleInterface::new()).await;

    let root = scratch_dir();
    let (capture, _) = create_tasks(config(root.clone()), link).unwrap();
    let events = capture.events();

    let start = Instant::now();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Box::new(capture).run(cancel.clone()));

    for n in 0..3u32 {
        let event = events.recv_async().await.unwrap();
        assert!(matches!(event, CaptureEvent::Persisted { .. }), "{event:?}");

        let expected = Duration::from_secs(2) * n;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(100),
            "frame {n} after {elapsed:?}"
        );
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancellation_waits_for_the_frame_in_flight() {
    let interface = ScriptedVehicleInterface::new().with_image_delay(Duration::from_secs(5));
    let (link, journal, _vehicle) = connected(interface).await;

    let root = scratch_dir();
    let (capture, _) = create_tasks(config(root.clone()), link).unwrap();
    let events = capture.events();

    let start = Instant::now();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Box::new(capture).run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(journal.count("sim_get_images"), 1);

    let received: Vec<_> = events.drain().collect();
    assert_eq!(received.len(), 1);
    assert!(matches!(received[0], CaptureEvent::Persisted { .. }));

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test(start_paused = true)]
async fn malformed_frame_is_dropped() {
    let malformed = ImageResponse {
        image_data_float: vec![0.0; 7],
        ..depth_response(4, 2, 9)
    };
    let interface = ScriptedVehicleInterface::new().with_images(vec![vec![malformed]]);
    let (link, _journal, _vehicle) = connected(interface).await;

    let root = scratch_dir();
    let (capture, _) = create_tasks(config(root.clone()), link).unwrap();
    let events = capture.events();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Box::new(capture).run(cancel.clone()));

    let first = events.recv_async().await.unwrap();
    let second = events.recv_async().await.unwrap();
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert!(matches!(first, CaptureEvent::Dropped { timestamp: 9, .. }));
    assert!(matches!(second, CaptureEvent::Persisted { .. }));

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test(start_paused = true)]
async fn unwritable_folder_drops_frames() {
    let root = scratch_dir();
    std::fs::create_dir_all(&root).unwrap();

    // a plain file where the mission folder should go
    let blocker = root.join("blocker");
    std::fs::write(&blocker, b"").unwrap();

    let (link, _journal, _vehicle) = connected(ScriptedVehicleInterface::new()).await;
    let (capture, _) = create_tasks(config(blocker), link).unwrap();
    let events = capture.events();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Box::new(capture).run(cancel.clone()));

    let event = events.recv_async().await.unwrap();
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert!(matches!(event, CaptureEvent::Dropped { .. }), "{event:?}");

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn stops_when_the_vehicle_goes_away() {
    let (link, _journal, vehicle) = connected(ScriptedVehicleInterface::new()).await;

    let root = scratch_dir();
    let (capture, _) = create_tasks(config(root.clone()), link.clone()).unwrap();

    vehicle.cancel();
    while link.connect().await.is_ok() {
        tokio::task::yield_now().await;
    }

    let result = Box::new(capture).run(CancellationToken::new()).await;
    assert!(result.is_err());

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn rejects_non_positive_frame_rate() {
    let task = VehicleTask::new(Box::new(ScriptedVehicleInterface::new()), Duration::from_secs(1));
    let config = CaptureConfig {
        frame_rate: 0.0,
        ..config(scratch_dir())
    };

    assert!(create_tasks(config, task.link()).is_err());
}
