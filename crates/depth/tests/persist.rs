use std::path::PathBuf;

use dm_depth::{decode, persist, FrameEncoding, FrameMetadata, PersistError};

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dm-depth-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn raw_float_keeps_sensor_order() {
    let dir = scratch_dir();
    let flat: Vec<f32> = (0..8).map(|i| i as f32).collect();
    let frame = decode(&flat, 4, 2, 1234).unwrap();

    let path = persist(&frame, &dir, FrameEncoding::RawFloat).await.unwrap();
    assert_eq!(path, dir.join("1234.f32"));

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 4 * 4 * 2);

    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    assert_eq!(values, flat);

    let sidecar = std::fs::read(dir.join("1234.json")).unwrap();
    let metadata: FrameMetadata = serde_json::from_slice(&sidecar).unwrap();
    assert_eq!(
        metadata,
        FrameMetadata {
            timestamp: 1234,
            width: 4,
            height: 2,
            rows: 4,
            cols: 2,
            encoding: FrameEncoding::RawFloat,
        }
    );

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn visual_is_a_grayscale_png_of_the_emitted_image() {
    let dir = scratch_dir();
    let flat: Vec<f32> = (0..15).map(|i| i as f32).collect();
    let frame = decode(&flat, 5, 3, 99).unwrap();
    let before = frame.clone();

    let path = persist(&frame, &dir, FrameEncoding::Visual).await.unwrap();
    assert_eq!(path, dir.join("99.png"));
    assert_eq!(frame, before);

    let image = image::open(&path).unwrap().into_luma8();
    assert_eq!(image.width(), 3);
    assert_eq!(image.height(), 5);

    // top-left holds the smallest depth, bottom-right the largest
    assert_eq!(image.get_pixel(0, 0).0, [0]);
    assert_eq!(image.get_pixel(2, 4).0, [255]);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn missing_directory_is_a_write_error() {
    let dir = std::env::temp_dir()
        .join(format!("dm-depth-{}", uuid::Uuid::new_v4()))
        .join("missing");
    let frame = decode(&[1.0; 4], 2, 2, 5).unwrap();

    let err = persist(&frame, &dir, FrameEncoding::RawFloat)
        .await
        .unwrap_err();

    assert!(matches!(err, PersistError::Write { path, .. } if path == dir.join("5.f32")));
}
