//! Integration tests for bleacon-core
//!
//! Everything here runs against the in-memory mock platform. Tests that need a
//! real adapter are marked `#[ignore]` and can be run with:
//! `cargo test --package bleacon-core -- --ignored --nocapture`
//!
//! Set `BLEACON_MANUFACTURER` to the manufacturer ID to look for during the
//! hardware tests (decimal or `0x` hex). Defaults to Apple (iBeacon).

use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bleacon_core::mock::mock_device_id;
use bleacon_core::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};
use bleacon_core::{
    AcquireOptions, Advertisement, BeaconScanner, BleFilter, BtleAdapter, GattCallback,
    GattConnection, GattScanner, GattScannerOptions, GattTarget, Handler, IBeacon,
    IBeaconDeserializer, MockAdapter, MockCall, MockScanner, RawPayload, ScanHandle,
    obtain_scanner,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Default timeout for BLE operations.
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

const PROXIMITY_UUID: [u8; 16] = [
    0xE2, 0xC5, 0x6D, 0xB5, 0xDF, 0xFB, 0x48, 0xD2, 0xB0, 0x60, 0xD0, 0xF5, 0xA7, 0x10, 0x96, 0xE0,
];

fn ibeacon_frame(major: u16, minor: u16) -> Vec<u8> {
    let mut frame = vec![0x02, 0x15];
    frame.extend_from_slice(&PROXIMITY_UUID);
    frame.extend_from_slice(&major.to_be_bytes());
    frame.extend_from_slice(&minor.to_be_bytes());
    frame.push(0xC5);
    frame
}

#[tokio::test]
async fn test_ibeacon_end_to_end() {
    let mock = Arc::new(MockScanner::new());
    let adapter = MockAdapter::with_scanner(mock.clone());
    let scanner = obtain_scanner(&adapter, &AcquireOptions::default())
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let beacons = BeaconScanner::new(
        scanner,
        IBeaconDeserializer::MANUFACTURER_ID,
        IBeaconDeserializer,
        move |_, report| {
            let _ = tx.send((report.device_id().to_string(), report.records));
        },
    );
    beacons.start();
    beacons.flush().await;

    let device = mock_device_id();
    mock.advertise(
        Advertisement::new(device.clone())
            .with_rssi(-60)
            .with_manufacturer_data(0x004C, ibeacon_frame(1, 7)),
    );

    let (id, records) = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(id, device);
    assert_eq!(
        records,
        vec![IBeacon {
            uuid: uuid::Uuid::from_bytes(PROXIMITY_UUID),
            major: 1,
            minor: 7,
            tx_power: -59,
        }]
    );
}

#[tokio::test]
async fn test_ibeacon_truncated_and_wrong_header_are_dropped() {
    let mock = Arc::new(MockScanner::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let beacons = BeaconScanner::new(
        mock.clone(),
        IBeaconDeserializer::MANUFACTURER_ID,
        IBeaconDeserializer,
        move |_, report| {
            let _ = tx.send(report.records[0].minor);
        },
    );
    beacons.start();
    beacons.flush().await;

    let mut wrong_header = ibeacon_frame(1, 1);
    wrong_header[0] = 0x03;
    mock.advertise(Advertisement::new("a").with_manufacturer_data(0x004C, &ibeacon_frame(1, 1)[..22]));
    mock.advertise(Advertisement::new("b").with_manufacturer_data(0x004C, wrong_header));
    mock.advertise(Advertisement::new("c").with_manufacturer_data(0x004C, ibeacon_frame(1, 3)));

    assert_eq!(rx.recv().await, Some(3));
    beacons.stop();
    beacons.flush().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_scanners_sharing_a_handler_never_overlap() {
    let mock = Arc::new(MockScanner::new());
    let handler = Handler::new();
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(AtomicUsize::new(0));

    let make = |manufacturer_id: u16| {
        let active = Arc::clone(&active);
        let overlaps = Arc::clone(&overlaps);
        let seen = Arc::clone(&seen);
        BeaconScanner::builder(manufacturer_id, RawPayload::new(1))
            .handler(handler.clone())
            .on_found(move |_, _| {
                if active.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(2));
                active.fetch_sub(1, Ordering::SeqCst);
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build(mock.clone())
    };
    let first = make(0x0001);
    let second = make(0x0002);

    first.start();
    second.start();
    handler.flush().await;

    for i in 0..10u8 {
        mock.advertise(
            Advertisement::new(format!("dev-{i}"))
                .with_manufacturer_data(0x0001, [i])
                .with_manufacturer_data(0x0002, [i]),
        );
    }

    timeout(Duration::from_secs(5), async {
        while seen.load(Ordering::SeqCst) < 20 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    first.stop();
    second.stop();
    handler.flush().await;
}

#[tokio::test]
async fn test_stopping_one_scanner_leaves_the_other_scanning() {
    let mock = Arc::new(MockScanner::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let make = |manufacturer_id: u16| {
        let tx = tx.clone();
        BeaconScanner::new(mock.clone(), manufacturer_id, RawPayload::new(1), move |_, report| {
            let _ = tx.send((manufacturer_id, report.device_id().to_string()));
        })
    };
    let first = make(0x0001);
    let second = make(0x0002);

    first.start();
    second.start();
    first.flush().await;
    second.flush().await;
    assert_eq!(mock.live_sessions(), 2);

    first.stop();
    first.flush().await;

    assert!(!first.is_scanning());
    assert!(second.is_scanning());
    assert!(mock.is_scanning());
    assert_eq!(mock.active_filters(), vec![BleFilter::manufacturer(0x0002)]);

    mock.advertise(
        Advertisement::new("dev")
            .with_manufacturer_data(0x0001, [1])
            .with_manufacturer_data(0x0002, [2]),
    );
    let report = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert_eq!(report, Some((0x0002, "dev".to_string())));

    // A stop on a scanner that never started does not touch the others
    let idle = make(0x0003);
    idle.stop();
    idle.flush().await;
    assert!(mock.is_scanning());

    second.stop();
    second.flush().await;
    assert!(!mock.is_scanning());
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_pause_restarts_with_same_filters() {
    let mock = Arc::new(MockScanner::new());
    let filter = BleFilter::manufacturer(0x0059).with_data([0xAA]);
    let beacons = BeaconScanner::builder(0x0059, RawPayload::new(1))
        .filter(filter.clone())
        .on_found(|handle, _| handle.pause(Duration::from_millis(250)))
        .build(mock.clone());

    beacons.start();
    beacons.flush().await;
    mock.advertise(Advertisement::new("dev").with_manufacturer_data(0x0059, [0xAA, 1]));

    tokio::time::sleep(Duration::from_millis(400)).await;
    beacons.flush().await;

    let starts: Vec<_> = mock
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            MockCall::StartScan { filters, .. } => Some(filters),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![vec![filter.clone()], vec![filter]]);
    assert!(beacons.is_scanning());
}

struct RecordingCallback {
    values: mpsc::UnboundedSender<(String, Vec<u8>)>,
}

#[async_trait]
impl GattCallback for RecordingCallback {
    async fn on_connected(
        &self,
        handle: &ScanHandle,
        connection: Arc<dyn GattConnection>,
        target: GattTarget,
    ) {
        assert!(!handle.is_scanning());
        let value = connection.read(target.characteristic).await.unwrap();
        let _ = self.values.send((connection.device_id().to_string(), value));
    }
}

#[tokio::test]
async fn test_gatt_scan_connect_and_read() {
    let mock = Arc::new(MockScanner::new().with_characteristic(
        BATTERY_SERVICE,
        BATTERY_LEVEL,
        vec![64],
    ));
    let adapter = MockAdapter::with_scanner(mock.clone()).disabled();
    let scanner = obtain_scanner(&adapter, &AcquireOptions::default())
        .await
        .unwrap();
    assert_eq!(adapter.enable_calls(), 1);

    let (values, mut rx) = mpsc::unbounded_channel();
    let gatt = GattScanner::with_options(
        scanner,
        BleFilter::manufacturer(0x0059),
        BATTERY_SERVICE,
        BATTERY_LEVEL,
        RecordingCallback { values },
        GattScannerOptions::new().auto_connect(true),
    );
    gatt.start();
    gatt.flush().await;

    mock.advertise(Advertisement::new("sensor").with_manufacturer_data(0x0059, [1]));

    let (device, value) = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(device, "sensor");
    assert_eq!(value, vec![64]);
    assert!(mock.calls().contains(&MockCall::Connect {
        device_id: "sensor".to_string(),
        auto_connect: true,
    }));
}

#[tokio::test]
async fn test_reports_after_stop_are_not_delivered() {
    let mock = Arc::new(MockScanner::new());
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    let beacons = BeaconScanner::new(mock.clone(), 0x0059, RawPayload::new(1), move |_, report| {
        sink.lock().unwrap().push(report.device_id().to_string());
    });

    beacons.start();
    beacons.flush().await;
    mock.advertise(Advertisement::new("before").with_manufacturer_data(0x0059, [1]));
    tokio::time::sleep(Duration::from_millis(20)).await;

    beacons.stop();
    beacons.flush().await;
    mock.advertise(Advertisement::new("after").with_manufacturer_data(0x0059, [1]));
    tokio::time::sleep(Duration::from_millis(20)).await;
    beacons.flush().await;

    assert_eq!(*delivered.lock().unwrap(), vec!["before".to_string()]);
}

fn hardware_manufacturer() -> u16 {
    env::var("BLEACON_MANUFACTURER")
        .ok()
        .and_then(|v| match v.strip_prefix("0x") {
            Some(hex) => u16::from_str_radix(hex, 16).ok(),
            None => v.parse().ok(),
        })
        .unwrap_or(IBeaconDeserializer::MANUFACTURER_ID)
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_hardware_obtain_scanner() {
    let adapter = BtleAdapter::first().await.expect("no Bluetooth adapter");
    let options = AcquireOptions::new().timeout(Duration::from_secs(10));
    let result = obtain_scanner(&adapter, &options).await;
    assert!(result.is_ok(), "scanner not available: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_hardware_scan_for_manufacturer() {
    let adapter = BtleAdapter::first().await.expect("no Bluetooth adapter");
    let scanner = obtain_scanner(&adapter, &AcquireOptions::new().timeout(BLE_TIMEOUT))
        .await
        .expect("scanner not available");

    let manufacturer_id = hardware_manufacturer();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let beacons = BeaconScanner::new(scanner, manufacturer_id, RawPayload::new(0), move |handle, report| {
        handle.stop();
        let _ = tx.send(report);
    });
    beacons.start();

    match timeout(BLE_TIMEOUT, rx.recv()).await {
        Ok(Some(report)) => {
            println!(
                "{} advertised {}",
                report.device_id(),
                report.records[0].hex()
            );
        }
        _ => panic!("no advertisement for 0x{:04X} within {:?}", manufacturer_id, BLE_TIMEOUT),
    }
    beacons.flush().await;
}
