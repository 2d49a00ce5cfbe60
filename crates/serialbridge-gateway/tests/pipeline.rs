#![cfg(unix)]

use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serialbridge_dispatch::{Dispatcher, DispatcherConfig};
use serialbridge_frame::{
    encode_sensor, CommandKind, Frame, FrameConfig, FrameReader, FrameWriter, SensorKind,
};
use serialbridge_gateway::{CommandSender, Gateway, MemorySink, Sink, SinkSet};
use serialbridge_transport::SerialStream;

fn single_worker() -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(DispatcherConfig::default().with_max_workers(1)).unwrap())
}

#[test]
fn noisy_link_delivers_readings_in_order() {
    let (mut device, host) = SerialStream::pair().unwrap();
    let dispatcher = single_worker();
    let memory = Arc::new(MemorySink::new());
    let sinks = SinkSet::new().with(memory.clone() as Arc<dyn Sink>);

    let simulator = thread::spawn(move || {
        for n in 0..20u8 {
            // Line noise between frames, and frames split across writes.
            device.write_all(&[0x00, 0xAA, 0x42]).unwrap();
            let frame = encode_sensor(n, 0x01, f32::from(n) * 0.5);
            device.write_all(&frame[..4]).unwrap();
            device.flush().unwrap();
            device.write_all(&frame[4..]).unwrap();
        }
        // Dropping the device end closes the link.
    });

    let mut gateway = Gateway::new(host, Arc::clone(&dispatcher), sinks);
    let stats = gateway.run(&AtomicBool::new(false)).unwrap();
    simulator.join().unwrap();
    assert!(!dispatcher.shutdown(Duration::from_secs(5)).timed_out);

    assert_eq!(stats.sensor_frames, 20);
    let readings = memory.readings();
    let ids: Vec<u8> = readings.iter().map(|r| r.sensor_id).collect();
    assert_eq!(ids, (0..20).collect::<Vec<_>>());
    assert!(readings.iter().all(|r| r.kind == SensorKind::Temperature));
    assert_eq!(readings[7].value, 3.5);
    assert_eq!(gateway.reassembler_stats().bytes_skipped, 60);
}

#[test]
fn gateway_stops_at_frame_limit() {
    let (device, host) = SerialStream::pair().unwrap();
    let dispatcher = single_worker();
    let memory = Arc::new(MemorySink::new());

    let mut writer = FrameWriter::new(device);
    for n in 0..5 {
        writer.send_sensor(n, 0x02, 100.0).unwrap();
    }

    let reader = FrameReader::with_read_timeout(
        host,
        FrameConfig::default(),
        Some(Duration::from_millis(20)),
    )
    .unwrap();
    let mut gateway = Gateway::from_reader(
        reader,
        Arc::clone(&dispatcher),
        SinkSet::new().with(memory.clone() as Arc<dyn Sink>),
    );

    let stats = gateway.run_until(&AtomicBool::new(false), Some(3)).unwrap();
    dispatcher.shutdown(Duration::from_secs(5));

    assert_eq!(stats.frames(), 3);
    let ids: Vec<u8> = memory.readings().iter().map(|r| r.sensor_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    drop(writer);
}

#[test]
fn commands_reach_the_device() {
    let (device, host) = SerialStream::pair().unwrap();
    let dispatcher = single_worker();
    let memory = Arc::new(MemorySink::new());
    let sender = CommandSender::new(
        host,
        Arc::clone(&dispatcher),
        SinkSet::new().with(memory.clone() as Arc<dyn Sink>),
    );

    sender.send(1, CommandKind::On, Some("line-2")).unwrap();
    sender.send(2, CommandKind::Off, None).unwrap();

    let mut device = FrameReader::new(device);
    assert_eq!(device.read_frame().unwrap(), Frame::command(1, 0x01));
    assert_eq!(device.read_frame().unwrap(), Frame::command(2, 0x00));

    assert!(!dispatcher.shutdown(Duration::from_secs(5)).timed_out);
    let logs = memory.commands();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].operator.as_deref(), Some("line-2"));
    assert!(logs.iter().all(|log| log.success));
}
