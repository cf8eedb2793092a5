//! Integration tests for the transmit pipeline: producers → queue → sender
//! thread → port.
//!
//! Everything runs against `MockMidiService`; what the mock records is fed
//! back through the receiver-side `MessageReader`/`FrameAssembler`, so these
//! tests check the wire stream a receiver would actually see.

mod common;

use std::sync::Arc;
use std::thread;

use common::{bridge, eventually, settle};
use stylus_bridge::infrastructure::midi::mock::{device, MockMidiService};
use stylus_bridge::infrastructure::midi::TransportKind;
use stylus_core::protocol::MessageReader;
use stylus_core::{
    DecodedFrame, FrameAssembler, FrameKind, ProtocolEvent, SampleAction, SampleTranslator,
    SurfaceSize, TouchSample,
};

fn decode(writes: &[Vec<u8>]) -> Vec<DecodedFrame> {
    let mut reader = MessageReader::new();
    let mut assembler = FrameAssembler::new();
    assembler.push_all(&reader.feed(&writes.concat()))
}

fn usb_service() -> Arc<MockMidiService> {
    Arc::new(
        MockMidiService::new()
            .with_device(device(1, "Tablet", TransportKind::Usb)),
    )
}

// ── End to end ────────────────────────────────────────────────────────────────

/// A translated pen stroke arrives as one well-formed frame per event, in
/// order, numbered from 1 with no gaps.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_translated_stroke_decodes_on_the_receiver() {
    // Arrange
    let service = usb_service();
    let (bridge, _recorder) = bridge(&service);
    bridge.start().unwrap();
    eventually("connection", || bridge.is_connected()).await;

    let mut translator = SampleTranslator::new(SurfaceSize { width: 1000, height: 500 }, false);
    let stroke = [
        TouchSample::stylus(SampleAction::HoverEnter, 100.0, 50.0, 0.0),
        TouchSample::stylus(SampleAction::Down, 100.0, 50.0, 0.5),
        TouchSample::stylus(SampleAction::Move, 250.0, 125.0, 0.75),
        TouchSample::stylus(SampleAction::Move, 500.0, 250.0, 1.0),
        TouchSample::stylus(SampleAction::Up, 500.0, 250.0, 0.0),
        TouchSample::stylus(SampleAction::HoverExit, 500.0, 250.0, 0.0),
    ];
    let events: Vec<ProtocolEvent> = stroke.iter().flat_map(|s| translator.translate(s)).collect();
    let expected_writes: usize = events.iter().map(ProtocolEvent::frame_len).sum();

    // Act
    for event in &events {
        bridge.enqueue(*event);
    }
    eventually("stroke written", || service.writes().len() == expected_writes).await;
    bridge.stop();

    // Assert
    let frames = decode(&service.writes());
    assert_eq!(frames.len(), events.len());
    for (n, (frame, event)) in frames.iter().zip(&events).enumerate() {
        assert_eq!(usize::from(frame.sequence), n + 1);
        assert_eq!(frame.gap, None);
        match *event {
            ProtocolEvent::Motion { x, y, pressure } => {
                assert_eq!(frame.kind, FrameKind::Motion);
                assert_eq!(
                    (frame.x, frame.y, frame.pressure),
                    (x as u16, y as u16, pressure as u16)
                );
            }
            ProtocolEvent::Button {
                x, y, button_id, down, ..
            } => {
                assert_eq!(frame.kind, FrameKind::Button { button_id, down });
                assert_eq!((frame.x, frame.y), (x as u16, y as u16));
            }
            ProtocolEvent::Disconnect => unreachable!("the translator never emits the sentinel"),
        }
    }
}

/// Events from several producer threads keep their per-producer order.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_producers_keep_their_order_on_the_wire() {
    // Arrange
    let service = usb_service();
    let (bridge, _recorder) = bridge(&service);
    bridge.start().unwrap();
    eventually("connection", || bridge.is_connected()).await;

    // Act
    let producers: Vec<_> = (0..4i16)
        .map(|p| {
            let producer = bridge.producer();
            thread::spawn(move || {
                for i in 0..50i16 {
                    producer.enqueue(ProtocolEvent::Motion { x: p, y: i, pressure: 0 });
                }
            })
        })
        .collect();
    for handle in producers {
        handle.join().unwrap();
    }
    eventually("all frames written", || service.writes().len() == 200 * 12).await;
    bridge.stop();

    // Assert
    let mut last = [None::<u16>; 4];
    for frame in decode(&service.writes()) {
        let slot = &mut last[usize::from(frame.x)];
        assert_eq!(frame.y, slot.map_or(0, |y| y + 1), "producer {} reordered", frame.x);
        *slot = Some(frame.y);
    }
    assert_eq!(last, [Some(49); 4]);
}

/// Events enqueued one after another from different threads go out in
/// enqueue order.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sequential_enqueues_from_different_threads_stay_in_order() {
    // Arrange
    let service = usb_service();
    let (bridge, _recorder) = bridge(&service);
    bridge.start().unwrap();
    eventually("connection", || bridge.is_connected()).await;

    // Act – each thread finishes its enqueue before the next one starts
    for x in 1..=3i16 {
        let producer = bridge.producer();
        thread::spawn(move || producer.enqueue(ProtocolEvent::Motion { x, y: 0, pressure: 0 }))
            .join()
            .unwrap();
    }
    eventually("three frames written", || service.writes().len() == 3 * 12).await;
    bridge.stop();

    // Assert
    let frames = decode(&service.writes());
    let order: Vec<(u16, u8)> = frames.iter().map(|f| (f.x, f.sequence)).collect();
    assert_eq!(order, vec![(1, 1), (2, 2), (3, 3)]);
}

// ── No device ─────────────────────────────────────────────────────────────────

/// Without a bound port, events are consumed and dropped, without errors and
/// without touching the sequence counter.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_without_a_device_are_dropped_silently() {
    // Arrange
    let service = Arc::new(MockMidiService::new());
    let (bridge, recorder) = bridge(&service);
    bridge.start().unwrap();

    // Act
    for i in 0..100 {
        bridge.enqueue(ProtocolEvent::Motion { x: i, y: i, pressure: 0 });
    }
    eventually("queue drained", || bridge.backlog() == 0).await;
    service.add_device(device(7, "Late", TransportKind::Usb));
    eventually("connection", || bridge.is_connected()).await;
    bridge.enqueue(ProtocolEvent::Motion { x: 1, y: 1, pressure: 1 });
    eventually("frame written", || service.writes().len() == 12).await;
    bridge.stop();

    // Assert
    let frames = decode(&service.writes());
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].sequence, 1, "dropped events never consumed a number");
    settle().await;
    assert!(recorder.errors().is_empty());
}

// ── Transmit failures ─────────────────────────────────────────────────────────

/// A failing port reports one error per frame and leaves the sender running.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_failures_are_reported_and_not_fatal() {
    // Arrange
    let service = usb_service();
    let (bridge, recorder) = bridge(&service);
    bridge.start().unwrap();
    eventually("connection", || bridge.is_connected()).await;
    service.set_fail_sends(true);

    // Act
    bridge.enqueue(ProtocolEvent::Motion { x: 1, y: 1, pressure: 1 });
    bridge.enqueue(ProtocolEvent::Motion { x: 2, y: 2, pressure: 2 });
    eventually("two errors", || recorder.errors().len() == 2).await;
    service.set_fail_sends(false);
    bridge.enqueue(ProtocolEvent::Motion { x: 3, y: 3, pressure: 3 });
    eventually("recovered frame", || service.writes().len() == 12).await;

    // Assert
    let errors = recorder.errors();
    assert!(errors.iter().all(|m| m.starts_with("MIDI send error")), "{errors:?}");
    assert!(bridge.is_connected(), "a send failure does not drop the connection");
    let frames = decode(&service.writes());
    assert_eq!((frames[0].x, frames[0].sequence), (3, 3));
    bridge.stop();
}
