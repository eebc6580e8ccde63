mod common;

use std::sync::Arc;

use common::{frame, mono_ramp, open_device, stereo_document, TruncatedSource, LEFT, RIGHT};
use tonband::{
    ChannelMask, Command, DeviceError, EngineConfig, Fault, OfflineBackend, AudioDevice, PeakMeter,
    PlayRequest, PostError, SampleSource,
};

#[test]
fn selection_plays_to_its_end_and_stops_in_the_same_callback() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(2000), 0, 1000)).unwrap();

    let out = backend.render(1000).unwrap();

    let view = device.view();
    assert!(!view.is_playing());
    assert_eq!(view.playback_position(), 1000);
    assert_eq!(frame(&out, 0), (LEFT, RIGHT));
    assert_eq!(frame(&out, 999), (LEFT, RIGHT));
}

#[test]
fn selection_end_is_exclusive() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(2000), 0, 999)).unwrap();

    let out = backend.render(1000).unwrap();

    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), 999);
    assert_eq!(frame(&out, 998), (LEFT, RIGHT));
    assert_eq!(frame(&out, 999), (0.0, 0.0));
}

#[test]
fn position_advances_by_frames_written() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(2000), 100, 2000)).unwrap();

    backend.render(256).unwrap();
    assert!(device.is_playing());
    assert_eq!(device.playback_position(), 356);

    backend.render(256).unwrap();
    assert_eq!(device.playback_position(), 612);
}

#[test]
fn position_never_passes_the_selection_end() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(4000), 10, 1000)).unwrap();

    let mut callbacks = 0;
    loop {
        backend.render(64).unwrap();
        callbacks += 1;
        assert!(device.playback_position() <= 1000);
        if !device.is_playing() {
            break;
        }
        assert!(callbacks < 100, "playback never stopped");
    }
    assert_eq!(device.playback_position(), 1000);
    assert_eq!(callbacks, 16);
}

#[test]
fn samples_follow_the_document() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(mono_ramp(1000), 10, 20)).unwrap();

    let out = backend.render(16).unwrap();

    for n in 0..10 {
        let expected = (10 + n + 1) as f32 / 100_000.0;
        assert_eq!(frame(&out, n), (expected, expected));
    }
    for n in 10..16 {
        assert_eq!(frame(&out, n), (0.0, 0.0));
    }
}

#[test]
fn inactive_selection_runs_to_the_document_end() {
    let (backend, device) = open_device(EngineConfig::default());
    let request = PlayRequest {
        selection_active: false,
        ..PlayRequest::new(stereo_document(1000), 500, 600)
    };
    device.play(request).unwrap();

    let out = backend.render(1024).unwrap();

    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), 1000);
    assert_eq!(frame(&out, 499), (LEFT, RIGHT));
    assert_eq!(frame(&out, 500), (0.0, 0.0));
}

#[test]
fn selection_past_the_document_end_stops_at_the_document_end() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(1000), 0, 5000)).unwrap();

    let out = backend.render(1500).unwrap();

    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), 1000);
    assert!(out[2000..].iter().all(|&s| s == 0.0));
    assert!(device.take_faults().is_empty());
}

#[test]
fn large_callbacks_are_rendered_in_blocks() {
    let config = EngineConfig {
        max_block_frames: 64,
        ..EngineConfig::default()
    };
    let (backend, device) = open_device(config);
    device.play(PlayRequest::new(mono_ramp(2000), 0, 1000)).unwrap();

    let out = backend.render(1000).unwrap();

    assert_eq!(device.playback_position(), 1000);
    for n in [0, 63, 64, 500, 999] {
        let expected = (n + 1) as f32 / 100_000.0;
        assert_eq!(frame(&out, n), (expected, expected));
    }
}

#[test]
fn integer_devices_publish_once_per_long_callback() {
    let config = EngineConfig {
        max_block_frames: 64,
        ..EngineConfig::default()
    };
    let (backend, device) = open_device(config);
    device.play(PlayRequest::new(stereo_document(2000), 0, 1000)).unwrap();
    let before = device.exchange().generation();

    let out = backend.render_as::<i16>(1000).unwrap();

    assert_eq!(device.exchange().generation(), before + 1);
    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), 1000);
    assert_eq!(out[0], out[1998]);
    assert_eq!(out[1], out[1999]);
    assert!(out[0] > 0);
    assert!(out[1] < 0);
}

#[test]
fn unsigned_devices_are_silent_at_the_midpoint() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(100), 0, 50)).unwrap();

    let out = backend.render_as::<u16>(100).unwrap();

    assert!(out[..100].iter().all(|&s| s != 32768));
    assert!(out[100..].iter().all(|&s| s == 32768));
}

#[test]
fn stop_keeps_the_position_and_silences_output() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(2000), 0, 2000)).unwrap();
    backend.render(300).unwrap();

    device.stop().unwrap();
    let out = backend.render(300).unwrap();

    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), 300);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn stop_while_stopped_changes_nothing() {
    let (backend, device) = open_device(EngineConfig::default());
    let before = device.view();

    device.stop().unwrap();
    backend.render(128).unwrap();
    device.stop().unwrap();
    backend.render(128).unwrap();

    assert_eq!(device.view(), before);
    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), -1);
}

#[test]
fn play_while_playing_is_ignored() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(2000), 0, 2000)).unwrap();
    backend.render(100).unwrap();

    device.play(PlayRequest::new(stereo_document(2000), 1500, 2000)).unwrap();
    backend.render(100).unwrap();

    assert!(device.is_playing());
    assert_eq!(device.playback_position(), 200);
}

#[test]
fn commands_queued_together_apply_in_order_before_rendering() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(2000), 40, 2000)).unwrap();
    device.stop().unwrap();

    let out = backend.render(128).unwrap();

    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), 40);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn only_selected_channels_are_heard() {
    let (backend, device) = open_device(EngineConfig::default());
    let request = PlayRequest::new(stereo_document(1000), 0, 1000).with_channels(ChannelMask::only(1));
    device.play(request).unwrap();

    let out = backend.render(64).unwrap();

    for n in 0..64 {
        assert_eq!(frame(&out, n), (0.0, RIGHT));
    }
}

#[test]
fn mono_documents_feed_every_output_channel() {
    let (backend, device) = open_device(EngineConfig::default());
    let mono: Arc<dyn SampleSource> = Arc::new(tonband::PcmDocument::from_channels(vec![vec![0.75; 100]], 48000));
    device.play(PlayRequest::new(mono, 0, 100)).unwrap();

    let out = backend.render(100).unwrap();

    assert!(out.iter().all(|&s| s == 0.75));
}

#[test]
fn meter_receives_levels_per_buffer() {
    let (backend, device) = open_device(EngineConfig::default());
    let meter = Arc::new(PeakMeter::new(2));
    let request = PlayRequest::new(stereo_document(1000), 0, 1000)
        .with_channels(ChannelMask::only(0))
        .with_meter(meter.clone());
    device.play(request).unwrap();

    backend.render(256).unwrap();
    assert_eq!(meter.feed_count(), 1);
    assert_eq!(meter.levels(), vec![LEFT, 0.0]);

    backend.render(256).unwrap();
    assert_eq!(meter.feed_count(), 2);
}

#[test]
fn malformed_range_is_ignored_and_flagged() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(1000), 600, 500)).unwrap();

    let out = backend.render(64).unwrap();

    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), -1);
    assert!(out.iter().all(|&s| s == 0.0));
    assert!(device.take_faults().contains(Fault::MalformedCommand));
    assert!(device.take_faults().is_empty());
}

#[test]
fn empty_channel_selection_is_ignored_and_flagged() {
    let (backend, device) = open_device(EngineConfig::default());
    let request = PlayRequest::new(stereo_document(1000), 0, 1000).with_channels(ChannelMask::only(5));
    device.play(request).unwrap();

    backend.render(64).unwrap();

    assert!(!device.is_playing());
    assert!(device.take_faults().contains(Fault::ChannelSelection));
}

#[test]
fn start_past_the_document_end_positions_at_the_end() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(1000), 1200, 1500)).unwrap();

    backend.render(64).unwrap();

    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), 1000);
    assert!(device.take_faults().contains(Fault::SourceExhausted));
}

#[test]
fn start_past_the_document_end_ignores_end_without_selection() {
    let (backend, device) = open_device(EngineConfig::default());
    let document = stereo_document(1000);
    device.play(PlayRequest::new(document.clone(), 0, 100)).unwrap();
    backend.render(128).unwrap();
    assert_eq!(device.playback_position(), 100);

    let request = PlayRequest {
        start: 1200,
        ..PlayRequest::from_position(document, 0)
    };
    device.play(request).unwrap();
    backend.render(64).unwrap();

    let faults = device.take_faults();
    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), 1000);
    assert!(faults.contains(Fault::SourceExhausted));
    assert!(!faults.contains(Fault::MalformedCommand));
}

#[test]
fn empty_range_positions_without_playing() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(1000), 300, 300)).unwrap();

    backend.render(64).unwrap();

    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), 300);
    assert!(device.take_faults().is_empty());
}

#[test]
fn source_running_dry_degrades_to_silence_and_stops() {
    let (backend, device) = open_device(EngineConfig::default());
    let source: Arc<dyn SampleSource> = Arc::new(TruncatedSource {
        claimed: 1000,
        actual: 600,
    });
    device.play(PlayRequest::new(source, 0, 1000)).unwrap();

    let out = backend.render(1000).unwrap();

    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), 600);
    assert_eq!(frame(&out, 599), (0.5, 0.5));
    assert!(out[1200..].iter().all(|&s| s == 0.0));
    assert!(device.take_faults().contains(Fault::SourceExhausted));
}

#[test]
fn every_callback_publishes_exactly_once() {
    let (backend, device) = open_device(EngineConfig::default());
    let start = device.exchange().generation();

    for _ in 0..5 {
        backend.render(32).unwrap();
    }
    device.play(PlayRequest::new(stereo_document(1000), 0, 1000)).unwrap();
    device.stop().unwrap();
    backend.render(32).unwrap();

    assert_eq!(device.exchange().generation(), start + 6);
}

#[test]
fn finished_requests_are_released_off_the_audio_thread() {
    let (backend, device) = open_device(EngineConfig::default());
    let document = stereo_document(100);

    device.play(PlayRequest::new(document.clone(), 0, 100)).unwrap();
    backend.render(128).unwrap();
    assert!(!device.is_playing());
    // Parked in the retire queue, not dropped by the audio thread
    assert_eq!(Arc::strong_count(&document), 2);

    device.stop().unwrap();
    assert_eq!(Arc::strong_count(&document), 1);
}

#[test]
fn full_command_queue_hands_the_command_back() {
    let config = EngineConfig {
        command_capacity: 2,
        ..EngineConfig::default()
    };
    let (backend, device) = open_device(config);

    device.stop().unwrap();
    device.stop().unwrap();
    assert!(matches!(device.stop(), Err(PostError::Full(Command::Stop))));

    backend.render(16).unwrap();
    device.stop().unwrap();
}

#[test]
fn open_is_idempotent_for_the_same_endpoints() {
    let (backend, device) = open_device(EngineConfig::default());

    device.open_device(None, None).unwrap();
    device.open_device(None, None).unwrap();

    assert_eq!(backend.opens(), 1);
    assert_eq!(backend.closes(), 0);
}

#[test]
fn opening_other_endpoints_closes_the_previous_stream() {
    common::init_tracing();
    let backend = OfflineBackend::with_devices(48000, 2, 2, 1);
    let device = AudioDevice::new(backend.clone(), None, EngineConfig::default());

    device.open_device(None, Some(0)).unwrap();
    device.play(PlayRequest::new(stereo_document(1000), 0, 1000)).unwrap();
    backend.render(64).unwrap();
    assert!(device.is_playing());

    device.open_device(Some(0), Some(1)).unwrap();

    assert_eq!(backend.opens(), 2);
    assert_eq!(backend.closes(), 1);
    assert_eq!(device.endpoints().and_then(|e| e.input), Some(0));
    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), -1);
}

#[test]
fn close_resets_transport_and_is_idempotent() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(1000), 0, 1000)).unwrap();
    backend.render(64).unwrap();
    assert!(device.is_playing());

    device.close_device().unwrap();
    assert!(!device.is_open());
    assert!(!backend.is_streaming());
    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), -1);

    device.close_device().unwrap();
    assert_eq!(backend.closes(), 1);
    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), -1);
}

#[test]
fn closed_device_hands_commands_back() {
    common::init_tracing();
    let backend = OfflineBackend::new(48000, 2);
    let device = AudioDevice::new(backend.clone(), None, EngineConfig::default());
    let document = stereo_document(1000);

    let err = device.play(PlayRequest::new(document.clone(), 0, 1000)).unwrap_err();
    assert!(matches!(err, PostError::Closed(Command::Play(_))));
    assert_eq!(err.to_string(), "audio device is closed");
    drop(err);
    assert_eq!(Arc::strong_count(&document), 1);

    for _ in 0..100 {
        assert!(matches!(device.stop(), Err(PostError::Closed(Command::Stop))));
    }

    device.open_device(None, None).unwrap();
    device.play(PlayRequest::new(document.clone(), 0, 1000)).unwrap();
    backend.render(64).unwrap();
    assert!(device.is_playing());

    device.close_device().unwrap();
    assert!(matches!(device.stop(), Err(PostError::Closed(_))));
    assert_eq!(Arc::strong_count(&document), 1);
}

#[test]
fn failed_close_still_closes_and_resets() {
    let (backend, device) = open_device(EngineConfig::default());
    device.play(PlayRequest::new(stereo_document(1000), 0, 1000)).unwrap();
    backend.render(64).unwrap();

    backend.fail_next_close();
    let err = device.close_device().unwrap_err();

    assert!(matches!(err, DeviceError::StreamThread(_)));
    assert!(!device.is_open());
    assert!(!backend.is_streaming());
    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), -1);
    device.close_device().unwrap();
}

#[test]
fn failed_open_leaves_the_device_closed() {
    common::init_tracing();
    let backend = OfflineBackend::new(48000, 2);
    let device = AudioDevice::new(backend.clone(), None, EngineConfig::default());

    backend.fail_next_open();
    let err = device.open_device(None, None).unwrap_err();
    assert!(matches!(err, DeviceError::StreamPlayError(_)));
    assert!(!device.is_open());
    assert!(!device.is_playing());
    assert_eq!(device.playback_position(), -1);

    let err = device.open_device(None, Some(3)).unwrap_err();
    assert!(matches!(err, DeviceError::DeviceNotFound { index: 3, .. }));
    assert!(!device.is_open());

    device.open_device(None, None).unwrap();
    assert!(device.is_open());
}

#[test]
fn dropping_the_device_closes_its_stream() {
    let (backend, device) = open_device(EngineConfig::default());
    assert!(backend.is_streaming());

    drop(device);

    assert!(!backend.is_streaming());
    assert_eq!(backend.closes(), 1);
}
