use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rtrb::RingBuffer;
use tonband::{
    ChannelMask, Command, EngineConfig, FaultFlags, Interleaved, MessageHandler, PcmDocument, PlayRequest, TransportEngine, TransportState,
};

const FRAMES: usize = 512;
const CHANNELS: usize = 2;

fn looping_engine(request: PlayRequest) -> (TransportEngine, TransportState, rtrb::Consumer<PlayRequest>) {
    let (retire_tx, retire_rx) = RingBuffer::new(16);
    let mut engine = TransportEngine::new(&EngineConfig::default(), Arc::new(FaultFlags::default()), retire_tx);
    let mut state = TransportState::default();
    engine.apply_message(&mut state, Command::Play(request));
    (engine, state, retire_rx)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let document = Arc::new(PcmDocument::from_channels(vec![vec![0.1; 1 << 20], vec![-0.1; 1 << 20]], 48000));
    let mut output = vec![0.0f32; FRAMES * CHANNELS];

    c.bench_function("TransportEngine.render() stereo", |b| {
        let request = PlayRequest::from_position(document.clone(), 0);
        let (mut engine, mut state, _retired) = looping_engine(request.clone());
        b.iter(|| {
            if !state.is_playing {
                state = TransportState::default();
                engine.apply_message(&mut state, Command::Play(request.clone()));
            }
            engine.render(&mut state, &mut Interleaved::new(black_box(output.as_mut_slice()), CHANNELS))
        })
    });

    c.bench_function("TransportEngine.render() one channel", |b| {
        let request = PlayRequest::from_position(document.clone(), 0).with_channels(ChannelMask::only(1));
        let (mut engine, mut state, _retired) = looping_engine(request.clone());
        b.iter(|| {
            if !state.is_playing {
                state = TransportState::default();
                engine.apply_message(&mut state, Command::Play(request.clone()));
            }
            engine.render(&mut state, &mut Interleaved::new(black_box(output.as_mut_slice()), CHANNELS))
        })
    });

    c.bench_function("TransportEngine.render() stopped", |b| {
        let (retire_tx, _retire_rx) = RingBuffer::new(1);
        let mut engine = TransportEngine::new(&EngineConfig::default(), Arc::new(FaultFlags::default()), retire_tx);
        let mut state = TransportState::default();
        b.iter(|| engine.render(&mut state, &mut Interleaved::new(black_box(output.as_mut_slice()), CHANNELS)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
