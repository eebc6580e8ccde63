//! Play a tone through the transport and watch the position move
//!
//! Run with: cargo run --example play_tone
//!
//! Lists the host APIs and output devices, lets you pick one, then plays two
//! seconds of a 440Hz tone, stops halfway through a second pass, and resumes.

use std::io::{self, Write};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use tonband::{CpalBackend, DevicePool, DeviceSelection, EngineConfig, PcmDocument, PeakMeter, PlayRequest, SampleSource};

fn tone(frequency: f32, seconds: f32, sample_rate: u32) -> PcmDocument {
    let frames = (seconds * sample_rate as f32) as usize;
    let samples = (0..frames)
        .map(|n| (n as f32 * frequency * std::f32::consts::TAU / sample_rate as f32).sin() * 0.25)
        .collect();
    PcmDocument::from_channels(vec![samples], sample_rate)
}

fn wait_while_playing(device: &tonband::AudioDevice<CpalBackend>, meter: &PeakMeter, limit: Option<i64>) {
    while device.is_playing() {
        let position = device.playback_position();
        println!("  frame {position:>7}  peak {:.3}", meter.level(0));
        if limit.is_some_and(|limit| position >= limit) {
            return;
        }
        sleep(Duration::from_millis(100));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    for (host, name) in CpalBackend::hosts().iter().enumerate() {
        println!("Host [{host}] {name}");
    }

    let devices = CpalBackend::output_devices(None);
    if devices.is_empty() {
        eprintln!("No audio output devices found!");
        return Ok(());
    }

    println!("Available audio output devices:");
    for device in &devices {
        println!(
            "  [{}] {} ({}Hz, {} ch)",
            device.index, device.name, device.sample_rate, device.channels
        );
    }

    print!("\nSelect device [default]: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let output_device = input.trim().parse::<usize>().ok().filter(|&i| i < devices.len());

    let pool = DevicePool::new(CpalBackend, EngineConfig::default());
    pool.set_device_selection(DeviceSelection::new(None, output_device, None));
    let device = pool.get_output_device()?;

    let format = device.format().ok_or("device closed while starting")?;
    println!("\nUsing {} Hz, {} ch", format.sample_rate, format.channels);

    let document = Arc::new(tone(440.0, 2.0, format.sample_rate));
    let meter = Arc::new(PeakMeter::new(1));

    println!("Playing the whole tone...");
    device.play(PlayRequest::from_position(document.clone(), 0).with_meter(meter.clone()))?;
    sleep(Duration::from_millis(50));
    wait_while_playing(&device, &meter, None);

    println!("Playing the first half, stopping early...");
    let half = document.frames() / 2;
    device.play(PlayRequest::new(document.clone(), 0, half).with_meter(meter.clone()))?;
    sleep(Duration::from_millis(50));
    wait_while_playing(&device, &meter, Some(half as i64 / 2));
    device.stop()?;
    sleep(Duration::from_millis(50));

    let resume_at = device.playback_position().max(0) as u64;
    println!("Stopped at {resume_at}, resuming to the end...");
    device.play(PlayRequest::from_position(document, resume_at).with_meter(meter.clone()))?;
    sleep(Duration::from_millis(50));
    wait_while_playing(&device, &meter, None);

    for fault in device.take_faults().iter() {
        println!("fault: {fault:?}");
    }
    pool.close_output_device()?;
    Ok(())
}
