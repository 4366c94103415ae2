//! How-To: Driving the Voice Engine from MIDI
//!
//! Feeds a short sequence of raw MIDI messages through the router, ticks the
//! engine at 60 Hz like a render loop would, and prints voice levels and the
//! tile layers a renderer would draw.
//!
//! Run with: RUST_LOG=debug cargo run --example midi_session

use tonetile::prelude::*;
use tracing_subscriber::EnvFilter;

/// Seconds between render ticks
const TICK: f64 = 1.0 / 60.0;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::default();
    let mut router = NoteRouter::new(&config);
    let mut settings =
        Settings::default().with_envelope(AdsrParams::new(0.1, 0.2, 0.6, 0.3, 0.7));
    let mut sink = EventLog::new();
    let viewport = Viewport::new(1280.0, 720.0);

    println!("=== MIDI Session Demo ===\n");
    println!(
        "Nearest harmonics: {}",
        router
            .tuner()
            .nearest_harmonics()
            .summary(&tonetile::tuning::SUMMARY_PROBE)
    );

    // (time, message) pairs as a MIDI callback would deliver them
    let script: [(f64, [u8; 3]); 8] = [
        (0.00, [0x90, 60, 100]), // C4 on
        (0.25, [0x90, 64, 90]),  // E4 on
        (0.50, [0x90, 67, 80]),  // G4 on
        (1.00, [0x80, 60, 0]),   // C4 off
        (1.05, [0x90, 60, 100]), // C4 again while releasing
        (1.50, [0x80, 60, 0]),
        (1.50, [0x80, 64, 0]),
        (1.50, [0x90, 67, 0]), // G4 off via zero velocity
    ];

    let mut next = 0;
    let mut now = 0.0;
    while now < 3.0 {
        while next < script.len() && script[next].0 <= now {
            let (_, msg) = script[next];
            router.handle_midi(&msg, now, &settings, &mut sink);
            next += 1;
        }

        // Switch to just intonation mid-chord
        if (now - 0.75).abs() < TICK / 2.0 {
            settings = settings.with_intonation(Intonation::Just);
            let retuned = router.retune_held(now, &settings, &mut sink);
            println!("t={:.2}s  retuned {} held voices to {}", now, retuned, settings.intonation);
        }

        let report = router.tick(now, &mut sink);
        let plan = router.tile_plan(&report, &settings, &viewport);

        if (now * 60.0).round() as u64 % 15 == 0 {
            let levels: Vec<String> = report
                .levels
                .iter()
                .map(|v| format!("{}{}={:.3}", note_name(v.note % 12), v.note / 12 - 1, v.level))
                .collect();
            println!(
                "t={:.2}s  voices: [{}]  layers: {}",
                now,
                levels.join(", "),
                plan.layers.len()
            );
        }
        for note in &report.reaped {
            println!("t={:.2}s  reaped note {}", now, note);
        }

        now += TICK;
    }

    println!("\nSink received {} events:", sink.len());
    for event in sink.events() {
        println!("  {:?}", event);
    }
}
