use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoLocal;

use lingua_live::types::audio::OUTPUT_SAMPLE_RATE;
use lingua_live::types::persona;
use lingua_live::types::session::LiveConfig;
use lingua_live::types::ConversationState;
use lingua_live::utils;
use lingua_live::{
    build_output_stream, Config, ConversationEngine, CpalMicSource, DeviceSink, EngineEvent,
    PlaybackScheduler, WsTransport,
};

const OUTPUT_LATENCY_SECS: usize = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let (events_tx, events_rx) = tokio::sync::mpsc::channel::<EngineEvent>(1024);

    // Playback path: device sink behind the scheduler, drained by a cpal
    // output stream.
    let output = utils::device::get_or_default_output(None)?;
    let output_config: StreamConfig = output.default_output_config()?.into();
    let device_rate = output_config.sample_rate.0 as f64;
    println!("output: device={:?}, {} Hz", output.name()?, device_rate);

    let (sink, sink_output) = DeviceSink::new(
        events_tx.clone(),
        OUTPUT_SAMPLE_RATE as f64,
        device_rate,
        OUTPUT_LATENCY_SECS,
    )?;
    let output_stream = build_output_stream(&output, &output_config, sink_output)?;
    output_stream.play()?;

    let scheduler = PlaybackScheduler::new(Box::new(sink), OUTPUT_SAMPLE_RATE as f64, 1);

    // Beginner persona, free-talk scenario.
    let personas = persona::builtin_personas();
    let scenarios = persona::builtin_scenarios();
    println!(
        "persona: {} / scenario: {}",
        personas[0].name, scenarios[0].name
    );
    let instruction = persona::system_instruction(&personas[0], &scenarios[0]);

    let config = LiveConfig::builder()
        .with_system_instruction(&instruction)
        .with_input_transcription_enable()
        .with_output_transcription_enable()
        .build();

    let engine = ConversationEngine::new(
        Box::new(WsTransport::new(Config::new())),
        Box::new(CpalMicSource::default()),
        scheduler,
        config,
        events_tx.clone(),
    );

    // Print state changes and newly finalized transcript lines.
    let mut snapshots = engine.snapshots();
    let mut shutdown_watch = engine.snapshots();
    let printer = tokio::spawn(async move {
        let mut last_state = ConversationState::Idle;
        let mut printed = 0;
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.state != last_state {
                println!("state: {:?}", snapshot.state);
                last_state = snapshot.state;
            }
            for entry in snapshot.transcript.iter().filter(|e| !e.partial) {
                if entry.id >= printed {
                    println!("{:?}: {}", entry.speaker, entry.text);
                    printed = entry.id + 1;
                }
            }
            if let Some(error) = snapshot.error {
                eprintln!("error: {}", error);
            }
        }
    });

    let driver = tokio::spawn(engine.run(events_rx));

    events_tx.send(EngineEvent::Start).await?;
    println!("conversation running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    println!("shutting down...");
    events_tx.send(EngineEvent::Stop).await?;

    // The device sink keeps the event channel open for playback completions,
    // so wait for the engine to report idle instead of a channel close.
    shutdown_watch
        .wait_for(|snapshot| snapshot.state == ConversationState::Idle)
        .await?;
    driver.abort();
    printer.abort();
    Ok(())
}
