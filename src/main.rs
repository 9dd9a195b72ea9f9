//! voxlive demo binary.
//!
//! Streams microphone audio (or silence, without the `pulse` feature) to
//! the configured realtime provider and prints the running transcript.
//! Ctrl-C once stops the session cleanly; twice exits.

#![forbid(unsafe_code)]

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voxlive::{
    AudioSink, HttpSynthesizer, NullSynthesizer, SessionConfig, SourceFactory, Synthesizer,
    VoiceSession, VoiceSessionState, WavSink,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxlive=info")),
        )
        .init();

    let config = SessionConfig::from_env().context("loading VOXLIVE_* configuration")?;
    info!(endpoint = %config.endpoint, model = %config.model, "starting voxlive");

    let synthesizer: Arc<dyn Synthesizer> = if config.tts_endpoint.is_empty() {
        info!("no TTS endpoint configured, using silent synthesis");
        Arc::new(NullSynthesizer {
            sample_rate: config.sample_rate,
        })
    } else {
        Arc::new(HttpSynthesizer::new(
            config.tts_endpoint.clone(),
            config.api_key.clone(),
        ))
    };

    let out_dir = std::env::var("VOXLIVE_TTS_OUT")
        .map(Into::into)
        .unwrap_or_else(|_| std::env::temp_dir().join("voxlive"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    info!(dir = %out_dir.display(), "agent utterances will be written here");
    let sink: Arc<dyn AudioSink> = Arc::new(WavSink::new(out_dir, config.sample_rate));

    let source_factory = make_source_factory(&config);

    let session = VoiceSession::spawn(config, source_factory, synthesizer, sink);
    session.start();

    let mut snapshots = session.watch();
    let transcript_printer = tokio::spawn(async move {
        let mut last = String::new();
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow().clone();
            if snapshot.transcript != last {
                println!("transcript: {}", snapshot.transcript);
                last = snapshot.transcript;
            }
            if snapshot.state == VoiceSessionState::Error {
                warn!(
                    error = snapshot.last_error.as_deref().unwrap_or("unknown"),
                    "session entered error state"
                );
            }
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("stopping session");
    session.stop();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("forced exit"),
        _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {}
    }

    let snapshot = session.snapshot();
    println!("final transcript: {}", snapshot.transcript);
    session.shutdown().await;
    transcript_printer.abort();
    Ok(())
}

#[cfg(feature = "pulse")]
fn make_source_factory(config: &SessionConfig) -> SourceFactory {
    use voxlive::pulse_source::PulseSource;
    let sample_rate = config.sample_rate;
    Arc::new(move || {
        PulseSource::open("voxlive", sample_rate)
            .map(|source| Box::new(source) as Box<dyn voxlive::AudioSource>)
    })
}

#[cfg(not(feature = "pulse"))]
fn make_source_factory(config: &SessionConfig) -> SourceFactory {
    use voxlive::SilenceSource;
    let sample_rate = config.sample_rate;
    let frame_ms = config.chunk_ms.min(20);
    warn!("built without the pulse feature, streaming silence");
    Arc::new(move || {
        Ok(Box::new(SilenceSource::new(sample_rate, frame_ms)) as Box<dyn voxlive::AudioSource>)
    })
}
